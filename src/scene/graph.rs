//! The scene graph: every trackable and the attachments bound to them

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;

use super::attachment::{Attachment, AttachmentId, SubAttachment, SubAttachmentId};
use super::trackable::{Trackable, TrackableId};

/// Addresses one attachment or sub-attachment in the graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityPath {
    pub trackable: TrackableId,
    pub attachment: AttachmentId,
    pub sub: Option<SubAttachmentId>,
}

impl EntityPath {
    pub fn attachment(trackable: TrackableId, attachment: AttachmentId) -> Self {
        Self {
            trackable,
            attachment,
            sub: None,
        }
    }

    pub fn sub(trackable: TrackableId, attachment: AttachmentId, sub: SubAttachmentId) -> Self {
        Self {
            trackable,
            attachment,
            sub: Some(sub),
        }
    }

    /// Flat string form, used for log lines and keyed storage.
    pub fn key(&self) -> String {
        match &self.sub {
            Some(sub) => format!("{}/{}/{}", self.trackable.0, self.attachment.0, sub.0),
            None => format!("{}/{}", self.trackable.0, self.attachment.0),
        }
    }
}

impl std::fmt::Display for EntityPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// All trackables and their attachments.
///
/// The graph owns the data; editing sessions, lifecycle tracking, and
/// reparent transitions reference into it by id.
#[derive(Default)]
pub struct SceneGraph {
    trackables: HashMap<TrackableId, Trackable>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the trackable with the given id, creating an empty one if absent.
    pub fn ensure_trackable(&mut self, id: &TrackableId) -> &mut Trackable {
        self.trackables
            .entry(id.clone())
            .or_insert_with(|| Trackable::new(id.0.clone()))
    }

    pub fn insert_trackable(&mut self, trackable: Trackable) {
        self.trackables.insert(trackable.id.clone(), trackable);
    }

    pub fn trackable(&self, id: &TrackableId) -> Option<&Trackable> {
        self.trackables.get(id)
    }

    pub fn trackable_mut(&mut self, id: &TrackableId) -> Option<&mut Trackable> {
        self.trackables.get_mut(id)
    }

    pub fn trackables(&self) -> impl Iterator<Item = &Trackable> {
        self.trackables.values()
    }

    pub fn trackables_mut(&mut self) -> impl Iterator<Item = &mut Trackable> {
        self.trackables.values_mut()
    }

    pub fn trackable_ids(&self) -> Vec<TrackableId> {
        self.trackables.keys().cloned().collect()
    }

    /// Bind an attachment to a trackable, creating the trackable if needed.
    pub fn attach(&mut self, attachment: Attachment) -> EntityPath {
        let path = EntityPath::attachment(attachment.owner.clone(), attachment.id.clone());
        let trackable = self.ensure_trackable(&attachment.owner);
        trackable.attachments.insert(attachment.id.clone(), attachment);
        path
    }

    /// Remove an attachment from its trackable, returning it.
    pub fn detach(&mut self, trackable: &TrackableId, attachment: &AttachmentId) -> Result<Attachment> {
        let t = self
            .trackables
            .get_mut(trackable)
            .ok_or_else(|| Error::UnknownEntity(trackable.0.clone()))?;
        t.attachments
            .remove(attachment)
            .ok_or_else(|| Error::UnknownEntity(attachment.0.clone()))
    }

    pub fn attachment(&self, trackable: &TrackableId, attachment: &AttachmentId) -> Option<&Attachment> {
        self.trackables.get(trackable)?.attachments.get(attachment)
    }

    pub fn attachment_mut(
        &mut self,
        trackable: &TrackableId,
        attachment: &AttachmentId,
    ) -> Option<&mut Attachment> {
        self.trackables
            .get_mut(trackable)?
            .attachments
            .get_mut(attachment)
    }

    /// Resolve a path to its attachment (sub component ignored).
    pub fn resolve_attachment(&self, path: &EntityPath) -> Result<&Attachment> {
        self.attachment(&path.trackable, &path.attachment)
            .ok_or_else(|| Error::UnknownEntity(path.key()))
    }

    pub fn resolve_attachment_mut(&mut self, path: &EntityPath) -> Result<&mut Attachment> {
        self.attachment_mut(&path.trackable, &path.attachment)
            .ok_or_else(|| Error::UnknownEntity(path.key()))
    }

    /// Resolve a path with a sub component to the sub-attachment.
    pub fn resolve_sub(&self, path: &EntityPath) -> Result<&SubAttachment> {
        let sub_id = path
            .sub
            .as_ref()
            .ok_or_else(|| Error::UnknownEntity(path.key()))?;
        self.resolve_attachment(path)?
            .subs
            .get(sub_id)
            .ok_or_else(|| Error::UnknownEntity(path.key()))
    }

    pub fn resolve_sub_mut(&mut self, path: &EntityPath) -> Result<&mut SubAttachment> {
        let sub_id = path
            .sub
            .clone()
            .ok_or_else(|| Error::UnknownEntity(path.key()))?;
        self.resolve_attachment_mut(path)?
            .subs
            .get_mut(&sub_id)
            .ok_or_else(|| Error::UnknownEntity(path.key()))
    }

    /// Whether any trackable in the graph hosts a sticky attachment.
    pub fn has_sticky(&self) -> bool {
        self.trackables.values().any(|t| t.hosts_sticky())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::attachment::{Location, SubKind};

    fn graph_with_frame() -> (SceneGraph, EntityPath) {
        let mut graph = SceneGraph::new();
        let attachment = Attachment::new("frame1", TrackableId::new("marker1"), Location::Global);
        let path = graph.attach(attachment);
        (graph, path)
    }

    #[test]
    fn test_attach_creates_trackable() {
        let (graph, path) = graph_with_frame();
        assert!(graph.trackable(&path.trackable).is_some());
        assert!(graph.resolve_attachment(&path).is_ok());
    }

    #[test]
    fn test_detach_removes_attachment() {
        let (mut graph, path) = graph_with_frame();
        let removed = graph.detach(&path.trackable, &path.attachment).unwrap();
        assert_eq!(removed.id, path.attachment);
        assert!(graph.resolve_attachment(&path).is_err());
    }

    #[test]
    fn test_detach_unknown_fails() {
        let mut graph = SceneGraph::new();
        let err = graph
            .detach(&TrackableId::new("nope"), &AttachmentId::new("frame"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }

    #[test]
    fn test_resolve_sub() {
        let (mut graph, path) = graph_with_frame();
        let attachment = graph.resolve_attachment_mut(&path).unwrap();
        let sub_id = attachment.add_sub(SubAttachment::new("frame1value", "value", SubKind::Normal));

        let sub_path = EntityPath::sub(path.trackable.clone(), path.attachment.clone(), sub_id);
        assert!(graph.resolve_sub(&sub_path).is_ok());
    }

    #[test]
    fn test_path_key() {
        let path = EntityPath::sub(
            TrackableId::new("m"),
            AttachmentId::new("f"),
            SubAttachmentId::new("n"),
        );
        assert_eq!(path.key(), "m/f/n");
    }
}
