//! Attachment and sub-attachment types
//!
//! An attachment is a virtual element bound to one trackable; its
//! sub-attachments inherit position from it according to the rules in
//! `scene::position`. Instead of a prototype chain, shared behavior lives
//! in `PositionData` and the kind/location enums.

use std::collections::HashMap;

use glam::DMat4;
use serde::{Deserialize, Serialize};

use super::trackable::TrackableId;

/// Unique identifier for an attachment. Opaque string, globally unique.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Identifier for a sub-attachment. Unique only within its parent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAttachmentId(pub String);

impl SubAttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Where an attachment renders relative to its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// Always renders relative to its owner's marker plane.
    Local,
    /// May be detached and reassigned to a different owner.
    Global,
}

/// Full-screen rendering mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullScreen {
    None,
    Full,
    /// Always rendered; ignores owner visibility and is never torn down.
    Sticky,
}

/// Sub-attachment kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubKind {
    Normal,
    Logic,
    /// Data storage; never rendered.
    Storage,
    /// Explicitly invisible; never rendered.
    Hidden,
}

impl SubKind {
    /// Whether this kind produces a renderable element.
    pub fn renders(&self) -> bool {
        matches!(self, SubKind::Normal | SubKind::Logic)
    }
}

/// Positional state shared by attachments and sub-attachments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionData {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Free-form ("unconstrained") matrix; `None` until first edited.
    pub matrix: Option<DMat4>,
}

impl Default for PositionData {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            matrix: None,
        }
    }
}

/// One side of a relationship link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub trackable: TrackableId,
    pub attachment: AttachmentId,
    pub sub: Option<SubAttachmentId>,
}

/// A relationship record between two entities. Endpoints referencing a
/// reparented attachment are rewritten during the move.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Link {
    pub a: LinkEndpoint,
    pub b: LinkEndpoint,
}

/// A child element bound to an attachment.
#[derive(Clone, Debug)]
pub struct SubAttachment {
    pub id: SubAttachmentId,
    /// Stable name used to derive scoped identifiers on reparent.
    pub name: String,
    pub kind: SubKind,
    pub position: PositionData,
    pub loaded: bool,
    pub visible: bool,
}

impl SubAttachment {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SubKind) -> Self {
        let id = id.into();
        Self {
            id: SubAttachmentId(id),
            name: name.into(),
            kind,
            position: PositionData::default(),
            loaded: false,
            visible: false,
        }
    }
}

/// A top-level virtual element bound to exactly one trackable.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub id: AttachmentId,
    pub owner: TrackableId,
    pub location: Location,
    pub full_screen: FullScreen,
    pub position: PositionData,
    pub subs: HashMap<SubAttachmentId, SubAttachment>,
    pub links: HashMap<String, Link>,
    pub loaded: bool,
    pub visible: bool,
    /// Edit-continuity snapshot: the composed pose at the moment the
    /// current free-form edit began.
    pub begin: DMat4,
    /// Edit-continuity snapshot: the most recent composed pose while under
    /// edit (also what a transition-slot occupant renders from).
    pub temp: DMat4,
}

impl Attachment {
    pub fn new(id: impl Into<String>, owner: TrackableId, location: Location) -> Self {
        Self {
            id: AttachmentId(id.into()),
            owner,
            location,
            full_screen: FullScreen::None,
            position: PositionData::default(),
            subs: HashMap::new(),
            links: HashMap::new(),
            loaded: false,
            visible: false,
            begin: DMat4::IDENTITY,
            temp: DMat4::IDENTITY,
        }
    }

    pub fn is_sticky(&self) -> bool {
        self.full_screen == FullScreen::Sticky
    }

    /// Add a sub-attachment, returning its id.
    pub fn add_sub(&mut self, sub: SubAttachment) -> SubAttachmentId {
        let id = sub.id.clone();
        self.subs.insert(id.clone(), sub);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_data_defaults() {
        let p = PositionData::default();
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 0.0);
        assert_eq!(p.scale, 1.0);
        assert!(p.matrix.is_none());
    }

    #[test]
    fn test_sub_kind_renders() {
        assert!(SubKind::Normal.renders());
        assert!(SubKind::Logic.renders());
        assert!(!SubKind::Storage.renders());
        assert!(!SubKind::Hidden.renders());
    }

    #[test]
    fn test_attachment_new() {
        let a = Attachment::new("frame1", TrackableId::new("marker1"), Location::Global);
        assert_eq!(a.id, AttachmentId::new("frame1"));
        assert_eq!(a.owner, TrackableId::new("marker1"));
        assert!(!a.loaded);
        assert!(!a.is_sticky());
        assert_eq!(a.begin, DMat4::IDENTITY);
        assert_eq!(a.temp, DMat4::IDENTITY);
    }

    #[test]
    fn test_sticky_flag() {
        let mut a = Attachment::new("frame1", TrackableId::new("m"), Location::Local);
        a.full_screen = FullScreen::Sticky;
        assert!(a.is_sticky());
    }

    #[test]
    fn test_add_sub() {
        let mut a = Attachment::new("frame1", TrackableId::new("m"), Location::Global);
        let id = a.add_sub(SubAttachment::new("frame1value", "value", SubKind::Normal));
        assert!(a.subs.contains_key(&id));
        assert_eq!(a.subs[&id].name, "value");
    }
}
