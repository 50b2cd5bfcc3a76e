//! Trackable anchors and their per-tick tracking state

use std::collections::HashMap;

use glam::DMat4;
use serde::{Deserialize, Serialize};

use super::attachment::{Attachment, AttachmentId};

/// Unique identifier for a trackable anchor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackableId(pub String);

impl TrackableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// How a trackable's content is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visualization {
    /// Standard AR rendering on the marker plane.
    Ar,
    /// Content is mapped onto a fixed projected surface; positional state
    /// is reset rather than solved for continuity on arrival.
    ProjectedSurface,
}

/// A real-world anchor the tracking system reports poses for.
#[derive(Clone, Debug)]
pub struct Trackable {
    pub id: TrackableId,
    /// Most recent sanitized pose from the tracking system.
    pub pose: DMat4,
    /// Whether the tracking system reported this anchor in the current tick.
    pub visible: bool,
    /// Consecutive ticks without a pose report.
    pub ticks_missing: u32,
    /// World anchors are synthetic origins, not physical markers.
    pub is_world_anchor: bool,
    /// Physical size of the marker, when known. Used to correct attachment
    /// scale across reparenting.
    pub target_size: Option<f64>,
    pub visualization: Visualization,
    pub attachments: HashMap<AttachmentId, Attachment>,
}

impl Trackable {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TrackableId(id.into()),
            pose: DMat4::IDENTITY,
            visible: false,
            ticks_missing: 0,
            is_world_anchor: false,
            target_size: None,
            visualization: Visualization::Ar,
            attachments: HashMap::new(),
        }
    }

    /// Whether any attachment on this trackable is sticky full-screen.
    /// Such a trackable keeps all its attachments alive while undetected.
    pub fn hosts_sticky(&self) -> bool {
        self.attachments.values().any(|a| a.is_sticky())
    }
}
