//! Per-tick render output

use glam::{DMat4, DVec3};

use crate::scene::graph::EntityPath;

/// One rendered entity for the current tick.
#[derive(Clone, Debug)]
pub struct EntityRender {
    pub path: EntityPath,
    /// Fully composed transform, ready for the renderer.
    pub final_matrix: DMat4,
    /// Projected position of the entity's origin (perspective-divided).
    pub screen: DVec3,
    /// Stacking key; larger is nearer the viewer.
    pub depth_key: f64,
    /// Distance-fade opacity in [0, 1].
    pub opacity: f64,
    /// Whether this entity is the one under free-form edit.
    pub being_edited: bool,
}

/// Everything the renderer needs for one tick. Entries are ordered
/// nearest-first by depth key.
#[derive(Clone, Debug, Default)]
pub struct TickSnapshot {
    pub tick: u64,
    pub entries: Vec<EntityRender>,
}

impl TickSnapshot {
    pub fn entry(&self, path: &EntityPath) -> Option<&EntityRender> {
        self.entries.iter().find(|e| e.path == *path)
    }
}
