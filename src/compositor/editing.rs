//! Editing sessions and gesture state
//!
//! One entity at a time may be under free-form edit. The session keeps the
//! gesture bookkeeping (touch offsets, pinch baseline, pre-edit snapshot);
//! the per-tick continuity math lives in the engine driver, which owns both
//! the session and the scene graph.

use glam::DVec2;

use crate::scene::attachment::PositionData;
use crate::scene::config::EngineConfig;
use crate::scene::graph::EntityPath;

use super::popout::PopOut;

/// Pinch-scale gesture baseline.
#[derive(Clone, Copy, Debug)]
pub struct ScaleGesture {
    pub initial_radius: f64,
    pub initial_scale: f64,
}

impl ScaleGesture {
    /// New scale for the current pinch radius, clamped at the configured
    /// minimum.
    pub fn resolve(&self, radius: f64, config: &EngineConfig) -> f64 {
        let scale =
            self.initial_scale + (radius - self.initial_radius) / config.scale_gesture_divisor;
        scale.max(config.min_scale)
    }
}

/// State of the (single) active free-form edit.
pub struct EditingSession {
    pub path: EntityPath,
    /// Position data captured when the edit began, restored if the edit is
    /// cancelled.
    pub pre_edit: PositionData,
    /// True until the first edited tick captures the begin/temp snapshots.
    pub needs_snapshot: bool,
    touch_offset: Option<DVec2>,
    scale_gesture: Option<ScaleGesture>,
    /// Pop-out animation played when content is dropped into the scene.
    pub popout: Option<PopOut>,
}

impl EditingSession {
    pub fn new(path: EntityPath, pre_edit: PositionData) -> Self {
        Self {
            path,
            pre_edit,
            needs_snapshot: true,
            touch_offset: None,
            scale_gesture: None,
            popout: None,
        }
    }

    /// Resolve a drag to the position the entity should take.
    ///
    /// With `use_touch_offset` the first call records where on the entity
    /// the touch landed relative to its current position and returns `None`
    /// (no movement); later calls subtract that offset so the entity tracks
    /// the finger without jumping to center under it. Without it the offset
    /// is cleared and the raw point is used.
    pub fn resolve_drag(
        &mut self,
        resolved: DVec2,
        current: DVec2,
        use_touch_offset: bool,
    ) -> Option<DVec2> {
        if !use_touch_offset {
            self.touch_offset = None;
            return Some(resolved);
        }
        match self.touch_offset {
            None => {
                self.touch_offset = Some(resolved - current);
                None
            }
            Some(offset) => Some(resolved - offset),
        }
    }

    /// Begin or continue a pinch-scale gesture.
    pub fn resolve_scale(&mut self, radius: f64, current_scale: f64, config: &EngineConfig) -> f64 {
        let gesture = self.scale_gesture.get_or_insert(ScaleGesture {
            initial_radius: radius,
            initial_scale: current_scale,
        });
        gesture.resolve(radius, config)
    }

    /// End the pinch gesture; the next pinch re-baselines.
    pub fn end_scale(&mut self) {
        self.scale_gesture = None;
    }
}

/// Interaction recency ranking, most recent last.
///
/// Entities never touched rank at zero; touched entities share the
/// configured depth range in order, the most recent getting the full range.
#[derive(Default)]
pub struct RecencyList {
    order: Vec<EntityPath>,
}

impl RecencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an entity as the most recently touched.
    pub fn touch(&mut self, path: &EntityPath) {
        self.order.retain(|p| p != path);
        self.order.push(path.clone());
    }

    /// Recency fraction in (0, 1], or 0.0 for entities never touched.
    pub fn fraction(&self, path: &EntityPath) -> f64 {
        match self.order.iter().position(|p| p == path) {
            Some(index) => (index + 1) as f64 / self.order.len() as f64,
            None => 0.0,
        }
    }

    pub fn remove(&mut self, path: &EntityPath) {
        self.order.retain(|p| p != path);
    }

    /// Rewrite entries after a reparent moved an attachment.
    pub fn rewrite(&mut self, from: &EntityPath, to: &EntityPath) {
        for entry in &mut self.order {
            if entry.trackable == from.trackable && entry.attachment == from.attachment {
                entry.trackable = to.trackable.clone();
                entry.attachment = to.attachment.clone();
            }
        }
    }
}
