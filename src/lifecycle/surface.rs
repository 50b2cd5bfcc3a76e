//! Render-surface resource accounting
//!
//! The engine does not draw; it tells a render surface which resources to
//! hold. Resources are keyed by entity path string so the surface needs no
//! knowledge of the scene graph.

use std::collections::HashSet;

/// Resource lifetime hooks implemented by the embedding renderer.
pub trait RenderSurface {
    /// Whether a resource is currently allocated for `key`.
    fn does_resource_exist(&self, key: &str) -> bool;

    /// Allocate a resource for `key`. Idempotent.
    fn allocate(&mut self, key: &str);

    /// Release the resource for `key`. Idempotent; releasing an absent key
    /// is a no-op.
    fn release(&mut self, key: &str);
}

/// In-memory surface used by tests and the demo binary.
#[derive(Default)]
pub struct MemorySurface {
    resources: HashSet<String>,
    released: Vec<String>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys released so far, in order. Test hook.
    pub fn released(&self) -> &[String] {
        &self.released
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

impl RenderSurface for MemorySurface {
    fn does_resource_exist(&self, key: &str) -> bool {
        self.resources.contains(key)
    }

    fn allocate(&mut self, key: &str) {
        self.resources.insert(key.to_owned());
    }

    fn release(&mut self, key: &str) {
        if self.resources.remove(key) {
            self.released.push(key.to_owned());
        }
    }
}
