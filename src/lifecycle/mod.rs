//! Attachment lifecycle: render-surface resources and visibility tracking

pub mod surface;
pub mod tracker;

pub use surface::{MemorySurface, RenderSurface};
pub use tracker::{LifecycleTracker, VisibilityState};
