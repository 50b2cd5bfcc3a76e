//! Per-tick transform composition, editing sessions, and animations

pub mod compose;
pub mod editing;
pub mod popout;

pub use compose::{
    compose, depth_key, object_matrix, opacity, projected_depth, projected_origin, scale_translate,
};
pub use editing::{EditingSession, RecencyList, ScaleGesture};
pub use popout::PopOut;
