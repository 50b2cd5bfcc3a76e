//! Core type aliases and re-exports

pub use glam::{DMat4, DQuat, DVec2, DVec3, DVec4};

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
