//! Tether - a real-time scene transform and lifecycle engine

pub mod core;
pub mod math;
pub mod scene;
pub mod lifecycle;
pub mod compositor;
pub mod reparent;
pub mod engine;
