//! Engine tuning constants
//!
//! Loaded from JSON when a config file is supplied, otherwise the defaults
//! below apply. Every field has a serde default so partial config files
//! work.

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Tunable constants for the tick loop, compositor, and gestures.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks an attachment survives after its owner disappears before
    /// teardown.
    pub grace_ticks: u32,
    /// Scale normalization divisor for inherited sub-attachment scale.
    pub default_scale: f64,
    /// Lower clamp for the pinch-scale gesture.
    pub min_scale: f64,
    /// Pixels of pinch radius per unit of scale change.
    pub scale_gesture_divisor: f64,
    /// Base value of every depth key.
    pub depth_base: f64,
    /// Depth bonus while an entity is under edit.
    pub depth_edit_bonus: f64,
    /// Depth range distributed across the interaction recency ranking.
    pub depth_rank_range: f64,
    /// Numerator of the projected-depth term.
    pub depth_near_numerator: f64,
    /// Minimum projected z used in the depth term.
    pub depth_min_z: f64,
    /// Duration of the pop-out animation, in ticks.
    pub popout_ticks: u32,
    /// Perspective-divide factor at the start of the pop-out animation.
    pub popout_start_divide: f64,
    /// Perspective-divide factor at the end of the pop-out animation.
    pub popout_end_divide: f64,
    /// Distance at which content has fully faded out, in scene units.
    /// Zero disables fading.
    pub fade_distance: f64,
    /// Fraction of `fade_distance` at which fading begins.
    pub fade_knee: f64,
    /// Ticks between scans for haptic-relevant content.
    pub content_scan_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_ticks: 3,
            default_scale: 1.0,
            min_scale: 0.2,
            scale_gesture_divisor: 300.0,
            depth_base: 200.0,
            depth_edit_bonus: 100.0,
            depth_rank_range: 50.0,
            depth_near_numerator: 1_000_000.0,
            depth_min_z: 10.0,
            popout_ticks: 15,
            popout_start_divide: 0.7,
            popout_end_divide: 1.0,
            fade_distance: 2000.0,
            fade_knee: 0.8,
            content_scan_interval: 30,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file, filling omitted fields with defaults.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
