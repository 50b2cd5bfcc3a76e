//! The composition chain
//!
//! Every rendered entity gets a final matrix built from the same chain:
//! marker pose, then camera correction, then projection, then the entity's
//! free-form matrix, then its planar scale/translate offsets. The chain is
//! rebuilt from scratch every tick; nothing here accumulates.

use glam::{DMat4, DVec4};

use crate::math::matrix::multiply;
use crate::scene::attachment::PositionData;
use crate::scene::config::EngineConfig;

/// Build the object matrix for a trackable: pose, then camera correction,
/// then projection.
pub fn object_matrix(projection: &DMat4, correction: &DMat4, pose: &DMat4) -> DMat4 {
    let m = multiply(&multiply(pose, correction), projection);
    if m.is_finite() {
        m
    } else {
        log::warn!("object matrix contains NaN, substituting identity");
        DMat4::IDENTITY
    }
}

/// Planar offset matrix for a position: scale on x/y, unit z, and an (x, y)
/// translation on the marker plane.
pub fn scale_translate(position: &PositionData) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(position.scale, 0.0, 0.0, 0.0),
        DVec4::new(0.0, position.scale, 0.0, 0.0),
        DVec4::new(0.0, 0.0, 1.0, 0.0),
        DVec4::new(position.x, position.y, 0.0, 1.0),
    )
}

/// Compose the final matrix for an entity.
///
/// The offsets apply first, then the free-form matrix, then the object
/// matrix. If the result contains NaN the offsets are dropped and the chain
/// recomposed, so a corrupt stored scale cannot blank the entity.
pub fn compose(object: &DMat4, freeform: Option<&DMat4>, position: &PositionData) -> DMat4 {
    let edited = freeform.copied().unwrap_or(DMat4::IDENTITY);
    let with_edit = multiply(&edited, object);
    let final_matrix = multiply(&scale_translate(position), &with_edit);

    if final_matrix.is_finite() {
        return final_matrix;
    }

    log::warn!("final matrix contains NaN, recomposing without planar offsets");
    let fallback = multiply(&scale_translate(&PositionData::default()), &with_edit);
    if fallback.is_finite() {
        fallback
    } else {
        DMat4::IDENTITY
    }
}

/// Projected position of an entity's origin: the translation of its final
/// matrix after perspective divide.
pub fn projected_origin(final_matrix: &DMat4) -> glam::DVec3 {
    let t = final_matrix.w_axis;
    if t.w.abs() > f64::EPSILON {
        t.truncate() / t.w
    } else {
        t.truncate()
    }
}

/// Projected depth of an entity: the z of [`projected_origin`].
pub fn projected_depth(final_matrix: &DMat4) -> f64 {
    projected_origin(final_matrix).z
}

/// Stacking key for an entity: larger means nearer the viewer.
///
/// Entities under edit always stack above everything else; among the rest,
/// recently-touched entities win, and projected depth breaks ties.
pub fn depth_key(
    config: &EngineConfig,
    being_edited: bool,
    recency_fraction: f64,
    projected_z: f64,
) -> f64 {
    let edit = if being_edited {
        config.depth_edit_bonus
    } else {
        0.0
    };
    let rank = config.depth_rank_range * recency_fraction;
    let near = config.depth_near_numerator / projected_z.max(config.depth_min_z);
    config.depth_base + edit + rank + near
}

/// Distance-based opacity: fully opaque inside the knee, fading linearly to
/// zero at `fade_distance`. A zero fade distance disables fading.
pub fn opacity(config: &EngineConfig, distance: f64) -> f64 {
    if config.fade_distance <= 0.0 {
        return 1.0;
    }
    let knee = config.fade_knee * config.fade_distance;
    if distance <= knee {
        1.0
    } else if distance >= config.fade_distance {
        0.0
    } else {
        1.0 - (distance - knee) / (config.fade_distance - knee)
    }
}
