//! 4x4 matrix operations
//!
//! All operations are pure: they allocate fresh output and never mutate
//! their inputs. Degenerate inputs (NaN, singular) are handled by
//! substitution rather than panics, so a single bad matrix can never stall
//! the tick loop.

use glam::DMat4;

/// Determinants below this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Compose two transforms: apply `a` first, then `b`.
///
/// With column-vector matrices this is `b * a`. The compositor builds every
/// chain through this helper so the application order reads left to right.
pub fn multiply(a: &DMat4, b: &DMat4) -> DMat4 {
    *b * *a
}

/// Invert a matrix, falling back to identity if it is singular.
///
/// Never panics; a singular input is logged and the caller continues with
/// identity.
pub fn safe_invert(m: &DMat4) -> DMat4 {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
        log::warn!("cannot invert singular matrix (det={det}), substituting identity");
        return DMat4::IDENTITY;
    }
    m.inverse()
}

/// Substitute identity for matrices containing NaN or with a vanishing
/// determinant.
///
/// Called once per tick on incoming poses; the individual matrix ops assume
/// sanitized input.
pub fn sanitize(m: &DMat4) -> DMat4 {
    if !m.is_finite() {
        log::warn!("matrix contains NaN/inf, substituting identity");
        return DMat4::IDENTITY;
    }
    if m.determinant().abs() < SINGULAR_EPSILON {
        log::warn!("matrix is degenerate (det~0), substituting identity");
        return DMat4::IDENTITY;
    }
    *m
}

/// Rotation of the matrix about the X axis, in radians.
///
/// Extracted from the rotation block assuming an XYZ rotation order.
pub fn rotation_about_x(m: &DMat4) -> f64 {
    // atan2(r32, r33) with r_ij the row-i, column-j element
    m.y_axis.z.atan2(m.z_axis.z)
}

/// Rotation of the matrix about the Y axis, in radians.
pub fn rotation_about_y(m: &DMat4) -> f64 {
    let r31 = m.x_axis.z;
    let r32 = m.y_axis.z;
    let r33 = m.z_axis.z;
    (-r31).atan2((r32 * r32 + r33 * r33).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec3, DVec4};

    fn mat_close(a: &DMat4, b: &DMat4, tol: f64) -> bool {
        (0..4).all(|c| (a.col(c) - b.col(c)).abs().max_element() < tol)
    }

    #[test]
    fn test_multiply_applies_left_to_right() {
        let translate = DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let scale = DMat4::from_scale(DVec3::splat(2.0));

        // translate by 1, then scale by 2: origin ends at x=2
        let m = multiply(&translate, &scale);
        let p = m * DVec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((p.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_safe_invert_roundtrip() {
        let m = DMat4::from_translation(DVec3::new(3.0, -2.0, 7.0))
            * DMat4::from_rotation_y(0.4);
        let inv = safe_invert(&m);
        assert!(mat_close(&(m * inv), &DMat4::IDENTITY, 1e-9));
    }

    #[test]
    fn test_safe_invert_singular_returns_identity() {
        let singular = DMat4::from_cols_array(&[0.0; 16]);
        assert_eq!(safe_invert(&singular), DMat4::IDENTITY);
    }

    #[test]
    fn test_safe_invert_does_not_mutate_input() {
        let m = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let copy = m;
        let _ = safe_invert(&m);
        assert_eq!(m, copy);
    }

    #[test]
    fn test_sanitize_nan() {
        let mut bad = DMat4::IDENTITY;
        bad.x_axis.x = f64::NAN;
        assert_eq!(sanitize(&bad), DMat4::IDENTITY);
    }

    #[test]
    fn test_sanitize_all_zero() {
        let zero = DMat4::from_cols_array(&[0.0; 16]);
        assert_eq!(sanitize(&zero), DMat4::IDENTITY);
    }

    #[test]
    fn test_sanitize_passes_valid_through() {
        let m = DMat4::from_rotation_x(1.2);
        assert_eq!(sanitize(&m), m);
    }

    #[test]
    fn test_rotation_about_x() {
        let angle = 0.35;
        let m = DMat4::from_rotation_x(angle);
        assert!((rotation_about_x(&m) - angle).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_about_y() {
        let angle = -0.6;
        let m = DMat4::from_rotation_y(angle);
        assert!((rotation_about_y(&m) - angle).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_of_identity_is_zero() {
        assert_eq!(rotation_about_x(&DMat4::IDENTITY), 0.0);
        assert_eq!(rotation_about_y(&DMat4::IDENTITY), 0.0);
    }
}
