//! Screen-ray unprojection and marker-plane intersection
//!
//! Drag operations resolve a touch point to a coordinate on a trackable's
//! marker plane: unproject the screen point into a camera-space ray, then
//! intersect with the z=0 plane of the marker's transform.

use glam::{DMat4, DVec2, DVec3, DVec4};

use super::matrix::safe_invert;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Create a new ray (direction is normalized)
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// Unproject a screen point into a camera-space ray.
///
/// `screen` is in pixels with (0,0) at the top left; `viewport` is the
/// screen size in pixels. The ray starts at the camera origin and passes
/// through the point on the near plane under the touch.
pub fn screen_ray(screen: DVec2, viewport: DVec2, projection: &DMat4) -> Ray {
    let ndc = DVec2::new(
        2.0 * screen.x / viewport.x - 1.0,
        1.0 - 2.0 * screen.y / viewport.y,
    );

    let inv_projection = safe_invert(projection);
    let near = inv_projection * DVec4::new(ndc.x, ndc.y, -1.0, 1.0);
    let w = if near.w.abs() > f64::EPSILON { near.w } else { 1.0 };
    let near_point = DVec3::new(near.x / w, near.y / w, near.z / w);

    Ray::new(DVec3::ZERO, near_point)
}

/// Intersect a ray with the z=0 plane of `plane_matrix`'s local space.
///
/// Returns the hit point in plane-local (x, y) coordinates, or `None` when
/// the ray is parallel to the plane.
pub fn plane_intersection(ray: &Ray, plane_matrix: &DMat4) -> Option<(f64, f64)> {
    let normal = (*plane_matrix * DVec4::new(0.0, 0.0, 1.0, 0.0))
        .truncate()
        .normalize();
    let plane_point = plane_matrix.w_axis.truncate();

    let denom = normal.dot(ray.direction);
    if denom.abs() < 1e-9 {
        return None;
    }

    let t = normal.dot(plane_point - ray.origin) / denom;
    let hit = ray.at(t);

    let local = safe_invert(plane_matrix) * DVec4::new(hit.x, hit.y, hit.z, 1.0);
    Some((local.x, local.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(DVec3::ZERO, DVec3::X);
        assert_eq!(ray.at(5.0), DVec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_plane_intersection_axis_aligned() {
        // Plane at z=-10, facing the camera
        let plane = DMat4::from_translation(DVec3::new(0.0, 0.0, -10.0));
        let ray = Ray::new(DVec3::ZERO, DVec3::new(0.0, 0.0, -1.0));

        let (x, y) = plane_intersection(&ray, &plane).unwrap();
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_plane_intersection_offset_hit() {
        let plane = DMat4::from_translation(DVec3::new(0.0, 0.0, -10.0));
        // Ray aimed at plane-local (2, 3)
        let ray = Ray::new(DVec3::ZERO, DVec3::new(2.0, 3.0, -10.0));

        let (x, y) = plane_intersection(&ray, &plane).unwrap();
        assert!((x - 2.0).abs() < 1e-9);
        assert!((y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_plane_intersection_parallel_ray() {
        let plane = DMat4::from_translation(DVec3::new(0.0, 0.0, -10.0));
        let ray = Ray::new(DVec3::ZERO, DVec3::X);
        assert!(plane_intersection(&ray, &plane).is_none());
    }

    #[test]
    fn test_plane_intersection_translated_plane_local_coords() {
        // Plane shifted sideways: hitting its world center yields local (0,0)
        let plane = DMat4::from_translation(DVec3::new(5.0, 0.0, -10.0));
        let ray = Ray::new(DVec3::ZERO, DVec3::new(5.0, 0.0, -10.0));

        let (x, y) = plane_intersection(&ray, &plane).unwrap();
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_screen_ray_center_of_screen() {
        let projection = DMat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let ray = screen_ray(
            DVec2::new(400.0, 300.0),
            DVec2::new(800.0, 600.0),
            &projection,
        );
        // Center of screen looks straight down -Z
        assert!(ray.direction.x.abs() < 1e-9);
        assert!(ray.direction.y.abs() < 1e-9);
        assert!(ray.direction.z < 0.0);
    }
}
