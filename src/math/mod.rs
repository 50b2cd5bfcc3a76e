//! Matrix and raycast math for the transform compositor

pub mod matrix;
pub mod plane;

pub use matrix::{multiply, rotation_about_x, rotation_about_y, safe_invert, sanitize};
pub use plane::{plane_intersection, screen_ray, Ray};
