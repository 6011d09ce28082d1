//! Math aliases and planar helpers shared by every module.
//!
//! +Y is up. "2D" tests in path following ignore Y and work on the XZ plane.

use nalgebra as na;

pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;

/// Reference to a node (polygon) of a navigation graph.
pub type NavNodeRef = u64;

/// Marks "no node".
pub const INVALID_NAV_NODE_REF: NavNodeRef = 0;

/// Planar (XZ) distance squared between two world positions.
#[inline]
pub fn dist_sq_2d(a: &Vec3, b: &Vec3) -> f32 {
    let x = b.x - a.x;
    let z = b.z - a.z;
    x * x + z * z
}

/// Planar (XZ) length of a vector.
#[inline]
pub fn size_2d(v: &Vec3) -> f32 {
    (v.x * v.x + v.z * v.z).sqrt()
}

/// Normalized copy of `v`, or zero when `v` is too short to have a direction.
#[inline]
pub fn safe_normal(v: &Vec3) -> Vec3 {
    v.try_normalize(1.0e-8).unwrap_or_else(Vec3::zeros)
}

/// Component-wise equality within `tolerance`.
#[inline]
pub fn nearly_equal(a: &Vec3, b: &Vec3, tolerance: f32) -> bool {
    (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance && (a.z - b.z).abs() <= tolerance
}

/// Vertical collision cylinder of an agent or goal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cylinder {
    pub radius: f32,
    pub half_height: f32,
}

impl Cylinder {
    pub const fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);
        assert!((dist_sq_2d(&a, &b) - 25.0).abs() < 1.0e-5);
        assert!((size_2d(&(b - a)) - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn safe_normal_of_zero_is_zero() {
        assert_eq!(safe_normal(&Vec3::zeros()), Vec3::zeros());
        let n = safe_normal(&Vec3::new(0.0, 0.0, 2.0));
        assert!((n.z - 1.0).abs() < 1.0e-6);
    }
}
