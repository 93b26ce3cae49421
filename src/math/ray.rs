//! Ray type and operations

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// Tolerance below which a triangle is treated as parallel to the ray
const TRIANGLE_EPSILON: f32 = 1e-7;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vec3::new(
                1.0 / direction.x,
                1.0 / direction.y,
                1.0 / direction.z,
            ),
        }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB intersection using slab method
    /// Returns Some((t_near, t_far)) if intersection, None otherwise
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.x.max(t_min.y).max(t_min.z);
        let t_far = t_max.x.min(t_max.y).min(t_max.z);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }

    /// Ray-triangle intersection (Moller-Trumbore), both faces
    /// Returns the ray parameter t of the hit
    pub fn intersects_triangle(&self, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < TRIANGLE_EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        (t >= 0.0).then_some(t)
    }
}
