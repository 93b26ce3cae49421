//! Axis-aligned bounding box in world (render) space

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from two arbitrary corners, sorting each axis
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Distance from a point to the closest point of the box (0 when inside)
    pub fn distance_from_point(&self, p: Vec3) -> f32 {
        let closest = p.clamp(self.min, self.max);
        (p - closest).length()
    }
}
