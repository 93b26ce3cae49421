//! Oriented bounding box in the tile tree's native frame

use crate::core::types::{DMat4, DVec3};
use super::box3d::Box3d;

/// Oriented box given by its centre and three half-axis vectors.
///
/// This is the 3D Tiles `box` layout: the half axes are not required to
/// be orthogonal or normalised, their lengths are the half extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub center: DVec3,
    pub half_axes: [DVec3; 3],
}

impl OrientedBox {
    pub fn new(center: DVec3, half_axes: [DVec3; 3]) -> Self {
        Self { center, half_axes }
    }

    /// Axis-aligned oriented box with the given centre and half extents
    pub fn axis_aligned(center: DVec3, half_extent: DVec3) -> Self {
        Self {
            center,
            half_axes: [
                DVec3::new(half_extent.x, 0.0, 0.0),
                DVec3::new(0.0, half_extent.y, 0.0),
                DVec3::new(0.0, 0.0, half_extent.z),
            ],
        }
    }

    /// Build from the 12-number 3D Tiles `box` array
    pub fn from_tiles_array(v: &[f64; 12]) -> Self {
        Self {
            center: DVec3::new(v[0], v[1], v[2]),
            half_axes: [
                DVec3::new(v[3], v[4], v[5]),
                DVec3::new(v[6], v[7], v[8]),
                DVec3::new(v[9], v[10], v[11]),
            ],
        }
    }

    /// A box with a non-finite centre or half axis carries no spatial
    /// information. Zero-length axes are fine: a point-sized box is valid.
    pub fn is_null(&self) -> bool {
        !self.center.is_finite() || self.half_axes.iter().any(|a| !a.is_finite())
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let [a, b, c] = self.half_axes;
        std::array::from_fn(|i| {
            let sx = if i & 1 != 0 { 1.0 } else { -1.0 };
            let sy = if i & 2 != 0 { 1.0 } else { -1.0 };
            let sz = if i & 4 != 0 { 1.0 } else { -1.0 };
            self.center + a * sx + b * sy + c * sz
        })
    }

    /// Axis-aligned extent in the same frame
    pub fn extent(&self) -> Box3d {
        let [a, b, c] = self.half_axes;
        let half = a.abs() + b.abs() + c.abs();
        Box3d::new(self.center - half, self.center + half)
    }

    /// Size of the axis-aligned extent
    pub fn size(&self) -> DVec3 {
        self.extent().size()
    }

    /// Apply an affine transform to the box
    pub fn transformed(&self, m: &DMat4) -> Self {
        Self {
            center: m.transform_point3(self.center),
            half_axes: self.half_axes.map(|axis| m.transform_vector3(axis)),
        }
    }
}
