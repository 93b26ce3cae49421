//! Double precision box for map and global coordinates

use std::ops::Sub;

use crate::core::types::DVec3;

/// Axis-aligned box in f64, used before coordinates are brought into
/// the f32 world space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl Box3d {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all points; `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// The eight corners, bit 0 = x, bit 1 = y, bit 2 = z
    pub fn corners(&self) -> [DVec3; 8] {
        std::array::from_fn(|i| {
            DVec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Approximate equality, per component
    pub fn abs_diff_eq(&self, other: &Box3d, tolerance: f64) -> bool {
        self.min.abs_diff_eq(other.min, tolerance) && self.max.abs_diff_eq(other.max, tolerance)
    }
}

impl Sub<DVec3> for Box3d {
    type Output = Box3d;

    fn sub(self, offset: DVec3) -> Box3d {
        Box3d::new(self.min - offset, self.max - offset)
    }
}
