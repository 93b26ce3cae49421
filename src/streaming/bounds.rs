//! Bounds conversion between the tile tree's global frame and world space

use glam::{DVec3, Mat3, Vec3};

use crate::math::{Aabb, Box3d, OrientedBox};
use crate::tiles::tile::Tile;

/// Tiles coarser than this are never rendered individually
pub const HUGE_ERROR: f64 = 1e6;
/// Extent (in global units) above which a box cannot be reprojected safely
pub const HUGE_SIZE: f64 = 1e5;

/// Whether a tile's bounds are too large (or missing) to be reprojected
/// into a planar scene, e.g. whole-planet tiles in ECEF.
pub fn has_large_bounds(tile: &Tile) -> bool {
    if tile.geometric_error > HUGE_ERROR || tile.bounding_volume.is_null() {
        return true;
    }
    let Some(obb) = tile.bounding_volume.oriented_box() else {
        return true;
    };
    let size = obb.size();
    size.x > HUGE_SIZE || size.y > HUGE_SIZE || size.z > HUGE_SIZE
}

/// Map-space box to world-space AABB.
///
/// Subtracts the scene origin, then map Z becomes world Y and map Y
/// becomes world -Z.
pub fn convert(b: &Box3d, scene_origin: DVec3) -> Aabb {
    let b = *b - scene_origin;
    Aabb::new(
        Vec3::new(b.min.x as f32, b.min.z as f32, -b.max.y as f32),
        Vec3::new(b.max.x as f32, b.max.z as f32, -b.min.y as f32),
    )
}

/// Inverse of [`convert`]
pub fn unconvert(aabb: &Aabb, scene_origin: DVec3) -> Box3d {
    let min = DVec3::new(aabb.min.x as f64, -aabb.max.z as f64, aabb.min.y as f64);
    let max = DVec3::new(aabb.max.x as f64, -aabb.min.z as f64, aabb.max.y as f64);
    Box3d::new(min + scene_origin, max + scene_origin)
}

/// Approximate test whether a point lies inside an oriented box.
///
/// Single precision is enough here: the result only decides whether a
/// whole branch is worth considering. A degenerate box contains nothing.
pub fn point_in_obb(point: DVec3, obb: &OrientedBox) -> bool {
    let [a, b, c] = obb.half_axes;
    let rot = Mat3::from_cols(a.as_vec3(), b.as_vec3(), c.as_vec3());
    let det = rot.determinant();
    if det == 0.0 || !det.is_finite() {
        return false;
    }
    let local = rot.inverse() * (point - obb.center).as_vec3();
    local.abs().max_element() <= 1.0
}
