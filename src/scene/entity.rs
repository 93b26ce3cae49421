//! Renderable entities produced from decoded tile content
//!
//! Entities are built fully detached on a background job and handed to
//! the owning thread, which attaches them to a chunk node. Nothing here
//! touches shared scene state.

use std::sync::Arc;

use glam::{DMat4, DVec3, Vec3};

use crate::math::Ray;
use crate::tiles::crs::{CoordinateTransform, TransformDirection};
use crate::tiles::tile::Axis;

/// Triangle mesh in world space
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshPrimitive {
    pub positions: Vec<Vec3>,
    /// Triangle list; three indices per triangle
    pub indices: Vec<u32>,
}

impl MeshPrimitive {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Closest hit as (ray parameter, triangle index).
    /// Triangles referencing missing vertices are skipped.
    pub fn ray_intersection(&self, ray: &Ray) -> Option<(f32, usize)> {
        let mut best: Option<(f32, usize)> = None;
        for (i, tri) in self.indices.chunks_exact(3).enumerate() {
            let (Some(&a), Some(&b), Some(&c)) = (
                self.positions.get(tri[0] as usize),
                self.positions.get(tri[1] as usize),
                self.positions.get(tri[2] as usize),
            ) else {
                continue;
            };
            if let Some(t) = ray.intersects_triangle(a, b, c) {
                if best.is_none_or(|(best_t, _)| t < best_t) {
                    best = Some((t, i));
                }
            }
        }
        best
    }
}

/// Hit of a ray against an entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshHit {
    pub distance: f32,
    pub point: Vec3,
    pub triangle_index: usize,
}

/// Renderable content of one chunk node
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderEntity {
    /// Where the content came from, for diagnostics
    pub source: String,
    pub primitives: Vec<MeshPrimitive>,
}

impl RenderEntity {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            primitives: Vec::new(),
        }
    }

    pub fn with_primitive(mut self, primitive: MeshPrimitive) -> Self {
        self.primitives.push(primitive);
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(MeshPrimitive::triangle_count).sum()
    }

    /// Nearest hit over all primitives
    pub fn ray_intersection(&self, ray: &Ray) -> Option<MeshHit> {
        self.primitives
            .iter()
            .filter_map(|p| p.ray_intersection(ray))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, triangle_index)| {
                let point = ray.at(t);
                MeshHit {
                    distance: (point - ray.origin).length(),
                    point,
                    triangle_index,
                }
            })
    }
}

/// Everything a decoder needs to place content vertices in world space
#[derive(Clone)]
pub struct EntityTransform {
    /// Tile transform with the payload's recentring offset applied
    pub tile_transform: DMat4,
    /// Scene origin in map coordinates
    pub scene_origin: DVec3,
    /// Global (tile tree) frame to map frame
    pub global_to_map: Arc<dyn CoordinateTransform>,
    pub z_scale: f64,
    pub z_offset: f64,
    /// Up axis of the content's own coordinates
    pub up_axis: Axis,
}

impl std::fmt::Debug for EntityTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTransform")
            .field("tile_transform", &self.tile_transform)
            .field("scene_origin", &self.scene_origin)
            .field("z_scale", &self.z_scale)
            .field("z_offset", &self.z_offset)
            .field("up_axis", &self.up_axis)
            .finish()
    }
}

impl EntityTransform {
    /// Rotate content coordinates into the Z-up frame of the tile tree
    pub fn content_to_z_up(&self, p: DVec3) -> DVec3 {
        match self.up_axis {
            Axis::X => DVec3::new(-p.z, p.y, p.x),
            Axis::Y => DVec3::new(p.x, -p.z, p.y),
            Axis::Z => p,
        }
    }

    /// Content-space vertex to world space
    pub fn content_to_world(&self, p: DVec3) -> Vec3 {
        let global = self.tile_transform.transform_point3(self.content_to_z_up(p));
        let mut map = self.global_to_map.transform(global, TransformDirection::Forward);
        map.z = map.z * self.z_scale + self.z_offset;
        let local = map - self.scene_origin;
        Vec3::new(local.x as f32, local.z as f32, -local.y as f32)
    }
}

/// Output of a mesh decoder
#[derive(Clone, Debug, Default)]
pub struct DecodedMesh {
    /// `None` when the payload produced nothing renderable
    pub entity: Option<RenderEntity>,
    /// Non-fatal problems found while decoding
    pub warnings: Vec<String>,
}

/// Turns a mesh payload into a renderable entity.
///
/// Runs on background jobs; must not touch shared scene state.
pub trait MeshDecoder: Send + Sync {
    fn decode(&self, payload: &[u8], transform: &EntityTransform, source: &str) -> DecodedMesh;
}
