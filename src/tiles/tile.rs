//! Tile records
//!
//! A `Tile` is an immutable snapshot of one node of the source hierarchy.
//! The index hands out clones; nothing in the streaming core mutates them.

use serde_json::{Map, Value};

use crate::core::types::DMat4;
use crate::math::{Box3d, OrientedBox};
use super::crs::{CoordinateTransform, TransformDirection};

/// Metadata key holding the glTF up axis of the tile content
pub const GLTF_UP_AXIS_KEY: &str = "gltfUpAxis";

/// Identifier of a tile, unique within one tile tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spatial extent of a tile in the tree's native (global) frame
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BoundingVolume {
    /// No usable bounds; treated as covering the whole scene
    #[default]
    Unbounded,
    Box(OrientedBox),
}

impl BoundingVolume {
    pub fn oriented_box(&self) -> Option<&OrientedBox> {
        match self {
            BoundingVolume::Box(obb) => Some(obb),
            BoundingVolume::Unbounded => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.oriented_box().is_none_or(|obb| obb.is_null())
    }

    /// Axis-aligned bounds after transforming the box corners into the
    /// transform's target frame
    pub fn bounds(&self, transform: &dyn CoordinateTransform) -> Option<Box3d> {
        let obb = self.oriented_box()?;
        Box3d::from_points(
            obb.corners()
                .into_iter()
                .map(|c| transform.transform(c, TransformDirection::Forward)),
        )
    }
}

/// Whether a parent's content stays visible once children are shown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Refinement {
    #[default]
    Replace,
    Additive,
}

/// Whether the children of a tile are known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildAvailability {
    Available,
    NoChildren,
    /// The child list lives in a sub-tree that has not been fetched yet
    NeedsFetching,
}

/// Coordinate axis, used for the glTF up-axis convention
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    X,
    #[default]
    Y,
    Z,
}

impl Axis {
    /// Parse either an axis name ("Z") or its ordinal (2)
    pub fn from_value(value: &Value) -> Option<Axis> {
        match value {
            Value::String(s) => match s.to_ascii_uppercase().as_str() {
                "X" => Some(Axis::X),
                "Y" => Some(Axis::Y),
                "Z" => Some(Axis::Z),
                _ => None,
            },
            Value::Number(n) => match n.as_u64()? {
                0 => Some(Axis::X),
                1 => Some(Axis::Y),
                2 => Some(Axis::Z),
                _ => None,
            },
            _ => None,
        }
    }
}

/// One node of the source spatial hierarchy
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub id: TileId,
    /// Coarseness of the tile content; larger is coarser
    pub geometric_error: f64,
    pub bounding_volume: BoundingVolume,
    pub children: Vec<TileId>,
    /// Content reference, possibly relative to `base_url`
    pub content_uri: Option<String>,
    /// Location the content reference is resolved against
    pub base_url: Option<String>,
    /// Transform from tile content space to the global frame
    pub transform: Option<DMat4>,
    pub refinement: Refinement,
    pub metadata: Map<String, Value>,
}

impl Tile {
    pub fn new(id: TileId) -> Self {
        Self {
            id,
            geometric_error: 0.0,
            bounding_volume: BoundingVolume::Unbounded,
            children: Vec::new(),
            content_uri: None,
            base_url: None,
            transform: None,
            refinement: Refinement::Replace,
            metadata: Map::new(),
        }
    }

    /// Up axis of the glTF content, Y unless the metadata says otherwise
    pub fn up_axis(&self) -> Axis {
        self.metadata
            .get(GLTF_UP_AXIS_KEY)
            .and_then(Axis::from_value)
            .unwrap_or_default()
    }
}
