//! Tile hierarchy model and the collaborators that feed it
//!
//! - `tile`: tile records and their bounding volumes
//! - `index`: the `TileIndex` contract the streaming core reads from
//! - `tileset`: a `TileIndex` over 3D Tiles tileset JSON
//! - `fetch`: byte retrieval by URI
//! - `content`: tile content envelope parsing
//! - `crs`: global to map coordinate transforms

pub mod tile;
pub mod index;
pub mod tileset;
pub mod fetch;
pub mod content;
pub mod crs;

pub use tile::{Axis, BoundingVolume, ChildAvailability, Refinement, Tile, TileId};
pub use index::TileIndex;
pub use tileset::TilesetIndex;
pub use fetch::{FileFetcher, MemoryFetcher, ResourceFetcher, resolve_uri};
pub use content::{TileContents, extract_mesh_payload};
pub use crs::{CoordinateTransform, EcefToEnu, IdentityTransform, TransformDirection};
