//! Tilestream - streaming of tiled 3D scenes
//!
//! A tile hierarchy (for example a 3D Tiles tileset) is exposed to a
//! renderer as a tree of chunk nodes. Children are materialised lazily,
//! sub-tree hierarchies are fetched on demand and tile content is loaded
//! and decoded on a background pool.

pub mod core;
pub mod math;
pub mod tiles;
pub mod scene;
pub mod streaming;
