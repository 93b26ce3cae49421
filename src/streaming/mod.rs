//! Chunked streaming of tiled scenes
//!
//! - `bounds`: tile bounds to world-space boxes
//! - `node`: chunk node tree
//! - `task`: background work with owner-thread completion
//! - `factory`: node creation and hierarchy fetch bookkeeping
//! - `chunk_loader`: per-node content jobs
//! - `entity`: the streamed scene as seen by a renderer
//! - `lod`: screen-space error for refinement decisions

pub mod bounds;
pub mod node;
pub mod task;
pub mod factory;
pub mod chunk_loader;
pub mod entity;
pub mod lod;

#[cfg(test)]
mod test_support;

pub use bounds::{HUGE_ERROR, HUGE_SIZE, convert, has_large_bounds, point_in_obb, unconvert};
pub use node::{ChunkNode, ChunkNodeId, NodeState};
pub use task::{BackgroundTask, CancelToken, TaskEvent};
pub use factory::{ChunkLoaderFactory, HierarchyFetchState};
pub use chunk_loader::{AsyncChunkLoader, LoadContext, LoadStatus, load_tile_content};
pub use entity::{ChunkedStreamingEntity, RayHit, StreamEvent, StreamingStats};
pub use lod::{ViewParams, needs_refinement, node_screen_space_error, screen_space_error};
