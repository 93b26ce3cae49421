//! Tile index contract

use super::tile::{ChildAvailability, Tile, TileId};

/// Source of truth for the tile hierarchy.
///
/// Implementations are shared between the owning thread and background
/// jobs, so every method takes `&self` and must be safe for concurrent
/// calls. `fetch_hierarchy` and `retrieve_content` may block on I/O and
/// are only called from background jobs.
pub trait TileIndex: Send + Sync {
    /// The root tile of the tree
    fn root_tile(&self) -> Tile;

    /// Look up a tile by id
    fn get_tile(&self, id: TileId) -> Option<Tile>;

    /// Ids of the known children of a tile
    fn child_tile_ids(&self, id: TileId) -> Vec<TileId>;

    /// Whether the children of a tile are known
    fn child_availability(&self, id: TileId) -> ChildAvailability;

    /// Resolve the sub-tree below `id`. Blocking; a no-op when already resolved.
    fn fetch_hierarchy(&self, id: TileId);

    /// Raw bytes behind a content URI. Blocking; an empty vector means the
    /// fetch failed.
    fn retrieve_content(&self, uri: &str) -> Vec<u8>;
}
