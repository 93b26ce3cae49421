//! Chunk loader factory
//!
//! Maps tiles to chunk nodes, decides which children are worth creating
//! and drives lazy resolution of sub-tree hierarchies.
//!
//! Hierarchy resolution is a per-tile state machine:
//!
//! ```text
//! Unresolved --can_create_children--> Queued --prepare_children--> InFlight --completion--> Resolved
//! ```
//!
//! A tile is in exactly one state at a time, so a queued fetch can never
//! also be in flight.

use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::config::{SceneSettings, StreamingConfig};
use crate::math::Aabb;
use crate::scene::entity::MeshDecoder;
use crate::streaming::bounds::{HUGE_ERROR, convert, has_large_bounds, point_in_obb};
use crate::streaming::chunk_loader::{AsyncChunkLoader, LoadContext};
use crate::streaming::node::{ChunkNode, ChunkNodeId};
use crate::streaming::task::{BackgroundTask, TaskEvent};
use crate::tiles::crs::{CoordinateTransform, TransformDirection};
use crate::tiles::index::TileIndex;
use crate::tiles::tile::{ChildAvailability, Tile, TileId};

/// Vertical range (map units) given to nodes that cover the whole scene
const NOMINAL_Z_RANGE: f64 = 100.0;

/// Hierarchy resolution state of a tile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HierarchyFetchState {
    /// Never needed a fetch (or not examined yet)
    Unresolved,
    /// Known to need a fetch, not started
    Queued,
    /// Fetch running on a background job
    InFlight,
    /// Fetch finished
    Resolved,
}

enum HierarchyFetch {
    Queued,
    InFlight {
        task: BackgroundTask<()>,
        requested_by: ChunkNodeId,
    },
    Resolved,
}

/// Creates chunk nodes and content loaders for a tile index
pub struct ChunkLoaderFactory {
    index: Arc<dyn TileIndex>,
    config: StreamingConfig,
    /// Global (tile tree) frame to map frame
    bounds_transform: Arc<dyn CoordinateTransform>,
    fetches: HashMap<TileId, HierarchyFetch>,
    runtime: Handle,
    events: UnboundedSender<TaskEvent>,
}

impl ChunkLoaderFactory {
    pub fn new(
        config: &StreamingConfig,
        index: Arc<dyn TileIndex>,
        bounds_transform: Arc<dyn CoordinateTransform>,
        runtime: Handle,
        events: UnboundedSender<TaskEvent>,
    ) -> Self {
        Self {
            index,
            config: config.clone(),
            bounds_transform,
            fetches: HashMap::new(),
            runtime,
            events,
        }
    }

    pub fn index(&self) -> &Arc<dyn TileIndex> {
        &self.index
    }

    pub fn scene(&self) -> &SceneSettings {
        &self.config.scene
    }

    /// Node for the index's root tile
    pub fn create_root_node(&self) -> ChunkNode {
        let tile = self.index.root_tile();
        self.node_for_tile(&tile, None)
    }

    /// Build the node for a tile.
    ///
    /// Tiles with large bounds get the full scene extent as their box and
    /// an error clamped to [`HUGE_ERROR`], so they stay selectable without
    /// being infinitely coarse.
    pub fn node_for_tile(&self, tile: &Tile, parent: Option<ChunkNodeId>) -> ChunkNode {
        let id = ChunkNodeId(tile.id);
        let mut node = match self.tile_bounds(tile) {
            Some(bbox) => ChunkNode::new(id, bbox, tile.geometric_error as f32, parent),
            None => {
                let error = tile.geometric_error.min(HUGE_ERROR);
                ChunkNode::new(id, self.full_scene_bbox(), error as f32, parent)
            }
        };
        node.refinement = tile.refinement;
        node
    }

    /// World-space box of a tile; `None` when the tile has large bounds
    fn tile_bounds(&self, tile: &Tile) -> Option<Aabb> {
        if has_large_bounds(tile) {
            return None;
        }
        let mut b = tile.bounding_volume.bounds(self.bounds_transform.as_ref())?;
        b.min.z = self.config.scale_z(b.min.z);
        b.max.z = self.config.scale_z(b.max.z);
        Some(convert(&b, self.scene().origin))
    }

    /// Scene extent at the nominal vertical range, in world space
    pub fn full_scene_bbox(&self) -> Aabb {
        let scene = self.scene();
        let [x0, y0] = scene.extent_min;
        let [x1, y1] = scene.extent_max;
        let v0 = scene.map_to_world(DVec3::new(x0, y0, -NOMINAL_Z_RANGE));
        let v1 = scene.map_to_world(DVec3::new(x1, y1, NOMINAL_Z_RANGE));
        Aabb::from_corners(v0.as_vec3(), v1.as_vec3())
    }

    /// Scene centre reverse-transformed into the tile tree's frame
    pub fn scene_center_global(&self) -> DVec3 {
        let [cx, cy] = self.scene().extent_center();
        self.bounds_transform
            .transform(DVec3::new(cx, cy, 0.0), TransformDirection::Reverse)
    }

    /// Materialise the children of a node.
    ///
    /// Large-bounds children whose box does not contain the scene centre
    /// are skipped; they cannot contribute to this scene. Children without a
    /// usable box are kept and cover the whole scene.
    ///
    /// # Panics
    /// If the node or one of its children still needs a hierarchy fetch;
    /// callers must get `true` from [`Self::can_create_children`] first.
    pub fn create_children(&self, node: &ChunkNode) -> Vec<ChunkNode> {
        let tile_id = node.id.tile_id();
        assert!(
            self.index.child_availability(tile_id) != ChildAvailability::NeedsFetching,
            "create_children called for tile {} before its hierarchy was fetched",
            tile_id
        );

        let mut scene_center = None;
        let mut children = Vec::new();
        for child_id in self.index.child_tile_ids(tile_id) {
            let Some(tile) = self.index.get_tile(child_id) else {
                log::warn!("Tile {} lists unknown child {}", tile_id, child_id);
                continue;
            };

            if has_large_bounds(&tile) {
                let center = *scene_center.get_or_insert_with(|| self.scene_center_global());
                let inside = match tile.bounding_volume.oriented_box() {
                    Some(obb) if !obb.is_null() => point_in_obb(center, obb),
                    _ => true,
                };
                if !inside {
                    log::trace!("Skipping tile {}: scene is outside its bounds", child_id);
                    continue;
                }
            }

            assert!(
                self.index.child_availability(child_id) != ChildAvailability::NeedsFetching,
                "create_children called for tile {} before child {} was fetched",
                tile_id,
                child_id
            );
            children.push(self.node_for_tile(&tile, Some(node.id)));
        }
        children
    }

    fn is_fetch_pending(&self, id: TileId) -> bool {
        matches!(
            self.fetches.get(&id),
            Some(HierarchyFetch::Queued | HierarchyFetch::InFlight { .. })
        )
    }

    /// Returns true if the tile needs a fetch, queueing it
    fn queue_if_needed(&mut self, id: TileId) -> bool {
        if self.index.child_availability(id) != ChildAvailability::NeedsFetching {
            return false;
        }
        if matches!(self.fetches.get(&id), Some(HierarchyFetch::Resolved)) {
            log::debug!("Hierarchy of tile {} still unresolved after fetch, queueing again", id);
        }
        self.fetches.insert(id, HierarchyFetch::Queued);
        true
    }

    /// Whether [`Self::create_children`] may be called for this node.
    ///
    /// Returns false while the node's or any child's hierarchy is queued or
    /// in flight. Tiles discovered to need a fetch are queued; call
    /// [`Self::prepare_children`] to start those fetches.
    pub fn can_create_children(&mut self, node: &ChunkNode) -> bool {
        let tile_id = node.id.tile_id();
        if self.is_fetch_pending(tile_id) {
            return false;
        }
        if self.queue_if_needed(tile_id) {
            return false;
        }

        // A child whose content is another tileset must be resolved before a
        // node exists for it, or its tileset JSON would be loaded as content
        for child_id in self.index.child_tile_ids(tile_id) {
            if self.is_fetch_pending(child_id) {
                return false;
            }
            if self.queue_if_needed(child_id) {
                return false;
            }
        }
        true
    }

    /// Start fetches for the queued tiles relevant to this node
    pub fn prepare_children(&mut self, node: &ChunkNode) {
        let tile_id = node.id.tile_id();
        if matches!(self.fetches.get(&tile_id), Some(HierarchyFetch::Queued)) {
            self.fetch_hierarchy_for_node(tile_id, node.id);
            return;
        }

        for child_id in self.index.child_tile_ids(tile_id) {
            if matches!(self.fetches.get(&child_id), Some(HierarchyFetch::Queued)) {
                self.fetch_hierarchy_for_node(child_id, node.id);
            }
        }
    }

    fn fetch_hierarchy_for_node(&mut self, tile_id: TileId, requested_by: ChunkNodeId) {
        assert!(
            !matches!(self.fetches.get(&tile_id), Some(HierarchyFetch::InFlight { .. })),
            "hierarchy fetch for tile {} is already in flight",
            tile_id
        );

        log::debug!("Fetching hierarchy for tile {} (node {})", tile_id, requested_by);
        let index = self.index.clone();
        let task = BackgroundTask::spawn(
            &self.runtime,
            self.events.clone(),
            TaskEvent::HierarchyFetched { tile: tile_id },
            move |cancel| {
                if !cancel.is_cancelled() {
                    index.fetch_hierarchy(tile_id);
                }
            },
        );
        self.fetches
            .insert(tile_id, HierarchyFetch::InFlight { task, requested_by });
    }

    /// Owner-thread completion of a hierarchy fetch. Returns the node whose
    /// children can be re-evaluated, or `None` for a stale notice.
    pub fn on_hierarchy_fetched(&mut self, tile_id: TileId) -> Option<ChunkNodeId> {
        match self.fetches.remove(&tile_id) {
            Some(HierarchyFetch::InFlight { mut task, requested_by }) => {
                task.wait();
                self.fetches.insert(tile_id, HierarchyFetch::Resolved);
                Some(requested_by)
            }
            Some(other) => {
                self.fetches.insert(tile_id, other);
                None
            }
            None => None,
        }
    }

    pub fn fetch_state(&self, tile_id: TileId) -> HierarchyFetchState {
        match self.fetches.get(&tile_id) {
            None => HierarchyFetchState::Unresolved,
            Some(HierarchyFetch::Queued) => HierarchyFetchState::Queued,
            Some(HierarchyFetch::InFlight { .. }) => HierarchyFetchState::InFlight,
            Some(HierarchyFetch::Resolved) => HierarchyFetchState::Resolved,
        }
    }

    /// Number of hierarchy fetches in flight
    pub fn pending_fetch_count(&self) -> usize {
        self.fetches
            .values()
            .filter(|f| matches!(f, HierarchyFetch::InFlight { .. }))
            .count()
    }

    /// Cancel every in-flight fetch and block until the workers exit
    pub fn cancel_fetches(&mut self) {
        let in_flight: Vec<TileId> = self
            .fetches
            .iter()
            .filter(|(_, f)| matches!(f, HierarchyFetch::InFlight { .. }))
            .map(|(id, _)| *id)
            .collect();

        let mut tasks = Vec::with_capacity(in_flight.len());
        for id in in_flight {
            if let Some(HierarchyFetch::InFlight { task, .. }) = self.fetches.remove(&id) {
                task.cancel();
                tasks.push(task);
            }
        }
        if !tasks.is_empty() {
            log::debug!("Waiting for {} hierarchy fetches", tasks.len());
        }
        for mut task in tasks {
            task.wait();
        }
    }

    /// Start the content job for a node
    pub fn create_chunk_loader(
        &self,
        node: &ChunkNode,
        decoder: Arc<dyn MeshDecoder>,
        serial: u64,
    ) -> Option<AsyncChunkLoader> {
        let tile = self.index.get_tile(node.id.tile_id())?;
        let context = LoadContext {
            index: self.index.clone(),
            decoder,
            bounds_transform: self.bounds_transform.clone(),
            scene_origin: self.scene().origin,
            z_scale: self.config.z_scale,
            z_offset: self.config.z_offset,
        };
        Some(AsyncChunkLoader::start(
            context,
            tile,
            node.id,
            serial,
            &self.runtime,
            self.events.clone(),
        ))
    }
}

impl Drop for ChunkLoaderFactory {
    fn drop(&mut self) {
        self.cancel_fetches();
    }
}
