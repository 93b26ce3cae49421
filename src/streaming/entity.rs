//! Chunked streaming entity
//!
//! Owns the chunk node tree of one tiled scene, every content job started
//! for it and the background pool those jobs run on. All state changes
//! happen on the thread that owns the entity; background work reports back
//! through a channel drained by [`ChunkedStreamingEntity::process_events`].

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::core::config::StreamingConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::{Aabb, Ray};
use crate::scene::entity::MeshDecoder;
use crate::streaming::chunk_loader::AsyncChunkLoader;
use crate::streaming::factory::ChunkLoaderFactory;
use crate::streaming::lod::{ViewParams, needs_refinement};
use crate::streaming::node::{ChunkNode, ChunkNodeId, NodeState};
use crate::streaming::task::TaskEvent;
use crate::tiles::crs::CoordinateTransform;
use crate::tiles::index::TileIndex;
use crate::tiles::tile::TileId;

/// Change applied by [`ChunkedStreamingEntity::process_events`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A node finished loading; it may have ended up without geometry
    ContentLoaded { node: ChunkNodeId, has_geometry: bool },
    /// A hierarchy fetch requested for this node finished; ask
    /// `can_create_children` again
    ChildrenPrepared { node: ChunkNodeId },
}

/// Nearest ray hit against loaded content
#[derive(Clone, Debug, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub tile_id: TileId,
    pub geometric_error: f32,
    /// Resolved content URI of the hit tile
    pub content: String,
    pub triangle_index: usize,
}

/// Snapshot counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    pub node_count: usize,
    pub active_count: usize,
    pub loading_count: usize,
    pub pending_fetches: usize,
    pub triangle_count: usize,
}

/// Streamed tiled scene
pub struct ChunkedStreamingEntity {
    config: StreamingConfig,
    decoder: Arc<dyn MeshDecoder>,
    nodes: HashMap<ChunkNodeId, ChunkNode>,
    root: ChunkNodeId,
    /// Loaded nodes, in load order
    active: Vec<ChunkNodeId>,
    /// Content jobs whose completion has not been processed yet
    jobs: HashMap<ChunkNodeId, AsyncChunkLoader>,
    next_serial: u64,
    events: UnboundedReceiver<TaskEvent>,
    factory: ChunkLoaderFactory,
    /// Own pool, when not running on the host's runtime
    runtime: Option<Runtime>,
}

impl ChunkedStreamingEntity {
    /// Create the entity with its own background pool of
    /// `config.worker_threads` threads
    pub fn new(
        config: StreamingConfig,
        index: Arc<dyn TileIndex>,
        decoder: Arc<dyn MeshDecoder>,
        transform: Arc<dyn CoordinateTransform>,
    ) -> Result<Self> {
        if config.worker_threads == 0 {
            return Err(Error::Runtime("worker_threads must be at least 1".into()));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads)
            .thread_name("tilestream-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(format!("failed to start worker pool: {}", e)))?;
        let handle = runtime.handle().clone();
        Ok(Self::build(config, index, decoder, transform, handle, Some(runtime)))
    }

    /// Create the entity on an existing runtime
    pub fn with_handle(
        config: StreamingConfig,
        index: Arc<dyn TileIndex>,
        decoder: Arc<dyn MeshDecoder>,
        transform: Arc<dyn CoordinateTransform>,
        handle: Handle,
    ) -> Self {
        Self::build(config, index, decoder, transform, handle, None)
    }

    fn build(
        config: StreamingConfig,
        index: Arc<dyn TileIndex>,
        decoder: Arc<dyn MeshDecoder>,
        transform: Arc<dyn CoordinateTransform>,
        handle: Handle,
        runtime: Option<Runtime>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = ChunkLoaderFactory::new(&config, index, transform, handle, tx);
        let root = factory.create_root_node();
        let root_id = root.id;
        log::info!(
            "Streaming entity created: root tile {} error {} bbox {:?}",
            root_id,
            root.error,
            root.bbox
        );

        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            config,
            decoder,
            nodes,
            root: root_id,
            active: Vec::new(),
            jobs: HashMap::new(),
            next_serial: 0,
            events: rx,
            factory,
            runtime,
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn factory(&self) -> &ChunkLoaderFactory {
        &self.factory
    }

    pub fn root(&self) -> ChunkNodeId {
        self.root
    }

    pub fn node(&self, id: ChunkNodeId) -> Option<&ChunkNode> {
        self.nodes.get(&id)
    }

    /// Loaded nodes
    pub fn active_nodes(&self) -> &[ChunkNodeId] {
        &self.active
    }

    /// Maximum screen-space error, in pixels, the renderer should accept
    pub fn max_screen_error(&self) -> f32 {
        self.config.max_screen_error
    }

    /// Whether the node is too coarse for `view` under the configured
    /// maximum screen error
    pub fn needs_refinement(&self, id: ChunkNodeId, view: &ViewParams) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|node| needs_refinement(node, view, self.config.max_screen_error))
    }

    /// See [`ChunkLoaderFactory::can_create_children`]
    pub fn can_create_children(&mut self, id: ChunkNodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => node.children_created || self.factory.can_create_children(node),
            None => false,
        }
    }

    /// See [`ChunkLoaderFactory::prepare_children`]
    pub fn prepare_children(&mut self, id: ChunkNodeId) {
        if let Some(node) = self.nodes.get(&id) {
            self.factory.prepare_children(node);
        }
    }

    /// Materialise the children of a node, or return the existing ones.
    ///
    /// # Panics
    /// If the node's hierarchy still needs fetching; see
    /// [`Self::can_create_children`].
    pub fn create_children(&mut self, id: ChunkNodeId) -> Vec<ChunkNodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        if node.children_created {
            return node.children.clone();
        }

        let children = self.factory.create_children(node);
        let ids: Vec<ChunkNodeId> = children.iter().map(|c| c.id).collect();
        log::trace!("Node {} created {} children", id, ids.len());
        for child in children {
            self.nodes.insert(child.id, child);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = ids.clone();
            node.children_created = true;
        }
        ids
    }

    /// Children of a node if they can be created now; otherwise starts the
    /// required hierarchy fetches and returns `None`
    pub fn ensure_children(&mut self, id: ChunkNodeId) -> Option<Vec<ChunkNodeId>> {
        if self.can_create_children(id) {
            Some(self.create_children(id))
        } else {
            self.prepare_children(id);
            None
        }
    }

    /// Start loading a node's content. Returns false if the node is unknown
    /// or not in skeleton state.
    pub fn start_load(&mut self, id: ChunkNodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.state != NodeState::Skeleton {
            log::debug!("Node {} is already {:?}", id, node.state);
            return false;
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        match self.factory.create_chunk_loader(node, self.decoder.clone(), serial) {
            Some(loader) => {
                node.state = NodeState::Loading;
                self.jobs.insert(id, loader);
                true
            }
            None => {
                log::warn!("Tile {} vanished from the index", id);
                node.set_loaded(None);
                if !self.active.contains(&id) {
                    self.active.push(id);
                }
                false
            }
        }
    }

    /// Apply completed background work. Call regularly from the owning thread.
    ///
    /// Fetches requested by nodes that were pruned meanwhile still resolve
    /// their tile but are not reported.
    pub fn process_events(&mut self) -> Vec<StreamEvent> {
        let mut applied = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                TaskEvent::ContentLoaded { node, serial } => {
                    if let Some(event) = self.on_content_loaded(node, serial) {
                        applied.push(event);
                    }
                }
                TaskEvent::HierarchyFetched { tile } => {
                    match self.factory.on_hierarchy_fetched(tile) {
                        Some(node) if self.nodes.contains_key(&node) => {
                            applied.push(StreamEvent::ChildrenPrepared { node });
                        }
                        Some(node) => log::trace!("Fetch for tile {} finished after node {} was pruned", tile, node),
                        None => {}
                    }
                }
            }
        }
        applied
    }

    fn on_content_loaded(&mut self, id: ChunkNodeId, serial: u64) -> Option<StreamEvent> {
        if self.jobs.get(&id).is_none_or(|job| job.serial() != serial) {
            log::trace!("Dropping stale completion for node {}", id);
            return None;
        }
        let mut loader = self.jobs.remove(&id)?;
        let entity = loader.take_entity();
        let has_geometry = entity.is_some();

        let node = self.nodes.get_mut(&id)?;
        node.set_loaded(entity);
        if !self.active.contains(&id) {
            self.active.push(id);
        }
        log::debug!("Node {} loaded (geometry: {})", id, has_geometry);
        Some(StreamEvent::ContentLoaded { node: id, has_geometry })
    }

    /// Drop a node's content, cancelling and awaiting its job if one is running
    pub fn unload(&mut self, id: ChunkNodeId) {
        if let Some(mut job) = self.jobs.remove(&id) {
            job.cancel();
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.unload();
        }
        self.active.retain(|&n| n != id);
    }

    /// Unload and forget every descendant of a node.
    ///
    /// Hierarchy fetches the descendants started keep running; see
    /// [`Self::process_events`].
    pub fn prune_children(&mut self, id: ChunkNodeId) {
        let children = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.children_created = false;
                std::mem::take(&mut node.children)
            }
            None => return,
        };
        for child in children {
            self.prune_children(child);
            self.unload(child);
            self.nodes.remove(&child);
        }
    }

    /// Content jobs not yet processed plus hierarchy fetches in flight
    pub fn pending_jobs_count(&self) -> usize {
        self.jobs.len() + self.factory.pending_fetch_count()
    }

    /// Nearest hit of `ray` against loaded geometry
    pub fn ray_intersection(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        let mut candidates = 0;

        for id in &self.active {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let Some(entity) = node.entity() else {
                continue;
            };
            // The box is never closer than its content
            if let Some(hit) = &best {
                if node.bbox.distance_from_point(ray.origin) > hit.distance {
                    continue;
                }
            }
            if ray.intersects_aabb(&node.bbox).is_none() {
                continue;
            }

            candidates += 1;
            let Some(hit) = entity.ray_intersection(ray) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| hit.distance < b.distance) {
                best = Some(RayHit {
                    distance: hit.distance,
                    point: hit.point,
                    tile_id: id.tile_id(),
                    geometric_error: node.error,
                    content: entity.source.clone(),
                    triangle_index: hit.triangle_index,
                });
            }
        }

        log::debug!(
            "Ray query: {} active nodes, {} tested, hit: {}",
            self.active.len(),
            candidates,
            best.is_some()
        );
        best
    }

    /// Cancel every content job and hierarchy fetch, blocking until all
    /// workers have exited. Nodes that were loading go back to skeleton.
    pub fn cancel_active_jobs(&mut self) {
        let total = self.pending_jobs_count();
        if total > 0 {
            log::debug!("Cancelling {} background jobs", total);
        }

        // Signal everything first so workers stop in parallel
        for job in self.jobs.values() {
            job.request_cancel();
        }
        for (id, mut job) in self.jobs.drain() {
            job.cancel();
            if let Some(node) = self.nodes.get_mut(&id) {
                node.unload();
            }
        }
        self.factory.cancel_fetches();

        // Anything still queued refers to jobs that no longer exist
        while self.events.try_recv().is_ok() {}
    }

    /// Boxes of the loaded nodes for debug drawing; empty unless enabled
    pub fn bounding_boxes(&self) -> Vec<Aabb> {
        if !self.config.show_bounding_boxes {
            return Vec::new();
        }
        self.active
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| node.bbox)
            .collect()
    }

    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            node_count: self.nodes.len(),
            active_count: self.active.len(),
            loading_count: self.jobs.len(),
            pending_fetches: self.factory.pending_fetch_count(),
            triangle_count: self
                .active
                .iter()
                .filter_map(|id| self.nodes.get(id)?.entity())
                .map(|e| e.triangle_count())
                .sum(),
        }
    }
}

impl Drop for ChunkedStreamingEntity {
    fn drop(&mut self) {
        self.cancel_active_jobs();
        // May be dropped inside an async context, where a blocking shutdown panics
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
