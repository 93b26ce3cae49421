//! Per-node asynchronous content loading
//!
//! One job per chunk node: fetch the tile's content bytes, unwrap the mesh
//! payload, decode it into a detached render entity and hand it back to
//! the owning thread. Every failure along the way means "no geometry for
//! this node", never an error.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::scene::entity::{EntityTransform, MeshDecoder, RenderEntity};
use crate::streaming::bounds::has_large_bounds;
use crate::streaming::node::ChunkNodeId;
use crate::streaming::task::{BackgroundTask, CancelToken, TaskEvent};
use crate::tiles::content::extract_mesh_payload;
use crate::tiles::crs::CoordinateTransform;
use crate::tiles::fetch::resolve_uri;
use crate::tiles::index::TileIndex;
use crate::tiles::tile::Tile;

/// Shared, read-only inputs of a content job
#[derive(Clone)]
pub struct LoadContext {
    pub index: Arc<dyn TileIndex>,
    pub decoder: Arc<dyn MeshDecoder>,
    pub bounds_transform: Arc<dyn CoordinateTransform>,
    pub scene_origin: DVec3,
    pub z_scale: f64,
    pub z_offset: f64,
}

/// Status of a content job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Running,
    Finished,
}

/// Load and decode the content of one tile.
///
/// Blocking; runs on a background job. Returns `None` when the tile has
/// nothing to render or any step fails.
pub fn load_tile_content(ctx: &LoadContext, tile: &Tile, cancel: &CancelToken) -> Option<RenderEntity> {
    // Oversized tiles are only used for culling
    if has_large_bounds(tile) {
        return None;
    }

    let uri = resolve_uri(tile.base_url.as_deref(), tile.content_uri.as_deref().unwrap_or_default());
    if uri.is_empty() {
        return None;
    }

    if cancel.is_cancelled() {
        return None;
    }
    let content = ctx.index.retrieve_content(&uri);
    if content.is_empty() {
        log::debug!("No content for tile {} ({})", tile.id, uri);
        return None;
    }

    let Some(payload) = extract_mesh_payload(&content) else {
        log::debug!("Tile {} has no supported mesh payload ({})", tile.id, uri);
        return None;
    };

    if cancel.is_cancelled() {
        return None;
    }
    let transform = EntityTransform {
        tile_transform: tile.transform.unwrap_or(DMat4::IDENTITY)
            * DMat4::from_translation(payload.rtc_center),
        scene_origin: ctx.scene_origin,
        global_to_map: ctx.bounds_transform.clone(),
        z_scale: ctx.z_scale,
        z_offset: ctx.z_offset,
        up_axis: tile.up_axis(),
    };

    let decoded = ctx.decoder.decode(&payload.gltf, &transform, &uri);
    if !decoded.warnings.is_empty() {
        log::warn!("Mesh decode warnings for {}:\n{}", uri, decoded.warnings.join("\n"));
    }
    decoded.entity
}

/// Background content job for one chunk node
pub struct AsyncChunkLoader {
    node: ChunkNodeId,
    serial: u64,
    task: BackgroundTask<Option<RenderEntity>>,
}

impl AsyncChunkLoader {
    /// Start loading `tile` for `node`. Completion is announced on `events`
    /// as [`TaskEvent::ContentLoaded`] carrying `serial`.
    pub fn start(
        ctx: LoadContext,
        tile: Tile,
        node: ChunkNodeId,
        serial: u64,
        runtime: &Handle,
        events: UnboundedSender<TaskEvent>,
    ) -> Self {
        let task = BackgroundTask::spawn(
            runtime,
            events,
            TaskEvent::ContentLoaded { node, serial },
            move |cancel| load_tile_content(&ctx, &tile, cancel),
        );
        Self { node, serial, task }
    }

    pub fn node(&self) -> ChunkNodeId {
        self.node
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn status(&self) -> LoadStatus {
        if self.task.is_finished() {
            LoadStatus::Finished
        } else {
            LoadStatus::Running
        }
    }

    /// Take the produced entity once the job finished
    pub fn take_entity(&mut self) -> Option<RenderEntity> {
        self.task.take_result().flatten()
    }

    /// Cancel the job and block until its worker exits; the result is discarded
    pub fn cancel(&mut self) {
        self.task.cancel();
        self.task.wait();
    }

    /// Signal cancellation without waiting
    pub(crate) fn request_cancel(&self) {
        self.task.cancel();
    }
}
