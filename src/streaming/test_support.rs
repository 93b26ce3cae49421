//! Test doubles for the streaming layer

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use glam::{DVec3, Vec3};

use crate::math::OrientedBox;
use crate::scene::entity::{DecodedMesh, EntityTransform, MeshDecoder, MeshPrimitive, RenderEntity};
use crate::tiles::index::TileIndex;
use crate::tiles::tile::{BoundingVolume, ChildAvailability, Tile, TileId};

/// Minimal binary glTF header; the mock decoder never looks inside
pub fn quad_glb() -> Vec<u8> {
    let mut bytes = b"glTF".to_vec();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&12u32.to_le_bytes());
    bytes
}

/// Tile with an axis-aligned box around `center`
pub fn box_tile(id: u64, center: DVec3, half_size: f64, error: f64) -> Tile {
    let mut tile = Tile::new(TileId(id));
    tile.geometric_error = error;
    tile.bounding_volume = BoundingVolume::Box(OrientedBox::axis_aligned(center, DVec3::splat(half_size)));
    tile
}

/// Small tile referencing `uri`
pub fn content_tile(id: u64, uri: &str, base_url: Option<&str>) -> Tile {
    let mut tile = box_tile(id, DVec3::ZERO, 10.0, 5.0);
    tile.content_uri = Some(uri.to_string());
    tile.base_url = base_url.map(str::to_string);
    tile
}

#[derive(Default)]
struct IndexState {
    tiles: HashMap<TileId, Tile>,
    /// Children that only become visible once the parent's hierarchy is fetched
    hidden: HashMap<TileId, Vec<TileId>>,
    content: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
struct Gate {
    open: bool,
    arrived: usize,
}

/// In-memory tile index with optional blocking of background calls
pub struct MockIndex {
    root: TileId,
    state: Mutex<IndexState>,
    gate: Mutex<Gate>,
    gate_changed: Condvar,
    fetch_fails: AtomicBool,
    fetch_calls: AtomicUsize,
    content_requests: AtomicUsize,
}

impl MockIndex {
    /// Index whose root is tile 0, a 200-unit box with error 100
    pub fn new() -> Self {
        let index = Self {
            root: TileId(0),
            state: Mutex::new(IndexState::default()),
            gate: Mutex::new(Gate { open: true, arrived: 0 }),
            gate_changed: Condvar::new(),
            fetch_fails: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            content_requests: AtomicUsize::new(0),
        };
        index.set_root(box_tile(0, DVec3::ZERO, 100.0, 100.0));
        index
    }

    /// Like [`Self::new`], but background calls block until [`Self::release`]
    pub fn gated() -> Self {
        let index = Self::new();
        index.gate.lock().unwrap().open = false;
        index
    }

    /// Replace the root tile; its id must be 0
    pub fn set_root(&self, tile: Tile) {
        assert_eq!(tile.id, self.root);
        let mut state = self.state.lock().unwrap();
        state.tiles.insert(tile.id, tile);
    }

    pub fn add_child(&self, parent: TileId, tile: Tile) {
        let mut state = self.state.lock().unwrap();
        let id = tile.id;
        state.tiles.insert(id, tile);
        if let Some(parent) = state.tiles.get_mut(&parent) {
            parent.children.push(id);
        }
    }

    /// Mark `parent` as needing a hierarchy fetch that reveals `children`
    pub fn add_hidden_children(&self, parent: TileId, children: Vec<Tile>) {
        let mut state = self.state.lock().unwrap();
        let ids = children.iter().map(|t| t.id).collect();
        for tile in children {
            state.tiles.insert(tile.id, tile);
        }
        state.hidden.insert(parent, ids);
    }

    pub fn insert_content(&self, uri: &str, bytes: Vec<u8>) {
        self.state.lock().unwrap().content.insert(uri.to_string(), bytes);
    }

    /// Make hierarchy fetches complete without revealing anything
    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn content_requests(&self) -> usize {
        self.content_requests.load(Ordering::SeqCst)
    }

    /// Block until `count` background calls have reached the gate
    pub fn wait_for_blocked(&self, count: usize) {
        let gate = self.gate.lock().unwrap();
        let _gate = self
            .gate_changed
            .wait_while(gate, |g| g.arrived < count)
            .unwrap();
    }

    /// Let all current and future background calls through
    pub fn release(&self) {
        self.gate.lock().unwrap().open = true;
        self.gate_changed.notify_all();
    }

    fn pass_gate(&self) {
        let mut gate = self.gate.lock().unwrap();
        gate.arrived += 1;
        self.gate_changed.notify_all();
        let _gate = self.gate_changed.wait_while(gate, |g| !g.open).unwrap();
    }
}

impl TileIndex for MockIndex {
    fn root_tile(&self) -> Tile {
        self.state.lock().unwrap().tiles[&self.root].clone()
    }

    fn get_tile(&self, id: TileId) -> Option<Tile> {
        self.state.lock().unwrap().tiles.get(&id).cloned()
    }

    fn child_tile_ids(&self, id: TileId) -> Vec<TileId> {
        let state = self.state.lock().unwrap();
        state.tiles.get(&id).map(|t| t.children.clone()).unwrap_or_default()
    }

    fn child_availability(&self, id: TileId) -> ChildAvailability {
        let state = self.state.lock().unwrap();
        if state.hidden.contains_key(&id) {
            return ChildAvailability::NeedsFetching;
        }
        match state.tiles.get(&id) {
            Some(tile) if !tile.children.is_empty() => ChildAvailability::Available,
            _ => ChildAvailability::NoChildren,
        }
    }

    fn fetch_hierarchy(&self, id: TileId) {
        self.pass_gate();
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fetch_fails.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(children) = state.hidden.remove(&id) {
            if let Some(tile) = state.tiles.get_mut(&id) {
                tile.children.extend(children);
            }
        }
    }

    fn retrieve_content(&self, uri: &str) -> Vec<u8> {
        self.pass_gate();
        self.content_requests.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().content.get(uri).cloned().unwrap_or_default()
    }
}

/// Decoder producing a flat square centred on the content origin
pub struct MockDecoder {
    half_size: f32,
    warnings: Vec<String>,
    calls: AtomicUsize,
    last_transform: Mutex<Option<EntityTransform>>,
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self {
            half_size: 1.0,
            warnings: Vec::new(),
            calls: AtomicUsize::new(0),
            last_transform: Mutex::new(None),
        }
    }
}

impl MockDecoder {
    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_transform(&self) -> Option<EntityTransform> {
        self.last_transform.lock().unwrap().clone()
    }
}

impl MeshDecoder for MockDecoder {
    fn decode(&self, _payload: &[u8], transform: &EntityTransform, source: &str) -> DecodedMesh {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_transform.lock().unwrap() = Some(transform.clone());

        // Horizontal square in world space
        let c = transform.content_to_world(DVec3::ZERO);
        let h = self.half_size;
        let positions = vec![
            c + Vec3::new(-h, 0.0, -h),
            c + Vec3::new(h, 0.0, -h),
            c + Vec3::new(h, 0.0, h),
            c + Vec3::new(-h, 0.0, h),
        ];
        DecodedMesh {
            entity: Some(RenderEntity::new(source).with_primitive(MeshPrimitive::new(positions, vec![0, 1, 2, 0, 2, 3]))),
            warnings: self.warnings.clone(),
        }
    }
}
