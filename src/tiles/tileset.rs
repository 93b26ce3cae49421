//! Tile index over 3D Tiles tileset JSON
//!
//! The whole tree of a tileset file is indexed up front. A tile whose
//! content points at another tileset JSON is an external sub-tree: its
//! children stay unknown (`NeedsFetching`) until `fetch_hierarchy` loads
//! the referenced file and attaches its root as the tile's only child.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::error::Error;
use crate::core::types::{DMat4, DVec3, Result};
use crate::math::{Box3d, OrientedBox};
use super::crs::geodetic_to_ecef;
use super::fetch::{ResourceFetcher, resolve_uri};
use super::index::TileIndex;
use super::tile::{BoundingVolume, ChildAvailability, GLTF_UP_AXIS_KEY, Refinement, Tile, TileId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TilesetJson {
    #[serde(default)]
    asset: AssetJson,
    root: TileJson,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetJson {
    gltf_up_axis: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileJson {
    bounding_volume: Option<BoundingVolumeJson>,
    #[serde(default)]
    geometric_error: f64,
    refine: Option<String>,
    content: Option<ContentJson>,
    #[serde(default)]
    children: Vec<TileJson>,
    transform: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct BoundingVolumeJson {
    #[serde(rename = "box")]
    obb: Option<Vec<f64>>,
    region: Option<Vec<f64>>,
    sphere: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ContentJson {
    uri: Option<String>,
    /// Pre-1.0 tilesets use `url`
    url: Option<String>,
}

struct IndexedTile {
    tile: Tile,
    /// Content is an external tileset that has not been loaded yet
    external: bool,
}

#[derive(Default)]
struct IndexState {
    tiles: HashMap<TileId, IndexedTile>,
    next_id: u64,
}

/// Inherited while walking down the tile tree
#[derive(Clone)]
struct ParentContext {
    transform: DMat4,
    refinement: Refinement,
    base_url: Option<String>,
    metadata: Map<String, Value>,
}

/// [`TileIndex`] over a 3D Tiles tileset
pub struct TilesetIndex {
    fetcher: Arc<dyn ResourceFetcher>,
    root: TileId,
    state: RwLock<IndexState>,
}

impl TilesetIndex {
    /// Fetch and index the tileset at `uri`
    pub fn open(uri: &str, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self> {
        let bytes = fetcher.fetch(uri)?;
        Self::from_json(&bytes, Some(uri), fetcher)
    }

    /// Index tileset JSON; `base_url` is where relative references resolve from
    pub fn from_json(json: &[u8], base_url: Option<&str>, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self> {
        let tileset: TilesetJson = serde_json::from_slice(json)?;
        let mut state = IndexState::default();
        let context = ParentContext {
            transform: DMat4::IDENTITY,
            refinement: Refinement::Replace,
            base_url: base_url.map(str::to_string),
            metadata: Map::new(),
        };
        let root = add_tileset(&mut state, tileset, &context)?;
        log::info!("Indexed tileset with {} tiles", state.tiles.len());

        Ok(Self {
            fetcher,
            root,
            state: RwLock::new(state),
        })
    }

    /// Number of tiles indexed so far
    pub fn tile_count(&self) -> usize {
        self.state.read().map(|s| s.tiles.len()).unwrap_or(0)
    }

    fn fetch_subtree(&self, id: TileId) -> Result<()> {
        let (uri, context) = {
            let state = self.state.read().map_err(|e| Error::Runtime(e.to_string()))?;
            let Some(entry) = state.tiles.get(&id) else {
                return Err(Error::Tileset(format!("unknown tile {}", id)));
            };
            if !entry.external {
                return Ok(());
            }
            let tile = &entry.tile;
            let uri = resolve_uri(tile.base_url.as_deref(), tile.content_uri.as_deref().unwrap_or_default());
            let context = ParentContext {
                transform: tile.transform.unwrap_or(DMat4::IDENTITY),
                refinement: tile.refinement,
                base_url: Some(uri.clone()),
                metadata: Map::new(),
            };
            (uri, context)
        };

        log::debug!("Fetching hierarchy of tile {} from {}", id, uri);
        let bytes = self.fetcher.fetch(&uri)?;
        let tileset: TilesetJson = serde_json::from_slice(&bytes)?;

        let mut state = self.state.write().map_err(|e| Error::Runtime(e.to_string()))?;
        // Another job may have resolved it while the lock was released
        if !state.tiles.get(&id).is_some_and(|t| t.external) {
            return Ok(());
        }
        let child = add_tileset(&mut state, tileset, &context)?;
        if let Some(entry) = state.tiles.get_mut(&id) {
            entry.tile.children = vec![child];
            entry.tile.content_uri = None;
            entry.external = false;
        }
        Ok(())
    }
}

impl TileIndex for TilesetIndex {
    fn root_tile(&self) -> Tile {
        self.get_tile(self.root).unwrap_or_else(|| Tile::new(self.root))
    }

    fn get_tile(&self, id: TileId) -> Option<Tile> {
        let state = self.state.read().ok()?;
        state.tiles.get(&id).map(|t| t.tile.clone())
    }

    fn child_tile_ids(&self, id: TileId) -> Vec<TileId> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.tiles.get(&id).map(|t| t.tile.children.clone()))
            .unwrap_or_default()
    }

    fn child_availability(&self, id: TileId) -> ChildAvailability {
        let Ok(state) = self.state.read() else {
            return ChildAvailability::NoChildren;
        };
        match state.tiles.get(&id) {
            Some(t) if t.external => ChildAvailability::NeedsFetching,
            Some(t) if !t.tile.children.is_empty() => ChildAvailability::Available,
            _ => ChildAvailability::NoChildren,
        }
    }

    fn fetch_hierarchy(&self, id: TileId) {
        if let Err(e) = self.fetch_subtree(id) {
            log::warn!("Hierarchy fetch for tile {} failed: {}", id, e);
        }
    }

    fn retrieve_content(&self, uri: &str) -> Vec<u8> {
        match self.fetcher.fetch(uri) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("Content fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn add_tileset(state: &mut IndexState, tileset: TilesetJson, parent: &ParentContext) -> Result<TileId> {
    let mut context = parent.clone();
    if let Some(axis) = tileset.asset.gltf_up_axis {
        context.metadata.insert(GLTF_UP_AXIS_KEY.to_string(), axis);
    }
    add_tile(state, tileset.root, &context)
}

fn add_tile(state: &mut IndexState, json: TileJson, parent: &ParentContext) -> Result<TileId> {
    let id = TileId(state.next_id);
    state.next_id += 1;

    let local = match json.transform.as_deref() {
        Some(m) => {
            let cols: &[f64; 16] = m
                .try_into()
                .map_err(|_| Error::Tileset(format!("transform needs 16 numbers, got {}", m.len())))?;
            DMat4::from_cols_array(cols)
        }
        None => DMat4::IDENTITY,
    };
    let transform = parent.transform * local;

    let refinement = match json.refine.as_deref() {
        Some(r) if r.eq_ignore_ascii_case("ADD") => Refinement::Additive,
        Some(r) if r.eq_ignore_ascii_case("REPLACE") => Refinement::Replace,
        _ => parent.refinement,
    };

    let bounding_volume = match &json.bounding_volume {
        Some(bv) => parse_bounding_volume(bv, &transform)?,
        None => BoundingVolume::Unbounded,
    };

    let content_uri = json.content.and_then(|c| c.uri.or(c.url));
    let external = content_uri.as_deref().is_some_and(is_tileset_uri);

    let mut tile = Tile::new(id);
    tile.geometric_error = json.geometric_error;
    tile.bounding_volume = bounding_volume;
    tile.content_uri = content_uri;
    tile.base_url = parent.base_url.clone();
    tile.transform = (transform != DMat4::IDENTITY).then_some(transform);
    tile.refinement = refinement;
    tile.metadata = parent.metadata.clone();

    let context = ParentContext {
        transform,
        refinement,
        ..parent.clone()
    };
    let mut children = Vec::with_capacity(json.children.len());
    for child in json.children {
        children.push(add_tile(state, child, &context)?);
    }
    tile.children = children;

    state.tiles.insert(id, IndexedTile { tile, external });
    Ok(id)
}

fn is_tileset_uri(uri: &str) -> bool {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.to_ascii_lowercase().ends_with(".json")
}

fn parse_bounding_volume(json: &BoundingVolumeJson, transform: &DMat4) -> Result<BoundingVolume> {
    if let Some(values) = &json.obb {
        let v: &[f64; 12] = values
            .as_slice()
            .try_into()
            .map_err(|_| Error::Tileset(format!("box needs 12 numbers, got {}", values.len())))?;
        return Ok(BoundingVolume::Box(OrientedBox::from_tiles_array(v).transformed(transform)));
    }

    if let Some(values) = &json.sphere {
        let [x, y, z, r]: [f64; 4] = values
            .as_slice()
            .try_into()
            .map_err(|_| Error::Tileset(format!("sphere needs 4 numbers, got {}", values.len())))?;
        let obb = OrientedBox::axis_aligned(DVec3::new(x, y, z), DVec3::splat(r));
        return Ok(BoundingVolume::Box(obb.transformed(transform)));
    }

    if let Some(values) = &json.region {
        let [west, south, east, north, min_h, max_h]: [f64; 6] = values
            .as_slice()
            .try_into()
            .map_err(|_| Error::Tileset(format!("region needs 6 numbers, got {}", values.len())))?;
        // Regions are geographic; tile transforms do not apply
        return Ok(region_to_volume(west, south, east, north, min_h, max_h));
    }

    Ok(BoundingVolume::Unbounded)
}

/// ECEF box around a geographic region (radians, metres)
fn region_to_volume(west: f64, south: f64, east: f64, north: f64, min_h: f64, max_h: f64) -> BoundingVolume {
    let mid_lon = (west + east) * 0.5;
    let mid_lat = (south + north) * 0.5;
    let mut points = Vec::with_capacity(18);
    for lon in [west, mid_lon, east] {
        for lat in [south, mid_lat, north] {
            points.push(geodetic_to_ecef(lon, lat, min_h));
            points.push(geodetic_to_ecef(lon, lat, max_h));
        }
    }
    match Box3d::from_points(points) {
        Some(b) => BoundingVolume::Box(OrientedBox::axis_aligned(b.center(), b.size() * 0.5)),
        None => BoundingVolume::Unbounded,
    }
}
