//! End-to-end streaming of a small in-memory tileset

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{DVec3, Vec3};
use tilestream::core::config::{SceneSettings, StreamingConfig};
use tilestream::math::Ray;
use tilestream::scene::{DecodedMesh, EntityTransform, MeshDecoder, MeshPrimitive, RenderEntity};
use tilestream::streaming::{ChunkNodeId, ChunkedStreamingEntity, NodeState, StreamEvent};
use tilestream::tiles::content::build_b3dm;
use tilestream::tiles::{FileFetcher, IdentityTransform, MemoryFetcher, TileId, TilesetIndex};

const TILESET: &str = r#"{
  "asset": { "version": "1.0", "gltfUpAxis": "Z" },
  "geometricError": 500,
  "root": {
    "boundingVolume": { "box": [0, 0, 0, 100, 0, 0, 0, 100, 0, 0, 0, 20] },
    "geometricError": 100,
    "refine": "REPLACE",
    "children": [
      {
        "boundingVolume": { "box": [-50, 0, 5, 50, 0, 0, 0, 100, 0, 0, 0, 10] },
        "geometricError": 10,
        "content": { "uri": "tiles/west.b3dm" }
      },
      {
        "boundingVolume": { "box": [50, 0, 0, 50, 0, 0, 0, 100, 0, 0, 0, 20] },
        "geometricError": 10,
        "content": { "uri": "east/tileset.json" }
      }
    ]
  }
}"#;

const EAST_TILESET: &str = r#"{
  "asset": { "version": "1.0", "gltfUpAxis": "Z" },
  "root": {
    "transform": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 50, 0, 0, 1],
    "boundingVolume": { "box": [0, 0, 0, 50, 0, 0, 0, 100, 0, 0, 0, 20] },
    "geometricError": 5,
    "content": { "uri": "east.glb" }
  }
}"#;

fn glb() -> Vec<u8> {
    let mut bytes = b"glTF".to_vec();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&12u32.to_le_bytes());
    bytes
}

/// Emits a 10 x 10 horizontal square around the content origin
struct SquareDecoder;

impl MeshDecoder for SquareDecoder {
    fn decode(&self, payload: &[u8], transform: &EntityTransform, source: &str) -> DecodedMesh {
        if !payload.starts_with(b"glTF") {
            return DecodedMesh {
                entity: None,
                warnings: vec![format!("{} is not binary glTF", source)],
            };
        }
        let c = transform.content_to_world(DVec3::ZERO);
        let positions = vec![
            c + Vec3::new(-5.0, 0.0, -5.0),
            c + Vec3::new(5.0, 0.0, -5.0),
            c + Vec3::new(5.0, 0.0, 5.0),
            c + Vec3::new(-5.0, 0.0, 5.0),
        ];
        DecodedMesh {
            entity: Some(RenderEntity::new(source).with_primitive(MeshPrimitive::new(positions, vec![0, 1, 2, 0, 2, 3]))),
            warnings: Vec::new(),
        }
    }
}

fn config() -> StreamingConfig {
    StreamingConfig {
        scene: SceneSettings::from_extent([-100.0, -100.0], [100.0, 100.0]),
        worker_threads: 2,
        ..StreamingConfig::default()
    }
}

fn settle(entity: &mut ChunkedStreamingEntity) -> Vec<StreamEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while entity.pending_jobs_count() > 0 {
        assert!(Instant::now() < deadline, "background jobs did not settle");
        events.extend(entity.process_events());
        std::thread::sleep(Duration::from_millis(1));
    }
    events
}

fn node(id: u64) -> ChunkNodeId {
    ChunkNodeId(TileId(id))
}

#[test]
fn test_stream_tileset_with_external_subtree() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("mem://scene/tileset.json", TILESET);
    fetcher.insert("mem://scene/east/tileset.json", EAST_TILESET);
    fetcher.insert("mem://scene/tiles/west.b3dm", build_b3dm(&glb(), Some(DVec3::new(-50.0, 0.0, 10.0))));
    fetcher.insert("mem://scene/east/east.glb", glb());

    let index = Arc::new(TilesetIndex::open("mem://scene/tileset.json", fetcher.clone()).unwrap());
    let mut entity =
        ChunkedStreamingEntity::new(config(), index, Arc::new(SquareDecoder), Arc::new(IdentityTransform)).unwrap();
    let root = entity.root();

    // East content is another tileset, so the root has to wait for it
    assert!(entity.ensure_children(root).is_none());
    assert_eq!(entity.pending_jobs_count(), 1);
    let events = settle(&mut entity);
    assert_eq!(events, vec![StreamEvent::ChildrenPrepared { node: root }]);

    let children = entity.ensure_children(root).unwrap();
    assert_eq!(children, vec![node(1), node(2)]);
    let east_children = entity.ensure_children(node(2)).unwrap();
    assert_eq!(east_children, vec![node(3)]);

    for id in [node(1), node(2), node(3)] {
        assert!(entity.start_load(id));
    }
    let mut loaded = settle(&mut entity);
    loaded.sort_by_key(|e| match e {
        StreamEvent::ContentLoaded { node, .. } | StreamEvent::ChildrenPrepared { node } => *node,
    });
    assert_eq!(
        loaded,
        vec![
            StreamEvent::ContentLoaded { node: node(1), has_geometry: true },
            // Tile 2 is only the link to the external tileset
            StreamEvent::ContentLoaded { node: node(2), has_geometry: false },
            StreamEvent::ContentLoaded { node: node(3), has_geometry: true },
        ]
    );
    assert_eq!(entity.node(node(2)).unwrap().state, NodeState::Loaded);

    // West square sits at height 10 (RTC centre), east at 0
    let west = entity
        .ray_intersection(&Ray::new(Vec3::new(-49.7, 100.0, -0.4), Vec3::NEG_Y))
        .unwrap();
    assert_eq!(west.tile_id, TileId(1));
    assert!((west.distance - 90.0).abs() < 1e-3);
    assert_eq!(west.content, "mem://scene/tiles/west.b3dm");

    let east = entity
        .ray_intersection(&Ray::new(Vec3::new(50.3, 100.0, -0.4), Vec3::NEG_Y))
        .unwrap();
    assert_eq!(east.tile_id, TileId(3));
    assert!((east.distance - 100.0).abs() < 1e-3);
    assert_eq!(east.content, "mem://scene/east/east.glb");
    assert_eq!(east.geometric_error, 5.0);

    let stats = entity.stats();
    assert_eq!(stats.active_count, 3);
    assert_eq!(stats.triangle_count, 4);
    assert_eq!(entity.pending_jobs_count(), 0);
}

#[test]
fn test_unload_and_reload() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("mem://scene/tileset.json", TILESET);
    fetcher.insert("mem://scene/tiles/west.b3dm", build_b3dm(&glb(), None));

    let index = Arc::new(TilesetIndex::open("mem://scene/tileset.json", fetcher.clone()).unwrap());
    let mut entity =
        ChunkedStreamingEntity::new(config(), index, Arc::new(SquareDecoder), Arc::new(IdentityTransform)).unwrap();
    let root = entity.root();

    // Without the external tileset the fetch leaves tile 2 unresolved
    assert!(entity.ensure_children(root).is_none());
    settle(&mut entity);

    // Asking again starts another fetch
    fetcher.insert("mem://scene/east/tileset.json", EAST_TILESET);
    assert!(entity.ensure_children(root).is_none());
    settle(&mut entity);
    entity.ensure_children(root).unwrap();

    entity.start_load(node(1));
    settle(&mut entity);
    assert!(entity.node(node(1)).unwrap().entity().is_some());

    entity.unload(node(1));
    assert!(entity.active_nodes().is_empty());
    assert_eq!(entity.node(node(1)).unwrap().state, NodeState::Skeleton);

    let fetches = fetcher.fetch_count();
    entity.start_load(node(1));
    settle(&mut entity);
    assert!(entity.node(node(1)).unwrap().entity().is_some());
    assert_eq!(fetcher.fetch_count(), fetches + 1);
}

#[test]
fn test_stream_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let tileset = r#"{
      "asset": { "version": "1.0" },
      "root": {
        "boundingVolume": { "sphere": [0, 0, 0, 10] },
        "geometricError": 1,
        "content": { "uri": "root.glb" }
      }
    }"#;
    std::fs::write(dir.path().join("tileset.json"), tileset).unwrap();
    std::fs::write(dir.path().join("root.glb"), glb()).unwrap();

    let path = dir.path().join("tileset.json");
    let index = Arc::new(TilesetIndex::open(path.to_str().unwrap(), Arc::new(FileFetcher)).unwrap());
    let mut entity =
        ChunkedStreamingEntity::new(config(), index, Arc::new(SquareDecoder), Arc::new(IdentityTransform)).unwrap();
    let root = entity.root();

    assert!(entity.start_load(root));
    let events = settle(&mut entity);
    assert_eq!(events, vec![StreamEvent::ContentLoaded { node: root, has_geometry: true }]);

    // Y-up content at the origin: the square lies in the world XZ plane
    let hit = entity
        .ray_intersection(&Ray::new(Vec3::new(1.0, 50.0, 2.0), Vec3::NEG_Y))
        .unwrap();
    assert!((hit.distance - 50.0).abs() < 1e-3);
    assert!(entity.ensure_children(root).unwrap().is_empty());
}
