//! Chunk nodes: the loadable regions of the streamed tree

use crate::math::Aabb;
use crate::scene::entity::RenderEntity;
use crate::tiles::tile::{Refinement, TileId};

/// Identifier of a chunk node; one node per tile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkNodeId(pub TileId);

impl ChunkNodeId {
    pub fn tile_id(&self) -> TileId {
        self.0
    }
}

impl std::fmt::Display for ChunkNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content state of a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    /// Known, nothing loaded
    #[default]
    Skeleton,
    /// A content job is in flight
    Loading,
    /// Content job finished; the node may still have no geometry
    Loaded,
}

/// A node of the chunk tree
#[derive(Clone, Debug)]
pub struct ChunkNode {
    pub id: ChunkNodeId,
    /// World-space bounds
    pub bbox: Aabb,
    /// Geometric error used for refinement decisions
    pub error: f32,
    pub parent: Option<ChunkNodeId>,
    pub children: Vec<ChunkNodeId>,
    /// Children have been materialised (possibly zero of them)
    pub children_created: bool,
    pub refinement: Refinement,
    pub state: NodeState,
    entity: Option<RenderEntity>,
}

impl ChunkNode {
    pub fn new(id: ChunkNodeId, bbox: Aabb, error: f32, parent: Option<ChunkNodeId>) -> Self {
        Self {
            id,
            bbox,
            error,
            parent,
            children: Vec::new(),
            children_created: false,
            refinement: Refinement::Replace,
            state: NodeState::Skeleton,
            entity: None,
        }
    }

    pub fn entity(&self) -> Option<&RenderEntity> {
        self.entity.as_ref()
    }

    /// Take ownership of loaded content
    pub(crate) fn set_loaded(&mut self, entity: Option<RenderEntity>) {
        self.entity = entity;
        self.state = NodeState::Loaded;
    }

    /// Drop loaded content and go back to skeleton state
    pub(crate) fn unload(&mut self) -> Option<RenderEntity> {
        self.state = NodeState::Skeleton;
        self.entity.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_node_lifecycle() {
        let mut node = ChunkNode::new(ChunkNodeId(TileId(3)), Aabb::new(Vec3::ZERO, Vec3::ONE), 12.0, None);
        assert_eq!(node.state, NodeState::Skeleton);
        assert!(node.entity().is_none());

        node.set_loaded(Some(RenderEntity::new("a.b3dm")));
        assert_eq!(node.state, NodeState::Loaded);
        assert_eq!(node.entity().unwrap().source, "a.b3dm");

        let entity = node.unload();
        assert!(entity.is_some());
        assert_eq!(node.state, NodeState::Skeleton);
        assert!(node.entity().is_none());
    }

    #[test]
    fn test_loaded_without_geometry() {
        let mut node = ChunkNode::new(ChunkNodeId(TileId(1)), Aabb::default(), 1.0, Some(ChunkNodeId(TileId(0))));
        node.set_loaded(None);
        assert_eq!(node.state, NodeState::Loaded);
        assert!(node.entity().is_none());
        assert_eq!(node.parent, Some(ChunkNodeId(TileId(0))));
    }
}
