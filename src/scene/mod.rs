//! Renderable scene content

pub mod entity;

pub use entity::{DecodedMesh, EntityTransform, MeshDecoder, MeshHit, MeshPrimitive, RenderEntity};
