//! Mathematical utilities and data structures

pub mod aabb;
pub mod ray;
pub mod box3d;
pub mod obb;

pub use aabb::Aabb;
pub use ray::Ray;
pub use box3d::Box3d;
pub use obb::OrientedBox;
