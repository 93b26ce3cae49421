//! Core type aliases and re-exports

pub use glam::{
    Vec3, Vec4,
    Mat3, Mat4,
    DVec3, DVec4,
    DMat3, DMat4,
};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
