//! Streaming configuration
//!
//! Settings shared by the loader factory and the streaming entity. Both
//! structs are serde-serializable so a host application can keep them in
//! a JSON file next to its other settings.

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Placement of the scene in the map coordinate reference system.
///
/// The extent is the 2D footprint of the scene in map units. The origin is
/// subtracted from every map coordinate before it is converted to world
/// (render) space, which keeps world coordinates small enough for f32.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    pub extent_min: [f64; 2],
    pub extent_max: [f64; 2],
    pub origin: DVec3,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            extent_min: [-1000.0, -1000.0],
            extent_max: [1000.0, 1000.0],
            origin: DVec3::ZERO,
        }
    }
}

impl SceneSettings {
    /// Create settings from an extent; the origin is the extent centre at z = 0.
    pub fn from_extent(min: [f64; 2], max: [f64; 2]) -> Self {
        let origin = DVec3::new((min[0] + max[0]) * 0.5, (min[1] + max[1]) * 0.5, 0.0);
        Self {
            extent_min: min,
            extent_max: max,
            origin,
        }
    }

    /// Centre of the extent in map coordinates.
    pub fn extent_center(&self) -> [f64; 2] {
        [
            (self.extent_min[0] + self.extent_max[0]) * 0.5,
            (self.extent_min[1] + self.extent_max[1]) * 0.5,
        ]
    }

    /// Map coordinates to world coordinates.
    ///
    /// World space is Y-up: map X stays X, map Z (height) becomes Y and
    /// map Y becomes -Z.
    pub fn map_to_world(&self, map: DVec3) -> DVec3 {
        DVec3::new(
            map.x - self.origin.x,
            map.z - self.origin.z,
            -(map.y - self.origin.y),
        )
    }
}

/// Configuration for a streamed tiled scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Scene extent and origin in map coordinates
    pub scene: SceneSettings,
    /// Multiplier applied to all heights
    pub z_scale: f64,
    /// Offset added to all heights after scaling
    pub z_offset: f64,
    /// Screen-space error (pixels) above which the renderer should refine
    pub max_screen_error: f32,
    /// Expose node bounding boxes for debug drawing
    pub show_bounding_boxes: bool,
    /// Threads in the background pool used for content loads and hierarchy fetches
    pub worker_threads: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            scene: SceneSettings::default(),
            z_scale: 1.0,
            z_offset: 0.0,
            max_screen_error: 16.0,
            show_bounding_boxes: false,
            worker_threads: 4,
        }
    }
}

impl StreamingConfig {
    /// Parse configuration from a JSON string. Missing fields use defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Apply the configured vertical scale and offset to a height.
    pub fn scale_z(&self, z: f64) -> f64 {
        z * self.z_scale + self.z_offset
    }
}
