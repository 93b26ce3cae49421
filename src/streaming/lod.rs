//! Screen-space error for refinement decisions
//!
//! The streaming core does not pick which nodes to draw; the renderer
//! does. These helpers project a node's geometric error onto the screen
//! so the renderer can compare it against the configured maximum.

use glam::Vec3;

use crate::streaming::node::ChunkNode;

/// Camera parameters needed to project geometric error
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewParams {
    /// Camera position in world space
    pub eye: Vec3,
    /// Viewport size in pixels along the axis `fov` is measured on
    pub screen_size: f32,
    /// Field of view in radians
    pub fov: f32,
}

/// Project a geometric error at `distance` onto the screen, in pixels.
///
/// Infinite when the viewer is at or inside the geometry.
///
/// # Examples
/// ```
/// use tilestream::streaming::lod::screen_space_error;
///
/// let sse = screen_space_error(1.0, 100.0, 1000.0, std::f32::consts::FRAC_PI_2);
/// assert!((sse - 5.0).abs() < 1e-4);
/// assert!(screen_space_error(1.0, 0.0, 1000.0, 1.0).is_infinite());
/// ```
pub fn screen_space_error(error: f32, distance: f32, screen_size: f32, fov: f32) -> f32 {
    if distance <= 0.0 {
        return f32::INFINITY;
    }
    let phi = error / (2.0 * distance * (fov / 2.0).tan());
    phi * screen_size
}

/// Screen-space error of a node, measured from the nearest point of its box
pub fn node_screen_space_error(node: &ChunkNode, view: &ViewParams) -> f32 {
    let distance = node.bbox.distance_from_point(view.eye);
    screen_space_error(node.error, distance, view.screen_size, view.fov)
}

/// Whether a node is too coarse for this view and should be replaced by
/// (or, for additive refinement, supplemented with) its children
pub fn needs_refinement(node: &ChunkNode, view: &ViewParams, max_screen_error: f32) -> bool {
    node_screen_space_error(node, view) > max_screen_error
}
