//! Error types for tile streaming

use thiserror::Error;

/// Main error type for the crate
///
/// Only hard failures end up here. A tile without renderable content, a
/// failed content fetch or an unsupported payload is not an error; the
/// node simply ends up without geometry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Tileset error: {0}")]
    Tileset(String),

    #[error("Fetch error for {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("Runtime error: {0}")]
    Runtime(String),
}
