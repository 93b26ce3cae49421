//! Byte retrieval for tilesets and tile content

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use crate::core::error::Error;
use crate::core::types::Result;

/// Fetches the bytes behind a URI. Blocking; called from background jobs.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Resolve `uri` against `base`.
///
/// Absolute URLs are returned as they are. A base that parses as a URL is
/// joined with URL rules; otherwise the base is treated as a filesystem
/// path and `uri` is taken relative to its directory.
pub fn resolve_uri(base: Option<&str>, uri: &str) -> String {
    if uri.is_empty() || Url::parse(uri).is_ok() {
        return uri.to_string();
    }
    let Some(base) = base else {
        return uri.to_string();
    };

    match Url::parse(base) {
        Ok(base_url) => match base_url.join(uri) {
            Ok(joined) => joined.to_string(),
            Err(e) => {
                log::warn!("Cannot resolve {} against {}: {}", uri, base, e);
                uri.to_string()
            }
        },
        Err(_) => {
            let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
            dir.join(uri).to_string_lossy().into_owned()
        }
    }
}

/// Reads `file://` URLs and plain paths from the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_for(uri: &str) -> Result<PathBuf> {
        if uri.starts_with("file:") {
            let url = Url::parse(uri)?;
            url.to_file_path().map_err(|_| Error::Fetch {
                uri: uri.to_string(),
                reason: "not a local file URL".into(),
            })
        } else {
            Ok(PathBuf::from(uri))
        }
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let path = Self::path_for(uri)?;
        std::fs::read(&path).map_err(|e| Error::Fetch {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }
}

/// In-memory resources keyed by URI
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut resources) = self.resources.write() {
            resources.insert(uri.into(), bytes.into());
        }
    }

    /// Number of fetch calls served so far, including misses
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let resources = self
            .resources
            .read()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        resources.get(uri).cloned().ok_or_else(|| Error::Fetch {
            uri: uri.to_string(),
            reason: "no such resource".into(),
        })
    }
}
