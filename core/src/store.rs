//! On-disk JSON caches.
//!
//! ```text
//! sidebar_serials.json   { "V2.1234": { created_utc, owner, post_id }, ... }
//! bot_comments.json      [ { id, created_utc, body, post_id, post_created_utc, serial? }, ... ]
//! ```
//!
//! Both files are read whole, mutated in memory and rewritten whole. There is
//! no locking; the last writer wins.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::comments::CommentLog;
use crate::error::StoreError;
use crate::registry::Registry;

/// Locations of the registry and comment caches.
#[derive(Debug, Clone)]
pub struct CacheStore {
    registry_path: PathBuf,
    comments_path: PathBuf,
}

impl CacheStore {
    pub fn new(registry_path: impl Into<PathBuf>, comments_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            comments_path: comments_path.into(),
        }
    }

    /// Store with the default filenames inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join(crate::DEFAULT_REGISTRY_FILENAME),
            dir.join(crate::DEFAULT_COMMENTS_FILENAME),
        )
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn comments_path(&self) -> &Path {
        &self.comments_path
    }

    /// Load the registry, or an empty one if the cache does not exist yet.
    pub fn load_registry(&self) -> Result<Registry, StoreError> {
        Ok(read_json(&self.registry_path)?.unwrap_or_default())
    }

    /// Load the comment log, or an empty one if the cache does not exist yet.
    pub fn load_comments(&self) -> Result<CommentLog, StoreError> {
        Ok(read_json(&self.comments_path)?.unwrap_or_default())
    }

    /// Load the registry, failing if it has never been fetched.
    pub fn require_registry(&self) -> Result<Registry, StoreError> {
        read_json(&self.registry_path)?.ok_or_else(|| StoreError::Missing {
            path: self.registry_path.clone(),
        })
    }

    /// Load the comment log, failing if it has never been fetched.
    pub fn require_comments(&self) -> Result<CommentLog, StoreError> {
        read_json(&self.comments_path)?.ok_or_else(|| StoreError::Missing {
            path: self.comments_path.clone(),
        })
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<(), StoreError> {
        write_json(&self.registry_path, registry)
    }

    pub fn save_comments(&self, comments: &CommentLog) -> Result<(), StoreError> {
        write_json(&self.comments_path, comments)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `value` to a `.tmp` sibling and rename it over `path`.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string(value)?;
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json.as_bytes()).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
