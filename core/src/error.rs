//! Error types for cache, configuration and prediction.
//!
//! Forum call failures live next to the API seam in [`crate::forum`].

use std::path::PathBuf;

use thiserror::Error;

use crate::forum::ForumError;

/// Errors from the on-disk JSON caches.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache file {} not found; run `voron-serials fetch` first", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors loading or validating `voron-serials.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at path: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value: {0}")]
    Validation(String),
}

/// Errors that abort a prediction run.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no issued {lineage} serial found in the registry or bot comments")]
    NoIssuedSerial { lineage: String },

    #[error("latest issued serial {0} has no numeric part")]
    UnparseableSerial(String),

    #[error("failed to walk the request queue: {0}")]
    Forum(#[from] ForumError),
}
