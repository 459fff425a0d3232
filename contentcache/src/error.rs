//! Error types for the content cache.
//!
//! Data operations on [`CacheCoordinator`](crate::cache::CacheCoordinator)
//! never return these errors; failures there are logged and surface as a
//! miss. [`CacheError`] covers construction and logging setup, while
//! configuration loading reports a [`ConfigError`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache setup operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while setting up or driving the cache tiers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error against the disk store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to encode or decode a stored entry.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Failed to create the background runtime.
    #[error("Failed to create worker runtime: {0}")]
    Runtime(String),

    /// Failed to install the logging subscriber.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        CacheError::Codec(e.to_string())
    }
}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or parsed.
    #[error("Failed to read config file {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// A key holds a value that cannot be interpreted.
    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}
