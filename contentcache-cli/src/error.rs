//! CLI error type.

use contentcache::{CacheError, ConfigError};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be used.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The cache could not be opened.
    #[error("Failed to open cache: {0}")]
    Open(#[from] CacheError),

    /// A lookup found nothing.
    #[error("No entry for '{id}' in context '{context}'")]
    NotFound { context: String, id: String },
}
