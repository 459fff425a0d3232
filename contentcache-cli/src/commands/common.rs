//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;
#[cfg(test)]
use std::path::Path;

use contentcache::{CacheConfig, CacheCoordinator};

use crate::error::CliError;

/// Cache whose payloads are plain strings.
pub type StringCache = CacheCoordinator<String>;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// INI file to load settings from.
    pub config: Option<PathBuf>,
    /// Cache directory override.
    pub dir: Option<PathBuf>,
}

/// Resolve settings from the config file and CLI overrides.
///
/// The CLI directory takes precedence, then the config file, then the
/// platform default.
pub fn resolve_config(options: &GlobalOptions) -> Result<CacheConfig, CliError> {
    let mut config = match &options.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };

    if let Some(dir) = &options.dir {
        config.directory = dir.clone();
    }

    Ok(config)
}

/// Open the cache described by `options`.
pub fn open_cache(options: &GlobalOptions) -> Result<StringCache, CliError> {
    let config = resolve_config(options)?;
    tracing::debug!(directory = %config.directory.display(), "Opening cache");
    Ok(CacheCoordinator::open(config)?)
}

/// Options pointing at a specific directory.
#[cfg(test)]
pub fn options_for_dir(dir: &Path) -> GlobalOptions {
    GlobalOptions {
        config: None,
        dir: Some(dir.to_path_buf()),
    }
}
