//! Cache configuration.
//!
//! Configuration is built in code with [`CacheConfig::new`] and the `with_*`
//! methods, or loaded from an INI file:
//!
//! ```ini
//! [cache]
//! directory = /var/cache/myapp
//! size = 20MB
//! worker_threads = 4
//! key_codec = content
//! context_exit = discard
//! ```
//!
//! Every key is optional. Missing keys keep their defaults.

use std::path::{Path, PathBuf};

use ini::Ini;

use crate::cache::KeyCodec;
use crate::error::ConfigError;

/// Default disk tier capacity (20 MiB).
pub const DEFAULT_CACHE_SIZE: u64 = 20 * 1024 * 1024;

/// Default number of background workers.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Directory name used under the platform cache directory.
pub const DEFAULT_CACHE_NAME: &str = "content_cache";

/// INI section holding cache settings.
const SECTION: &str = "cache";

/// What happens to a context's entries when the context is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextExitPolicy {
    /// Delete the entries from disk as well.
    #[default]
    Discard,
    /// Keep the entries on disk so later lookups can still find them.
    Persist,
}

impl ContextExitPolicy {
    /// Parse a policy name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "discard" | "delete" => Some(ContextExitPolicy::Discard),
            "persist" | "keep" => Some(ContextExitPolicy::Persist),
            _ => None,
        }
    }
}

/// Settings for a [`CacheCoordinator`](crate::cache::CacheCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory the disk tier lives in.
    pub directory: PathBuf,
    /// Disk tier capacity in bytes.
    pub size_bytes: u64,
    /// Maximum concurrent background tasks.
    pub worker_threads: usize,
    /// Id to disk key mapping.
    pub key_codec: KeyCodec,
    /// Behavior of `remove_context` on the disk tier.
    pub context_exit: ContextExitPolicy,
}

impl CacheConfig {
    /// Create a configuration with default settings rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            size_bytes: DEFAULT_CACHE_SIZE,
            worker_threads: DEFAULT_WORKER_THREADS,
            key_codec: KeyCodec::default(),
            context_exit: ContextExitPolicy::default(),
        }
    }

    /// Set the disk capacity. Zero falls back to the default.
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = if size_bytes == 0 {
            DEFAULT_CACHE_SIZE
        } else {
            size_bytes
        };
        self
    }

    /// Set the number of background workers (at least one).
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Set the key derivation strategy.
    pub fn with_key_codec(mut self, key_codec: KeyCodec) -> Self {
        self.key_codec = key_codec;
        self
    }

    /// Set the context exit policy.
    pub fn with_context_exit(mut self, policy: ContextExitPolicy) -> Self {
        self.context_exit = policy;
        self
    }

    /// Load configuration from an INI file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the INI file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadFailed` if the file cannot be read or parsed
    /// and `ConfigError::InvalidValue` for a value that cannot be interpreted.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Build a configuration from parsed INI contents.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(config);
        };

        if let Some(value) = section.get("directory") {
            let value = value.trim();
            if !value.is_empty() {
                config.directory = expand_tilde(value);
            }
        }

        if let Some(value) = section.get("size") {
            config = config.with_size(parse_size(value).ok_or_else(|| invalid("size", value))?);
        }

        if let Some(value) = section.get("worker_threads") {
            let threads = value
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid("worker_threads", value))?;
            config = config.with_worker_threads(threads);
        }

        if let Some(value) = section.get("key_codec") {
            config.key_codec = KeyCodec::from_name(value).ok_or_else(|| invalid("key_codec", value))?;
        }

        if let Some(value) = section.get("context_exit") {
            config.context_exit =
                ContextExitPolicy::from_name(value).ok_or_else(|| invalid("context_exit", value))?;
        }

        Ok(config)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(resolve_cache_dir(DEFAULT_CACHE_NAME))
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Resolve a per-application cache directory.
///
/// Uses the platform cache directory (`~/.cache` on Linux) and falls back to
/// the system temp directory when none is known.
pub fn resolve_cache_dir(name: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(name)
}

fn expand_tilde(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}

/// Parse a size such as `20MB`, `512KB`, `1GB` or a plain byte count.
///
/// Units are binary (1 KB = 1024 bytes) and case-insensitive; `K`, `M`, `G`
/// and `B` suffixes are accepted as well.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_uppercase();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let number: u64 = digits.parse().ok()?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
