//! ContentCache - Two-tier memory and disk content cache
//!
//! This library provides a cache shared by independent contexts, with a fast
//! in-memory tier over a capacity-bounded persistent tier, per-entry TTLs and
//! both blocking and callback-driven retrieval.
//!
//! # Quick start
//!
//! ```ignore
//! use contentcache::{CacheConfig, CacheCoordinator};
//!
//! let cache: CacheCoordinator<Vec<u8>> = CacheCoordinator::open(CacheConfig::default())?;
//! cache.put("thumbnails", "https://example.com/a.png", bytes);
//! let hit = cache.get("thumbnails", "https://example.com/a.png");
//! cache.close();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;

pub use cache::{CacheCoordinator, CacheLoader, CacheStats, DiskPhase, FnLoader, KeyCodec, LoadHandle};
pub use config::{CacheConfig, ContextExitPolicy};
pub use error::{CacheError, CacheResult, ConfigError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
