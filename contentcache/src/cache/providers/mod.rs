//! Disk store implementations.
//!
//! Each provider implements the [`DiskStore`](crate::cache::DiskStore) trait
//! and owns its own eviction. Providers are not used directly by callers;
//! the disk tier opens them during initialization.
//!
//! # Available Providers
//!
//! - [`LruFileStore`]: one file per value slot with LRU eviction by size

mod file;

pub use file::{FileEditor, FileSnapshot, LruFileStore, META_FILE};
