//! Two-tier content cache.
//!
//! A fast in-memory tier layered over a capacity-bounded, persistent disk
//! tier, shared by any number of contexts (independent namespaces such as a
//! screen or a session).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   CacheCoordinator                    │
//! │   get / get_async / load / has / put / remove / ...   │
//! └──────────┬───────────────────────────┬───────────────┘
//!            │                           │
//!            ▼                           ▼
//!   ┌─────────────────┐        ┌───────────────────┐      ┌────────────┐
//!   │   MemoryIndex   │        │     DiskTier      │─────►│ TaskRunner │
//!   │ context → id →  │        │ lifecycle, ready  │      │ (workers)  │
//!   │   CacheEntry    │        │ monitor, pending  │      └────────────┘
//!   └─────────────────┘        └─────────┬─────────┘
//!                                        │ KeyCodec + bincode
//!                                        ▼
//!                              ┌───────────────────┐
//!                              │  DiskStore trait  │
//!                              │  (LruFileStore)   │
//!                              └───────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`entry`]: entries and TTL model
//! - [`key`]: id to disk key mapping
//! - [`memory`]: in-memory tier
//! - [`traits`]: persistent store contract
//! - [`providers`]: store implementations
//! - [`disk`]: disk tier lifecycle and write-behind
//! - [`coordinator`]: public cache operations

pub mod codec;
pub mod coordinator;
pub mod disk;
pub mod entry;
pub mod key;
pub mod loader;
pub mod memory;
pub mod providers;
pub mod runner;
pub mod stats;
pub mod traits;

pub use coordinator::CacheCoordinator;
pub use disk::{DiskPhase, DiskTier};
pub use entry::CacheEntry;
pub use key::KeyCodec;
pub use loader::{CacheLoader, FnLoader, LoadHandle};
pub use memory::MemoryIndex;
pub use providers::LruFileStore;
pub use runner::TaskRunner;
pub use stats::CacheStats;
pub use traits::{DiskStore, StoreEditor, StoreSnapshot};
