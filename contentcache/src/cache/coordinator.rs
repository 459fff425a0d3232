//! Two-tier cache coordinator.
//!
//! [`CacheCoordinator`] layers a [`MemoryIndex`] over a [`DiskTier`] and is
//! the only type callers talk to. It decides which tier answers a lookup,
//! promotes disk hits into memory, enforces TTLs across both tiers and moves
//! disk writes off the caller's thread.
//!
//! # Tier flow
//!
//! ```text
//! get ──► memory ──hit──► payload
//!            │miss
//!            ▼
//!         await disk ready ──► disk ──hit──► decode ──► promote ──► payload
//!                               │miss / undecodable / expired
//!                               ▼
//!                              None
//!
//! put ──► memory (synchronous) ──► pending intent ──► worker ──► disk
//! ```
//!
//! No data operation returns an error. Disk failures are logged and surface
//! as a miss, and an unusable disk tier leaves the cache running memory-only.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use contentcache::cache::CacheCoordinator;
//! use contentcache::config::CacheConfig;
//!
//! let cache: CacheCoordinator<String> = CacheCoordinator::open(CacheConfig::new("/tmp/cache"))?;
//! cache.put_with_ttl("session", "greeting", "hello".to_string(), Duration::from_secs(60));
//! assert_eq!(cache.get("session", "greeting").as_deref(), Some("hello"));
//! cache.close();
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::codec;
use crate::cache::disk::{DiskPhase, DiskTier};
use crate::cache::entry::{now_millis, CacheEntry};
use crate::cache::key::KeyCodec;
use crate::cache::loader::{CacheLoader, LoadHandle};
use crate::cache::memory::MemoryIndex;
use crate::cache::providers::LruFileStore;
use crate::cache::runner::TaskRunner;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::cache::traits::DiskStore;
use crate::config::{CacheConfig, ContextExitPolicy};
use crate::error::CacheResult;

/// Outcome of a memory tier lookup.
enum MemoryLookup<V> {
    Hit(V),
    Expired,
    Miss,
}

/// Whether stored bytes hold nothing any caller could be served.
fn is_unservable<V: DeserializeOwned>(bytes: &[u8]) -> bool {
    codec::decode::<V>(bytes).map_or(true, |entry| entry.is_expired())
}

/// State shared with background tasks.
struct Shared<V, S: DiskStore> {
    memory: MemoryIndex<V>,
    disk: Arc<DiskTier<S>>,
    key_codec: KeyCodec,
    stats: Arc<StatsCounters>,
    /// Bumped by `clear`; promotions started before a clear are dropped.
    generation: AtomicU64,
}

impl<V, S> Shared<V, S>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: DiskStore,
{
    /// Look up the memory tier, dropping the entry if it has expired.
    fn check_memory(&self, context: &str, id: &str) -> MemoryLookup<V> {
        let Some(entry) = self.memory.get(context, id) else {
            return MemoryLookup::Miss;
        };

        let now = now_millis();
        if entry.is_expired_at(now) {
            self.memory
                .remove_if(context, id, |current| current.is_expired_at(now));
            StatsCounters::incr(&self.stats.expirations);
            debug!(context, id, "Memory entry expired");
            return MemoryLookup::Expired;
        }
        MemoryLookup::Hit(entry.into_payload())
    }

    /// Read a live entry for the pair from the disk tier.
    ///
    /// Blocks until the disk tier is initialized. Expired and undecodable
    /// entries are purged from disk and reported as absent.
    fn read_disk(&self, context: &str, id: &str) -> Option<CacheEntry<V>> {
        let key = self.key_codec.disk_key(id);
        let bytes = self.disk.get(&key)?;

        let entry: CacheEntry<V> = match codec::decode(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(context, id, key = %key, error = %e, "Discarding undecodable disk entry");
                StatsCounters::incr(&self.stats.disk_errors);
                self.disk.purge_if(&key, is_unservable::<V>);
                return None;
            }
        };

        // Disk keys derive from the id alone; the pair must match too.
        if entry.context != context || entry.id != id {
            debug!(context, id, owner = %entry.context, "Disk entry belongs to another pair");
            return None;
        }

        if entry.is_expired() {
            StatsCounters::incr(&self.stats.expirations);
            debug!(context, id, "Disk entry expired");
            self.disk.purge_if(&key, is_unservable::<V>);
            return None;
        }

        Some(entry)
    }

    /// Resolve a memory miss from disk and promote the result.
    fn load_from_disk(&self, context: &str, id: &str, generation: u64) -> Option<V> {
        let Some(entry) = self.read_disk(context, id) else {
            StatsCounters::incr(&self.stats.misses);
            return None;
        };

        let key = self.key_codec.disk_key(id);
        let held = self.memory.promote(context, id, entry, || {
            self.generation.load(Ordering::SeqCst) == generation
                && !self.disk.has_pending_remove(&key)
        });

        match held.filter(|entry| !entry.is_expired()) {
            Some(entry) => {
                StatsCounters::incr(&self.stats.disk_hits);
                debug!(context, id, "Promoted disk entry to memory");
                Some(entry.into_payload())
            }
            None => {
                StatsCounters::incr(&self.stats.misses);
                None
            }
        }
    }
}

/// Two-tier content cache shared by multiple contexts.
///
/// All methods take `&self`; share the coordinator between threads with an
/// `Arc`. Dropping it closes the disk tier after applying pending writes.
pub struct CacheCoordinator<V, S = LruFileStore>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: DiskStore,
{
    shared: Arc<Shared<V, S>>,
    runner: TaskRunner,
    context_exit: ContextExitPolicy,
}

impl<V, S> CacheCoordinator<V, S>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: DiskStore,
{
    /// Open a coordinator with its own worker runtime.
    ///
    /// Disk initialization starts in the background; the first lookup that
    /// misses memory waits for it.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Runtime` if the worker runtime cannot be built.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        let runner = TaskRunner::new(config.worker_threads)?;
        Ok(Self::open_with_runner(config, runner))
    }

    /// Open a coordinator on a caller-supplied runner.
    ///
    /// # Arguments
    ///
    /// * `config` - Cache settings
    /// * `runner` - Runner for disk initialization, write-behind and
    ///   asynchronous loads
    pub fn open_with_runner(config: CacheConfig, runner: TaskRunner) -> Self {
        let stats = Arc::new(StatsCounters::default());
        let disk = Arc::new(DiskTier::with_stats(
            config.directory.clone(),
            config.size_bytes,
            Arc::clone(&stats),
        ));
        disk.init_in_background(&runner);

        info!(
            directory = %config.directory.display(),
            capacity = config.size_bytes,
            key_codec = ?config.key_codec,
            context_exit = ?config.context_exit,
            "Content cache opened"
        );

        Self {
            shared: Arc::new(Shared {
                memory: MemoryIndex::new(),
                disk,
                key_codec: config.key_codec,
                stats,
                generation: AtomicU64::new(0),
            }),
            runner,
            context_exit: config.context_exit,
        }
    }

    /// Get the payload stored for `(context, id)`.
    ///
    /// On a memory miss this blocks until the disk tier is ready and reads
    /// it on the calling thread. A disk hit is promoted into memory.
    pub fn get(&self, context: &str, id: &str) -> Option<V> {
        match self.shared.check_memory(context, id) {
            MemoryLookup::Hit(value) => {
                StatsCounters::incr(&self.shared.stats.memory_hits);
                Some(value)
            }
            MemoryLookup::Expired => {
                StatsCounters::incr(&self.shared.stats.misses);
                self.purge_disk_later(id);
                None
            }
            MemoryLookup::Miss => {
                let generation = self.shared.generation.load(Ordering::SeqCst);
                self.shared.load_from_disk(context, id, generation)
            }
        }
    }

    /// Get the payload for `(context, id)` without blocking on the disk.
    ///
    /// A memory hit (or memory expiry) is reported to `loader` on the calling
    /// thread. Otherwise `loader.on_loading()` runs on the calling thread,
    /// the disk lookup runs on a worker, and the worker delivers the result.
    pub fn get_async<L>(&self, context: &str, id: &str, loader: L)
    where
        L: CacheLoader<V>,
    {
        match self.shared.check_memory(context, id) {
            MemoryLookup::Hit(value) => {
                StatsCounters::incr(&self.shared.stats.memory_hits);
                loader.on_result(Some(value));
            }
            MemoryLookup::Expired => {
                StatsCounters::incr(&self.shared.stats.misses);
                self.purge_disk_later(id);
                loader.on_result(None);
            }
            MemoryLookup::Miss => {
                loader.on_loading();
                let shared = Arc::clone(&self.shared);
                let generation = shared.generation.load(Ordering::SeqCst);
                let (context, id) = (context.to_string(), id.to_string());
                self.runner.spawn(move || {
                    let value = shared.load_from_disk(&context, &id, generation);
                    loader.on_result(value);
                });
            }
        }
    }

    /// Future-shaped variant of [`get_async`](Self::get_async).
    ///
    /// The returned handle reports whether work was offloaded through
    /// [`LoadHandle::is_loading`] and resolves to the payload.
    pub fn load(&self, context: &str, id: &str) -> LoadHandle<V> {
        match self.shared.check_memory(context, id) {
            MemoryLookup::Hit(value) => {
                StatsCounters::incr(&self.shared.stats.memory_hits);
                LoadHandle::ready(Some(value))
            }
            MemoryLookup::Expired => {
                StatsCounters::incr(&self.shared.stats.misses);
                self.purge_disk_later(id);
                LoadHandle::ready(None)
            }
            MemoryLookup::Miss => {
                let (tx, rx) = oneshot::channel();
                let shared = Arc::clone(&self.shared);
                let generation = shared.generation.load(Ordering::SeqCst);
                let (context, id) = (context.to_string(), id.to_string());
                self.runner.spawn(move || {
                    let value = shared.load_from_disk(&context, &id, generation);
                    // The receiver may have been dropped; nothing to deliver to.
                    let _ = tx.send(value);
                });
                LoadHandle::pending(rx)
            }
        }
    }

    /// Whether a live entry exists for `(context, id)`.
    ///
    /// Checks the disk tier on a memory miss but does not promote.
    pub fn has(&self, context: &str, id: &str) -> bool {
        match self.shared.check_memory(context, id) {
            MemoryLookup::Hit(_) => true,
            MemoryLookup::Expired => {
                self.purge_disk_later(id);
                false
            }
            MemoryLookup::Miss => self.shared.read_disk(context, id).is_some(),
        }
    }

    /// Store `value` for `(context, id)` without expiration.
    pub fn put(&self, context: &str, id: &str, value: V) {
        self.insert(CacheEntry::new(context, id, value));
    }

    /// Store `value` for `(context, id)`, expiring `ttl` from now.
    pub fn put_with_ttl(&self, context: &str, id: &str, value: V, ttl: Duration) {
        self.insert(CacheEntry::with_ttl(context, id, value, ttl));
    }

    fn insert(&self, entry: CacheEntry<V>) {
        let key = self.shared.key_codec.disk_key(&entry.id);
        let encoded = codec::encode(&entry);
        let (context, id) = (entry.context.clone(), entry.id.clone());

        self.shared.memory.put(&context, &id, entry);

        match encoded {
            Ok(bytes) => self.shared.disk.schedule_write(&self.runner, key, bytes),
            Err(e) => {
                warn!(context = %context, id = %id, error = %e, "Failed to encode entry, keeping it in memory only");
                self.shared.disk.schedule_remove(&self.runner, key);
            }
        }
    }

    /// Remove `(context, id)` from both tiers.
    ///
    /// The memory removal is immediate; the disk removal is applied in the
    /// background and its failure is only logged.
    pub fn remove(&self, context: &str, id: &str) {
        // Record the disk removal first so an in-flight promotion sees it.
        let key = self.shared.key_codec.disk_key(id);
        self.shared.disk.schedule_remove(&self.runner, key);
        self.shared.memory.remove(context, id);
    }

    /// Drop every memory entry of `context`.
    ///
    /// Under [`ContextExitPolicy::Discard`] the same ids are removed from
    /// disk. Under [`ContextExitPolicy::Persist`] live entries are written to
    /// disk instead so later lookups can restore them.
    ///
    /// # Returns
    ///
    /// The ids that were held in memory for the context.
    pub fn remove_context(&self, context: &str) -> Vec<String> {
        let entries = self.shared.memory.remove_context(context);
        let now = now_millis();

        let mut ids = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let key = self.shared.key_codec.disk_key(&id);
            let persist = self.context_exit == ContextExitPolicy::Persist && !entry.is_expired_at(now);

            match persist.then(|| codec::encode(&entry)) {
                Some(Ok(bytes)) => self.shared.disk.schedule_write(&self.runner, key, bytes),
                Some(Err(e)) => {
                    warn!(context, id = %id, error = %e, "Failed to encode entry on context exit");
                    self.shared.disk.schedule_remove(&self.runner, key);
                }
                None => self.shared.disk.schedule_remove(&self.runner, key),
            }
            ids.push(id);
        }

        debug!(context, count = ids.len(), policy = ?self.context_exit, "Context removed");
        ids
    }

    /// Bytes held by the disk tier, or 0 if it is not open.
    pub fn size(&self) -> u64 {
        self.shared.disk.size()
    }

    /// Empty both tiers.
    ///
    /// Pending disk writes are discarded. The disk store is deleted and
    /// initialized again on the calling thread before this returns.
    pub fn clear(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.memory.clear();
        self.shared.disk.clear();
        info!("Content cache cleared");
    }

    /// Flush the disk store.
    pub fn flush(&self) {
        self.shared.disk.flush();
    }

    /// Apply pending disk writes and close the disk tier.
    ///
    /// The memory tier keeps working. Disk operations are no-ops until
    /// [`reinit`](Self::reinit).
    pub fn close(&self) {
        self.shared.disk.close();
    }

    /// Reopen the disk tier after `close` or a failed initialization.
    pub fn reinit(&self) {
        self.shared.disk.reinit();
    }

    /// Snapshot of hit/miss counters and tier sizes.
    pub fn stats(&self) -> CacheStats {
        self.shared
            .stats
            .snapshot(self.shared.memory.len(), self.shared.disk.size())
    }

    /// Lifecycle phase of the disk tier.
    pub fn phase(&self) -> DiskPhase {
        self.shared.disk.phase()
    }

    /// Block until disk initialization has finished.
    pub fn await_ready(&self) -> DiskPhase {
        self.shared.disk.await_ready()
    }

    /// Directory of the disk tier.
    pub fn directory(&self) -> &Path {
        self.shared.disk.directory()
    }

    /// Capacity of the disk tier in bytes.
    pub fn capacity(&self) -> u64 {
        self.shared.disk.capacity()
    }

    /// The memory tier.
    pub fn memory(&self) -> &MemoryIndex<V> {
        &self.shared.memory
    }

    /// Remove `id` from disk in the background if what is stored for it has
    /// expired by the time the worker gets to it.
    fn purge_disk_later(&self, id: &str) {
        let key = self.shared.key_codec.disk_key(id);
        let disk = Arc::clone(&self.shared.disk);
        self.runner.spawn(move || disk.purge_if(&key, is_unservable::<V>));
    }
}

impl<V, S> Drop for CacheCoordinator<V, S>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: DiskStore,
{
    fn drop(&mut self) {
        self.shared.disk.close();
    }
}
