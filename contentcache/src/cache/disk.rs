//! Disk tier adapter.
//!
//! Wraps a [`DiskStore`] with the lifecycle the coordinator needs:
//!
//! ```text
//! Uninitialized ──► Initializing ──┬──► Ready ───────┬──► Closed
//!                        ▲         └──► Unavailable ─┘      │
//!                        └──────────── clear / reinit ◄─────┘
//! ```
//!
//! `Unavailable` is a steady state: the volume was too small or the store
//! failed to open, and every disk operation is a silent no-op.
//!
//! # Locking
//!
//! One mutex guards the store handle and the phase; every store operation
//! runs under it. Readers that arrive while the store is initializing wait on
//! a condition variable instead of polling.
//!
//! # Write-behind
//!
//! Mutations requested by the coordinator are recorded as the latest pending
//! intent for their key and applied later on a worker. A worker takes the
//! intent while holding the store lock, so intents reach the store in the
//! order they were recorded and an older write can never land after a newer
//! remove. Reads look at pending intents before the store, which makes a
//! caller's own writes visible to its next read.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::cache::runner::TaskRunner;
use crate::cache::stats::StatsCounters;
use crate::cache::traits::{DiskStore, StoreEditor, StoreSnapshot};

/// Schema version passed to the store.
pub const APP_VERSION: u32 = 1;

/// Value slots per stored entry.
pub const VALUE_COUNT: usize = 1;

/// The slot holding the encoded entry.
const VALUE_SLOT: usize = 0;

/// Subdirectory of the cache directory that the store owns.
pub const STORE_DIR: &str = "store";

/// Lifecycle phase of the disk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskPhase {
    /// Initialization has not started.
    Uninitialized,
    /// The store is being opened.
    Initializing,
    /// The store is open.
    Ready,
    /// The store could not be opened; the cache runs memory-only.
    Unavailable,
    /// The store was closed.
    Closed,
}

#[derive(Clone)]
enum PendingOp {
    Write(Arc<Vec<u8>>),
    Remove,
}

struct DiskState<S> {
    phase: DiskPhase,
    store: Option<S>,
}

/// Lifecycle-managed access to the persistent store.
pub struct DiskTier<S: DiskStore> {
    directory: PathBuf,
    capacity: u64,
    state: Mutex<DiskState<S>>,
    ready: Condvar,
    pending: Mutex<HashMap<String, PendingOp>>,
    /// Set by `close`; new intents are rejected until re-initialized.
    closed: AtomicBool,
    stats: Arc<StatsCounters>,
}

impl<S: DiskStore> DiskTier<S> {
    /// Create an uninitialized tier.
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory the store lives in
    /// * `capacity` - Store capacity in bytes
    pub fn new(directory: PathBuf, capacity: u64) -> Self {
        Self::with_stats(directory, capacity, Arc::new(StatsCounters::default()))
    }

    pub(crate) fn with_stats(directory: PathBuf, capacity: u64, stats: Arc<StatsCounters>) -> Self {
        Self {
            directory,
            capacity,
            state: Mutex::new(DiskState {
                phase: DiskPhase::Uninitialized,
                store: None,
            }),
            ready: Condvar::new(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    /// Directory the store lives in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Directory handed to the store.
    pub fn store_directory(&self) -> PathBuf {
        self.directory.join(STORE_DIR)
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> DiskPhase {
        self.state.lock().phase
    }

    /// Initialize the store on the calling thread.
    pub fn init(&self) {
        let mut state = self.state.lock();
        if matches!(state.phase, DiskPhase::Ready) {
            return;
        }
        self.init_locked(&mut state);
    }

    /// Initialize the store on a worker.
    ///
    /// Callers arriving before the worker finishes block in
    /// [`await_ready`](Self::await_ready).
    pub fn init_in_background(self: &Arc<Self>, runner: &TaskRunner) {
        {
            let mut state = self.state.lock();
            if matches!(state.phase, DiskPhase::Ready | DiskPhase::Initializing) {
                return;
            }
            state.phase = DiskPhase::Initializing;
        }

        let tier = Arc::clone(self);
        runner.spawn(move || {
            let mut state = tier.state.lock();
            if state.phase == DiskPhase::Initializing {
                tier.init_locked(&mut state);
            }
        });
    }

    /// Block until initialization has finished.
    ///
    /// An uninitialized tier is initialized on the calling thread.
    pub fn await_ready(&self) -> DiskPhase {
        self.lock_ready().phase
    }

    /// Read the bytes stored for `key`.
    ///
    /// Returns `None` if absent, if the tier is not usable, or on I/O error.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(op) = self.pending_intent(key) {
            return match op {
                PendingOp::Write(bytes) => Some(bytes.as_ref().clone()),
                PendingOp::Remove => None,
            };
        }

        let mut state = self.lock_ready();
        let store = state.store.as_mut()?;
        match read_slot(store, key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read failed");
                StatsCounters::incr(&self.stats.disk_errors);
                None
            }
        }
    }

    /// Write `bytes` for `key` on the calling thread, replacing any value.
    ///
    /// Returns `true` if the value was committed.
    pub fn put(&self, key: &str, bytes: &[u8]) -> bool {
        let mut state = self.lock_ready();
        self.pending.lock().remove(key);
        match state.store.as_mut() {
            Some(store) => self.write_locked(store, key, bytes),
            None => false,
        }
    }

    /// Remove `key` on the calling thread. Failures are logged.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.lock_ready();
        self.pending.lock().remove(key);
        match state.store.as_mut() {
            Some(store) => self.remove_locked(store, key),
            None => false,
        }
    }

    /// Remove `key` if the bytes stored for it are still `stale`.
    ///
    /// The check and the removal happen under the store lock, and nothing
    /// is removed while an intent for `key` is pending. An entry replaced
    /// after it was found expired or unreadable is therefore kept.
    pub fn purge_if<F>(&self, key: &str, stale: F) -> bool
    where
        F: FnOnce(&[u8]) -> bool,
    {
        let mut state = self.lock_ready();
        if self.pending.lock().contains_key(key) {
            return false;
        }
        let Some(store) = state.store.as_mut() else {
            return false;
        };
        match read_slot(store, key) {
            Ok(Some(bytes)) if stale(&bytes) => self.remove_locked(store, key),
            Ok(_) => false,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read before purge failed");
                StatsCounters::incr(&self.stats.disk_errors);
                false
            }
        }
    }

    /// Whether a removal of `key` is waiting to be applied.
    pub fn has_pending_remove(&self, key: &str) -> bool {
        matches!(self.pending.lock().get(key), Some(PendingOp::Remove))
    }

    /// Record a write for `key` and apply it on a worker.
    pub fn schedule_write(self: &Arc<Self>, runner: &TaskRunner, key: String, bytes: Vec<u8>) {
        self.schedule(runner, key, PendingOp::Write(Arc::new(bytes)));
    }

    /// Record a removal of `key` and apply it on a worker.
    pub fn schedule_remove(self: &Arc<Self>, runner: &TaskRunner, key: String) {
        self.schedule(runner, key, PendingOp::Remove);
    }

    /// Number of intents not yet applied.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Bytes held by the store, or 0 if it is not open.
    pub fn size(&self) -> u64 {
        self.state
            .lock()
            .store
            .as_ref()
            .map(|store| store.size())
            .unwrap_or(0)
    }

    /// Apply outstanding intents and flush the store.
    pub fn flush(&self) {
        let mut state = self.lock_ready();
        self.drain_locked(&mut state);
        if let Some(store) = state.store.as_mut() {
            match store.flush() {
                Ok(()) => debug!("Disk cache flushed"),
                Err(e) => {
                    error!(error = %e, "Disk cache flush failed");
                    StatsCounters::incr(&self.stats.disk_errors);
                }
            }
        }
    }

    /// Apply outstanding intents, then close the store.
    ///
    /// Closing an already closed tier is a no-op.
    pub fn close(&self) {
        let mut state = self.lock_ready();
        self.closed.store(true, Ordering::SeqCst);
        if state.phase == DiskPhase::Closed {
            return;
        }

        self.drain_locked(&mut state);

        if let Some(mut store) = state.store.take() {
            if !store.is_closed() {
                match store.close() {
                    Ok(()) => info!(directory = %self.directory.display(), "Disk cache closed"),
                    Err(e) => error!(error = %e, "Disk cache close failed"),
                }
            }
        }
        state.phase = DiskPhase::Closed;
        self.ready.notify_all();
    }

    /// Delete everything in the store and initialize it again.
    ///
    /// Outstanding intents are discarded.
    pub fn clear(&self) {
        let mut state = self.lock_ready();
        self.pending.lock().clear();
        state.phase = DiskPhase::Initializing;

        let store = match state.store.take() {
            Some(store) if !store.is_closed() => Some(store),
            _ => self.open_for_delete(),
        };
        if let Some(mut store) = store {
            match store.delete_all() {
                Ok(()) => info!(directory = %self.directory.display(), "Disk cache cleared"),
                Err(e) => {
                    error!(error = %e, "Disk cache clear failed");
                    StatsCounters::incr(&self.stats.disk_errors);
                }
            }
        }

        self.init_locked(&mut state);
    }

    /// Open a closed or unavailable tier again.
    pub fn reinit(&self) {
        let mut state = self.lock_ready();
        if state.phase == DiskPhase::Ready {
            return;
        }
        state.store = None;
        state.phase = DiskPhase::Initializing;
        self.init_locked(&mut state);
    }

    fn schedule(self: &Arc<Self>, runner: &TaskRunner, key: String, op: PendingOp) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(key = %key, "Disk cache closed, dropping write-behind");
            return;
        }
        self.pending.lock().insert(key.clone(), op);

        let tier = Arc::clone(self);
        runner.spawn(move || tier.apply_pending(&key));
    }

    fn apply_pending(&self, key: &str) {
        let mut state = self.lock_ready();
        // Taken under the store lock so application order matches intent order.
        let Some(op) = self.pending.lock().remove(key) else {
            return;
        };
        match state.store.as_mut() {
            Some(store) => self.apply_locked(store, key, op),
            None => debug!(key = %key, phase = ?state.phase, "Disk cache not open, dropping write-behind"),
        }
    }

    /// Apply every pending intent. Intents are dropped if the store is not open.
    fn drain_locked(&self, state: &mut DiskState<S>) {
        let drained: Vec<(String, PendingOp)> = self.pending.lock().drain().collect();
        if let Some(store) = state.store.as_mut() {
            for (key, op) in drained {
                self.apply_locked(store, &key, op);
            }
        }
    }

    fn apply_locked(&self, store: &mut S, key: &str, op: PendingOp) {
        match op {
            PendingOp::Write(bytes) => {
                self.write_locked(store, key, &bytes);
            }
            PendingOp::Remove => {
                self.remove_locked(store, key);
            }
        }
    }

    fn write_locked(&self, store: &mut S, key: &str, bytes: &[u8]) -> bool {
        match write_slot(store, key, bytes) {
            Ok(true) => {
                StatsCounters::incr(&self.stats.disk_writes);
                if let Err(e) = store.flush() {
                    warn!(key = %key, error = %e, "Disk cache flush after write failed");
                }
                debug!(key = %key, size = bytes.len(), "Disk cache write committed");
                true
            }
            Ok(false) => {
                warn!(key = %key, "Disk cache entry is being edited, skipping write");
                false
            }
            Err(e) => {
                error!(key = %key, error = %e, "Disk cache write failed");
                StatsCounters::incr(&self.stats.disk_errors);
                false
            }
        }
    }

    fn remove_locked(&self, store: &mut S, key: &str) -> bool {
        match store.remove(key) {
            Ok(existed) => existed,
            Err(e) => {
                debug!(key = %key, error = %e, "Disk cache remove failed");
                StatsCounters::incr(&self.stats.disk_errors);
                false
            }
        }
    }

    fn pending_intent(&self, key: &str) -> Option<PendingOp> {
        self.pending.lock().get(key).cloned()
    }

    fn lock_ready(&self) -> MutexGuard<'_, DiskState<S>> {
        let mut state = self.state.lock();
        if state.phase == DiskPhase::Uninitialized {
            state.phase = DiskPhase::Initializing;
            self.init_locked(&mut state);
        }
        while state.phase == DiskPhase::Initializing {
            self.ready.wait(&mut state);
        }
        state
    }

    fn init_locked(&self, state: &mut DiskState<S>) {
        match self.open_store() {
            Ok(Some(store)) => {
                info!(
                    directory = %self.directory.display(),
                    capacity = self.capacity,
                    size = store.size(),
                    "Disk cache initialized"
                );
                state.store = Some(store);
                state.phase = DiskPhase::Ready;
            }
            Ok(None) => {
                warn!(
                    directory = %self.directory.display(),
                    capacity = self.capacity,
                    "Not enough usable space for disk cache, running memory-only"
                );
                state.store = None;
                state.phase = DiskPhase::Unavailable;
            }
            Err(e) => {
                error!(
                    directory = %self.directory.display(),
                    error = %e,
                    "Failed to open disk cache, running memory-only"
                );
                state.store = None;
                state.phase = DiskPhase::Unavailable;
            }
        }
        self.closed
            .store(state.phase != DiskPhase::Ready, Ordering::SeqCst);
        self.ready.notify_all();
    }

    /// Open the store if the volume has room for it.
    fn open_store(&self) -> io::Result<Option<S>> {
        let store_directory = self.store_directory();
        std::fs::create_dir_all(&store_directory)?;
        let usable = usable_space(&store_directory)?;
        if usable <= self.capacity {
            debug!(usable, capacity = self.capacity, "Usable space below capacity");
            return Ok(None);
        }
        S::open(&store_directory, APP_VERSION, VALUE_COUNT, self.capacity).map(Some)
    }

    /// Open the store solely to delete its contents.
    fn open_for_delete(&self) -> Option<S> {
        let store_directory = self.store_directory();
        if !store_directory.exists() {
            return None;
        }
        match S::open(&store_directory, APP_VERSION, VALUE_COUNT, self.capacity) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "Could not open disk cache for clearing");
                None
            }
        }
    }
}

/// Usable free space on the volume holding `path`.
pub fn usable_space(path: &Path) -> io::Result<u64> {
    fs2::available_space(path)
}

fn read_slot<S: DiskStore>(store: &mut S, key: &str) -> io::Result<Option<Vec<u8>>> {
    let Some(mut snapshot) = store.get(key)? else {
        return Ok(None);
    };
    let mut bytes = Vec::new();
    snapshot.reader(VALUE_SLOT)?.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Returns `Ok(false)` if the key is locked by another edit.
fn write_slot<S: DiskStore>(store: &mut S, key: &str, bytes: &[u8]) -> io::Result<bool> {
    let Some(mut editor) = store.edit(key)? else {
        return Ok(false);
    };
    let written = editor.writer(VALUE_SLOT).and_then(|writer| {
        writer.write_all(bytes)?;
        writer.flush()
    });
    match written {
        Ok(()) => store.commit(editor).map(|_| true),
        Err(e) => {
            store.abort(editor);
            Err(e)
        }
    }
}
