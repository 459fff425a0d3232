//! Contract for the persistent store behind the disk tier.
//!
//! The disk tier talks to a capacity-bounded blob store through the
//! [`DiskStore`] trait. The store owns eviction; the tier above it only
//! reads, edits and removes keys.
//!
//! # Protocol
//!
//! - Reads go through a [`StoreSnapshot`], which stays readable even if the
//!   key is removed or replaced after `get` returns.
//! - Writes go through a [`StoreEditor`]. Nothing becomes visible until the
//!   editor is passed back to [`DiskStore::commit`]; an editor passed to
//!   [`DiskStore::abort`] (or dropped) leaves the previous value in place.
//! - At most one editor per key may be outstanding. A second `edit` for the
//!   same key returns `Ok(None)`.
//!
//! # Example
//!
//! ```ignore
//! use std::io::{Read, Write};
//! use contentcache::cache::{DiskStore, LruFileStore, StoreEditor, StoreSnapshot};
//!
//! let mut store = LruFileStore::open(dir, 1, 1, 20 * 1024 * 1024)?;
//!
//! if let Some(mut editor) = store.edit("5d41402abc4b2a76")? {
//!     editor.writer(0)?.write_all(b"payload")?;
//!     store.commit(editor)?;
//! }
//!
//! if let Some(mut snapshot) = store.get("5d41402abc4b2a76")? {
//!     let mut bytes = Vec::new();
//!     snapshot.reader(0)?.read_to_end(&mut bytes)?;
//! }
//! ```

use std::io::{self, Read, Write};
use std::path::Path;

/// A point-in-time view of one stored entry.
pub trait StoreSnapshot: Send {
    /// Byte source for a slot.
    type Reader: Read;

    /// Get the reader for `slot`.
    fn reader(&mut self, slot: usize) -> io::Result<&mut Self::Reader>;
}

/// An uncommitted edit of one entry.
pub trait StoreEditor: Send {
    /// Byte sink for a slot.
    type Writer: Write;

    /// Get the writer for `slot`, creating it on first use.
    fn writer(&mut self, slot: usize) -> io::Result<&mut Self::Writer>;
}

/// A bounded, persistent key/value blob store.
///
/// Keys are short, filesystem-safe strings (`[a-z0-9_-]`). Each entry holds
/// `value_count` independent value slots. When the stored bytes exceed
/// `max_size`, the store evicts entries on its own.
///
/// Implementations are not required to be internally synchronized: every
/// method takes `&mut self` and callers serialize access.
pub trait DiskStore: Send + Sized + 'static {
    /// Snapshot type returned by [`get`](DiskStore::get).
    type Snapshot: StoreSnapshot;

    /// Editor type returned by [`edit`](DiskStore::edit).
    type Editor: StoreEditor;

    /// Open (or create) a store in `directory`.
    ///
    /// A store written with a different `app_version` or `value_count` is
    /// discarded. Files the store did not create are never deleted.
    fn open(directory: &Path, app_version: u32, value_count: usize, max_size: u64)
        -> io::Result<Self>;

    /// Get a snapshot of `key`, or `None` if absent.
    fn get(&mut self, key: &str) -> io::Result<Option<Self::Snapshot>>;

    /// Begin an edit of `key`, or `None` if another edit is in progress.
    fn edit(&mut self, key: &str) -> io::Result<Option<Self::Editor>>;

    /// Publish an edit atomically.
    fn commit(&mut self, editor: Self::Editor) -> io::Result<()>;

    /// Discard an edit.
    fn abort(&mut self, editor: Self::Editor);

    /// Remove `key`. Returns `true` if it existed.
    fn remove(&mut self, key: &str) -> io::Result<bool>;

    /// Bytes currently stored.
    fn size(&self) -> u64;

    /// Force buffered state to disk.
    fn flush(&mut self) -> io::Result<()>;

    /// Close the store. Closing twice is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// Close the store and delete its entries and header.
    fn delete_all(&mut self) -> io::Result<()>;

    /// Whether the store has been closed.
    fn is_closed(&self) -> bool;
}

/// Error returned by operations on a closed store.
pub(crate) fn closed_error() -> io::Error {
    io::Error::other("store is closed")
}
