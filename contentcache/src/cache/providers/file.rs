//! File-per-slot LRU blob store.
//!
//! Each entry is stored as `<key>.<slot>` files in a single directory, next
//! to a `store.meta` header that records the format and the caller's schema
//! (app version and slot count). There is no journal: the index is rebuilt
//! from the directory listing on open, seeded in LRU order by file mtime.
//!
//! The store only ever touches files named like its own: the header, slot
//! files and their temp files. Anything else in the directory is left alone,
//! and a directory without a header is adopted as-is.
//!
//! # Atomicity
//!
//! Editors write to `<key>.<slot>.tmp` and `commit` renames each temp file
//! over its final name. Readers holding a snapshot keep their open file
//! handles, so a concurrent replace or remove never tears a read. Temp files
//! left behind by a crash are deleted on the next open.
//!
//! # Eviction
//!
//! Access order is a monotonically increasing sequence kept in a `BTreeMap`,
//! so the least recently used entry is always the first key. After every
//! commit the store evicts from the front until it fits `max_size`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::cache::traits::{closed_error, DiskStore, StoreEditor, StoreSnapshot};

/// Name of the header file.
pub const META_FILE: &str = "store.meta";

/// First line of the header file.
const MAGIC: &str = "contentcache.store";

/// On-disk layout version of this store.
const FORMAT_VERSION: u32 = 1;

/// Suffix for uncommitted slot files.
const TEMP_SUFFIX: &str = ".tmp";

/// Longest accepted key.
const MAX_KEY_LEN: usize = 120;

/// What the header on disk says about the directory.
#[derive(Debug, PartialEq, Eq)]
enum MetaState {
    /// No header; the directory has never held this store.
    Missing,
    /// Header written by a store with the same format and schema.
    Matches,
    /// Header written by a different format or schema.
    Stale,
}

struct IndexEntry {
    sizes: Vec<u64>,
    last_access: u64,
}

impl IndexEntry {
    fn total(&self) -> u64 {
        self.sizes.iter().sum()
    }
}

/// Capacity-evicting LRU store backed by plain files.
pub struct LruFileStore {
    directory: PathBuf,
    app_version: u32,
    value_count: usize,
    max_size: u64,
    size: u64,
    entries: HashMap<String, IndexEntry>,
    /// Access sequence -> key, oldest first.
    order: BTreeMap<u64, String>,
    editing: HashSet<String>,
    next_seq: u64,
    closed: bool,
}

/// Open slot files of one entry.
pub struct FileSnapshot {
    readers: Vec<BufReader<File>>,
    lengths: Vec<u64>,
}

impl FileSnapshot {
    /// Byte length of a slot at the time the snapshot was taken.
    pub fn len(&self, slot: usize) -> Option<u64> {
        self.lengths.get(slot).copied()
    }
}

impl StoreSnapshot for FileSnapshot {
    type Reader = BufReader<File>;

    fn reader(&mut self, slot: usize) -> io::Result<&mut Self::Reader> {
        self.readers.get_mut(slot).ok_or_else(|| slot_error(slot))
    }
}

/// Pending edit writing to temp files.
pub struct FileEditor {
    key: String,
    directory: PathBuf,
    writers: Vec<Option<BufWriter<File>>>,
}

impl FileEditor {
    fn temp_path(&self, slot: usize) -> PathBuf {
        temp_path(&self.directory, &self.key, slot)
    }

    fn discard(&mut self) {
        for slot in 0..self.writers.len() {
            if self.writers[slot].take().is_some() {
                let _ = fs::remove_file(self.temp_path(slot));
            }
        }
    }
}

impl StoreEditor for FileEditor {
    type Writer = BufWriter<File>;

    fn writer(&mut self, slot: usize) -> io::Result<&mut Self::Writer> {
        if slot >= self.writers.len() {
            return Err(slot_error(slot));
        }
        if self.writers[slot].is_none() {
            let file = File::create(self.temp_path(slot))?;
            self.writers[slot] = Some(BufWriter::new(file));
        }
        self.writers[slot].as_mut().ok_or_else(|| slot_error(slot))
    }
}

impl Drop for FileEditor {
    fn drop(&mut self) {
        self.discard();
    }
}

impl LruFileStore {
    /// Directory the store lives in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of complete entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn slot_path(&self, key: &str, slot: usize) -> PathBuf {
        slot_path(&self.directory, key, slot)
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    fn touch(&mut self, key: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.last_access);
            entry.last_access = seq;
            self.order.insert(seq, key.to_string());
        }
    }

    fn drop_entry(&mut self, key: &str) -> io::Result<bool> {
        let Some(entry) = self.entries.remove(key) else {
            return Ok(false);
        };
        self.order.remove(&entry.last_access);
        self.size = self.size.saturating_sub(entry.total());

        for slot in 0..self.value_count {
            match fs::remove_file(self.slot_path(key, slot)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn trim_to_size(&mut self) -> io::Result<()> {
        while self.size > self.max_size {
            let victim = self
                .order
                .values()
                .find(|key| !self.editing.contains(*key))
                .cloned();
            let Some(key) = victim else { break };
            debug!(key = %key, size = self.size, max = self.max_size, "Evicting LRU entry");
            self.drop_entry(&key)?;
        }
        Ok(())
    }

    fn write_meta(&self) -> io::Result<()> {
        let mut file = File::create(self.directory.join(META_FILE))?;
        writeln!(file, "{}", MAGIC)?;
        writeln!(file, "{}", FORMAT_VERSION)?;
        writeln!(file, "{}", self.app_version)?;
        writeln!(file, "{}", self.value_count)?;
        file.sync_all()
    }

    fn meta_state(&self) -> io::Result<MetaState> {
        let contents = match fs::read_to_string(self.directory.join(META_FILE)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MetaState::Missing),
            Err(e) => return Err(e),
        };
        let expected = [
            MAGIC.to_string(),
            FORMAT_VERSION.to_string(),
            self.app_version.to_string(),
            self.value_count.to_string(),
        ];
        if contents.lines().map(str::trim).eq(expected.iter().map(String::as_str)) {
            Ok(MetaState::Matches)
        } else {
            Ok(MetaState::Stale)
        }
    }

    /// Delete the header, slot files and temp files. Other files are kept.
    fn remove_store_files(&self) -> io::Result<()> {
        let listing = match fs::read_dir(&self.directory) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for dir_entry in listing {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if is_store_file(&name) {
                match fs::remove_file(dir_entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Rebuild the index from the directory listing.
    fn rebuild_index(&mut self) -> io::Result<()> {
        let mut found: HashMap<String, (Vec<Option<u64>>, SystemTime)> = HashMap::new();

        for dir_entry in fs::read_dir(&self.directory)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name == META_FILE {
                continue;
            }
            if let Some(stem) = name.strip_suffix(TEMP_SUFFIX) {
                if parse_slot_name(stem).is_some() {
                    let _ = fs::remove_file(dir_entry.path());
                }
                continue;
            }

            let Some((key, slot)) =
                parse_slot_name(&name).filter(|(_, slot)| *slot < self.value_count)
            else {
                debug!(file = %name, "Skipping unrecognized file in store directory");
                continue;
            };

            let metadata = dir_entry.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let record = found
                .entry(key.to_string())
                .or_insert_with(|| (vec![None; self.value_count], SystemTime::UNIX_EPOCH));
            record.0[slot] = Some(metadata.len());
            record.1 = record.1.max(modified);
        }

        let mut complete: Vec<(String, Vec<u64>, SystemTime)> = Vec::with_capacity(found.len());
        for (key, (sizes, modified)) in found {
            if sizes.iter().all(Option::is_some) {
                complete.push((key, sizes.into_iter().flatten().collect(), modified));
            } else {
                warn!(key = %key, "Removing incomplete entry");
                for slot in 0..self.value_count {
                    let _ = fs::remove_file(self.slot_path(&key, slot));
                }
            }
        }

        complete.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
        for (key, sizes, _) in complete {
            let seq = self.next_seq;
            self.next_seq += 1;
            let entry = IndexEntry {
                sizes,
                last_access: seq,
            };
            self.size += entry.total();
            self.order.insert(seq, key.clone());
            self.entries.insert(key, entry);
        }
        Ok(())
    }
}

impl DiskStore for LruFileStore {
    type Snapshot = FileSnapshot;
    type Editor = FileEditor;

    fn open(
        directory: &Path,
        app_version: u32,
        value_count: usize,
        max_size: u64,
    ) -> io::Result<Self> {
        if value_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "value_count must be at least 1",
            ));
        }
        fs::create_dir_all(directory)?;

        let mut store = Self {
            directory: directory.to_path_buf(),
            app_version,
            value_count,
            max_size,
            size: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            editing: HashSet::new(),
            next_seq: 0,
            closed: false,
        };

        match store.meta_state()? {
            MetaState::Matches => store.rebuild_index()?,
            MetaState::Missing => {
                info!(directory = %directory.display(), "Initializing fresh store");
                store.write_meta()?;
            }
            MetaState::Stale => {
                info!(directory = %directory.display(), "Store format changed, discarding entries");
                store.remove_store_files()?;
                store.write_meta()?;
            }
        }
        store.trim_to_size()?;

        debug!(
            directory = %directory.display(),
            entries = store.entries.len(),
            size = store.size,
            max_size,
            "Store opened"
        );
        Ok(store)
    }

    fn get(&mut self, key: &str) -> io::Result<Option<FileSnapshot>> {
        self.ensure_open()?;
        validate_key(key)?;
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let lengths = entry.sizes.clone();

        let mut readers = Vec::with_capacity(self.value_count);
        for slot in 0..self.value_count {
            match File::open(self.slot_path(key, slot)) {
                Ok(file) => readers.push(BufReader::new(file)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Deleted behind our back; forget the entry.
                    warn!(key = %key, slot, "Slot file missing, dropping entry");
                    self.drop_entry(key)?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        self.touch(key);
        Ok(Some(FileSnapshot { readers, lengths }))
    }

    fn edit(&mut self, key: &str) -> io::Result<Option<FileEditor>> {
        self.ensure_open()?;
        validate_key(key)?;
        if !self.editing.insert(key.to_string()) {
            return Ok(None);
        }
        Ok(Some(FileEditor {
            key: key.to_string(),
            directory: self.directory.clone(),
            writers: (0..self.value_count).map(|_| None).collect(),
        }))
    }

    fn commit(&mut self, mut editor: FileEditor) -> io::Result<()> {
        self.editing.remove(&editor.key);
        self.ensure_open()?;

        let key = editor.key.clone();
        let is_new = !self.entries.contains_key(&key);
        if is_new && editor.writers.iter().any(Option::is_none) {
            editor.discard();
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("new entry {} must write every slot", key),
            ));
        }

        let mut written = Vec::new();
        for slot in 0..editor.writers.len() {
            if let Some(writer) = editor.writers[slot].take() {
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.sync_data()?;
                written.push(slot);
            }
        }

        let mut sizes = self
            .entries
            .get(&key)
            .map(|e| e.sizes.clone())
            .unwrap_or_else(|| vec![0; self.value_count]);
        for slot in written {
            let target = self.slot_path(&key, slot);
            fs::rename(temp_path(&self.directory, &key, slot), &target)?;
            sizes[slot] = fs::metadata(&target)?.len();
        }

        let new_total: u64 = sizes.iter().sum();
        let old_total = self.entries.get(&key).map(IndexEntry::total).unwrap_or(0);
        self.size = self.size.saturating_sub(old_total) + new_total;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.sizes = sizes;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.order.insert(seq, key.clone());
            self.entries.insert(
                key.clone(),
                IndexEntry {
                    sizes,
                    last_access: seq,
                },
            );
        }
        self.touch(&key);
        self.trim_to_size()
    }

    fn abort(&mut self, mut editor: FileEditor) {
        self.editing.remove(&editor.key);
        editor.discard();
    }

    fn remove(&mut self, key: &str) -> io::Result<bool> {
        self.ensure_open()?;
        validate_key(key)?;
        if self.editing.contains(key) {
            return Ok(false);
        }
        self.drop_entry(key)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        // Slot data is synced on commit; only the header can lag.
        if self.meta_state()? != MetaState::Matches {
            self.write_meta()?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.editing.clear();
        debug!(directory = %self.directory.display(), "Store closed");
        Ok(())
    }

    fn delete_all(&mut self) -> io::Result<()> {
        self.close()?;
        self.entries.clear();
        self.order.clear();
        self.size = 0;
        self.remove_store_files()?;
        // Only succeeds once nothing else lives in the directory
        let _ = fs::remove_dir(&self.directory);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn slot_path(directory: &Path, key: &str, slot: usize) -> PathBuf {
    directory.join(format!("{}.{}", key, slot))
}

fn temp_path(directory: &Path, key: &str, slot: usize) -> PathBuf {
    directory.join(format!("{}.{}{}", key, slot, TEMP_SUFFIX))
}

fn slot_error(slot: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("slot {} out of range", slot),
    )
}

/// Split `<key>.<slot>` into its parts if both are well formed.
fn parse_slot_name(name: &str) -> Option<(&str, usize)> {
    let (key, slot) = name.rsplit_once('.')?;
    let slot = slot.parse::<usize>().ok()?;
    validate_key(key).ok()?;
    Some((key, slot))
}

fn is_store_file(name: &str) -> bool {
    name == META_FILE || parse_slot_name(name.strip_suffix(TEMP_SUFFIX).unwrap_or(name)).is_some()
}

fn validate_key(key: &str) -> io::Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid store key: {:?}", key),
        ))
    }
}
