//! Integration tests for the cache coordinator.
//!
//! These tests drive the public API against a real on-disk store:
//! - Tier consistency, promotion and reconstruction after restart
//! - TTL expiry across both tiers
//! - Context isolation and bulk context removal
//! - Asynchronous retrieval ordering
//! - Degraded memory-only operation
//! - Lifecycle (flush, close, reinit, clear)
//!
//! Run with: `cargo test --test coordinator_integration`

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use contentcache::cache::disk::{APP_VERSION, STORE_DIR, VALUE_COUNT};
use contentcache::cache::{DiskStore, LruFileStore, StoreEditor, TaskRunner};
use contentcache::{CacheConfig, CacheCoordinator, ContextExitPolicy, DiskPhase, FnLoader, KeyCodec};

// ============================================================================
// Helper Functions
// ============================================================================

const ONE_MIB: u64 = 1024 * 1024;

/// Receive timeout for background results.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

fn config(dir: &Path) -> CacheConfig {
    CacheConfig::new(dir.join("content_cache"))
        .with_size(ONE_MIB)
        .with_worker_threads(2)
}

fn open<V>(dir: &Path) -> CacheCoordinator<V>
where
    V: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
{
    CacheCoordinator::open(config(dir)).unwrap()
}

/// Write raw bytes for `id` straight into the store behind a cache directory.
fn write_raw(dir: &Path, id: &str, bytes: &[u8]) {
    let mut store =
        LruFileStore::open(&dir.join(STORE_DIR), APP_VERSION, VALUE_COUNT, ONE_MIB).unwrap();
    let key = KeyCodec::default().disk_key(id);
    let mut editor = store.edit(&key).unwrap().unwrap();
    editor.writer(0).unwrap().write_all(bytes).unwrap();
    store.commit(editor).unwrap();
    store.close().unwrap();
}

// ============================================================================
// Tier Consistency
// ============================================================================

/// A stored value is returned immediately and again after the memory tier
/// has been dropped, reconstructed from disk.
#[test]
fn test_round_trip_through_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<HashMap<String, String>> = open(temp_dir.path());

    let mut profile = HashMap::new();
    profile.insert("name".to_string(), "Ann".to_string());

    cache.put("session", "user42", profile.clone());
    assert_eq!(cache.get("session", "user42"), Some(profile.clone()));

    cache.flush();
    cache.memory().clear();

    assert_eq!(cache.get("session", "user42"), Some(profile));
    assert_eq!(cache.stats().disk_hits, 1);
    assert!(cache.size() > 0);
}

/// Entries written before a restart are found by a new coordinator.
#[test]
fn test_entries_survive_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ann = Profile {
        name: "Ann".to_string(),
        visits: 3,
    };

    {
        let cache: CacheCoordinator<Profile> = open(temp_dir.path());
        cache.put("session", "user42", ann.clone());
        // Dropping closes the disk tier after draining pending writes
    }

    let cache: CacheCoordinator<Profile> = open(temp_dir.path());
    assert!(cache.memory().is_empty());
    assert!(cache.has("session", "user42"));
    assert_eq!(cache.get("session", "user42"), Some(ann));
}

/// The latest put is the one reconstructed from disk.
#[test]
fn test_overwrite_reaches_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put("s", "k", "first".to_string());
    cache.flush();
    cache.put("s", "k", "second".to_string());
    cache.flush();
    cache.memory().clear();

    assert_eq!(cache.get("s", "k").as_deref(), Some("second"));
}

/// A remove issued after a put is never undone by the put's disk write.
#[test]
fn test_remove_is_not_resurrected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    for i in 0..50 {
        let id = format!("id{}", i);
        cache.put("s", &id, "value".to_string());
        cache.remove("s", &id);
    }

    cache.flush();
    cache.memory().clear();

    for i in 0..50 {
        let id = format!("id{}", i);
        assert!(cache.get("s", &id).is_none(), "{} was resurrected", id);
    }
    assert_eq!(cache.size(), 0);
}

/// Concurrent writers on distinct ids all read back their own values.
#[test]
fn test_concurrent_put_get() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: Arc<CacheCoordinator<u64>> = Arc::new(open(temp_dir.path()));

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let context = format!("ctx{}", t);
                for i in 0..50u64 {
                    let id = format!("{}-{}", t, i);
                    cache.put(&context, &id, t * 1000 + i);
                    assert_eq!(cache.get(&context, &id), Some(t * 1000 + i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    cache.flush();
    cache.memory().clear();
    assert_eq!(cache.get("ctx3", "3-7"), Some(3007));
    assert_eq!(cache.get("ctx7", "7-49"), Some(7049));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A put is immediately visible to a get on the same thread.
    #[test]
    fn prop_put_then_get(
        context in "[a-z]{1,8}",
        id in "[ -~]{1,40}",
        value in any::<Vec<u8>>(),
    ) {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache: CacheCoordinator<Vec<u8>> = open(temp_dir.path());

        cache.put(&context, &id, value.clone());
        prop_assert_eq!(cache.get(&context, &id), Some(value));
    }
}

// ============================================================================
// TTL
// ============================================================================

/// An entry is served before its TTL and gone from both tiers after it.
#[test]
fn test_ttl_expiry() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put_with_ttl("s", "k", "v".to_string(), Duration::from_millis(100));
    assert_eq!(cache.get("s", "k").as_deref(), Some("v"));
    cache.flush();

    thread::sleep(Duration::from_millis(150));

    assert!(cache.get("s", "k").is_none());
    assert!(!cache.has("s", "k"));
    assert!(cache.stats().expirations >= 1);

    cache.close();
    let mut store = LruFileStore::open(
        &temp_dir.path().join("content_cache").join(STORE_DIR),
        APP_VERSION,
        VALUE_COUNT,
        ONE_MIB,
    )
    .unwrap();
    assert!(store.get(&KeyCodec::default().disk_key("k")).unwrap().is_none());
}

/// Expiry is also enforced for entries found only on disk.
#[test]
fn test_ttl_expiry_on_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put_with_ttl("s", "k", "v".to_string(), Duration::from_millis(50));
    cache.flush();
    cache.memory().clear();

    thread::sleep(Duration::from_millis(100));

    assert!(cache.get("s", "k").is_none());
    assert!(!cache.has("s", "k"));
    assert_eq!(cache.size(), 0);
}

/// A value stored again after its predecessor expired in memory survives
/// the background cleanup of the expired entry.
#[test]
fn test_expired_entry_replaced_before_cleanup_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    // One blocking thread runs background tasks in submission order
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(1)
        .build()
        .unwrap();
    let runner = TaskRunner::from_handle(runtime.handle().clone());
    let cache: CacheCoordinator<String> =
        CacheCoordinator::open_with_runner(config(temp_dir.path()), runner);
    assert_eq!(cache.await_ready(), DiskPhase::Ready);

    let (release, blocked) = mpsc::channel::<()>();
    runtime.spawn_blocking(move || blocked.recv().ok());

    cache.put_with_ttl("s", "k", "old".to_string(), Duration::ZERO);
    assert!(cache.get("s", "k").is_none());
    cache.put("s", "k", "fresh".to_string());
    cache.flush();

    release.send(()).unwrap();
    let (done, finished) = mpsc::channel::<()>();
    runtime.spawn_blocking(move || done.send(()).ok());
    finished.recv_timeout(RECV_TIMEOUT).unwrap();

    cache.memory().clear();
    assert_eq!(cache.get("s", "k").as_deref(), Some("fresh"));
    cache.close();
}

/// Entries without a TTL are not affected by time passing.
#[test]
fn test_entry_without_ttl_persists() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put("s", "forever", "v".to_string());
    cache.put_with_ttl("s", "later", "v".to_string(), Duration::from_secs(3600));
    thread::sleep(Duration::from_millis(20));

    assert!(cache.has("s", "forever"));
    assert!(cache.has("s", "later"));
}

// ============================================================================
// Contexts
// ============================================================================

/// The same id in two contexts holds two values.
#[test]
fn test_context_isolation() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put("A", "k", "v1".to_string());
    cache.put("B", "k", "v2".to_string());

    assert_eq!(cache.get("A", "k").as_deref(), Some("v1"));
    assert_eq!(cache.get("B", "k").as_deref(), Some("v2"));

    cache.remove("A", "k");
    assert!(cache.get("A", "k").is_none());
    assert_eq!(cache.get("B", "k").as_deref(), Some("v2"));
}

/// Removing a context drops all of its ids from both tiers.
#[test]
fn test_remove_context_discards() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<u32> = open(temp_dir.path());

    for i in 0..10 {
        cache.put("screen", &format!("item{}", i), i);
    }
    cache.put("other", "keep", 99);
    cache.flush();

    let removed = cache.remove_context("screen");
    assert_eq!(removed.len(), 10);
    assert_eq!(cache.memory().context_len("screen"), 0);

    cache.flush();
    for i in 0..10 {
        let id = format!("item{}", i);
        assert!(cache.get("screen", &id).is_none());
        assert!(!cache.has("screen", &id));
    }
    assert_eq!(cache.get("other", "keep"), Some(99));

    // Removing an empty or unknown context is a no-op
    assert!(cache.remove_context("screen").is_empty());
    assert!(cache.remove_context("never-seen").is_empty());
}

/// Under the persist policy, a removed context can be restored from disk.
#[test]
fn test_remove_context_persists() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path()).with_context_exit(ContextExitPolicy::Persist);
    let cache: CacheCoordinator<String> = CacheCoordinator::open(config).unwrap();

    cache.put("screen", "a", "alpha".to_string());
    cache.put("screen", "b", "beta".to_string());

    let mut removed = cache.remove_context("screen");
    removed.sort();
    assert_eq!(removed, vec!["a", "b"]);
    assert_eq!(cache.memory().context_len("screen"), 0);

    cache.flush();
    assert_eq!(cache.get("screen", "a").as_deref(), Some("alpha"));
    assert_eq!(cache.get("screen", "b").as_deref(), Some("beta"));
    assert_eq!(cache.memory().context_len("screen"), 2);
}

// ============================================================================
// Asynchronous Retrieval
// ============================================================================

/// A cold lookup signals loading before its single result.
#[test]
fn test_get_async_ordering() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());
    cache.put("s", "cold", "from disk".to_string());
    cache.flush();
    cache.memory().clear();

    let (tx, rx) = mpsc::channel();
    let loading_tx = tx.clone();
    let results = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&results);

    cache.get_async(
        "s",
        "cold",
        FnLoader::new(move |value: Option<String>| {
            counted.fetch_add(1, Ordering::SeqCst);
            tx.send(format!("result:{}", value.unwrap_or_default())).unwrap();
        })
        .with_loading(move || loading_tx.send("loading".to_string()).unwrap()),
    );

    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), "loading");
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), "result:from disk");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(results.load(Ordering::SeqCst), 1);

    // Promoted by the background lookup
    assert!(cache.memory().contains("s", "cold"));
}

/// A cold lookup for a missing id still delivers exactly one result.
#[test]
fn test_get_async_miss() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    let (tx, rx) = mpsc::channel();
    cache.get_async("s", "missing", FnLoader::new(move |value: Option<String>| tx.send(value).unwrap()));

    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), None);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

/// The future-shaped load resolves inside an async runtime.
#[tokio::test(flavor = "multi_thread")]
async fn test_load_awaits_disk_value() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());
    cache.put("s", "k", "value".to_string());
    cache.memory().clear();

    let handle = cache.load("s", "k");
    assert!(handle.is_loading());
    assert_eq!(handle.await.as_deref(), Some("value"));

    let hot = cache.load("s", "k");
    assert!(!hot.is_loading());
    assert_eq!(hot.await.as_deref(), Some("value"));
}

// ============================================================================
// Degraded Operation
// ============================================================================

/// A capacity larger than the volume leaves the cache memory-only.
#[test]
fn test_disk_unavailable_degrades_to_memory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(temp_dir.path().join("content_cache")).with_size(u64::MAX);
    let cache: CacheCoordinator<String> = CacheCoordinator::open(config).unwrap();

    cache.put("s", "k", "memory only".to_string());
    assert_eq!(cache.get("s", "k").as_deref(), Some("memory only"));
    assert_eq!(cache.await_ready(), DiskPhase::Unavailable);
    assert_eq!(cache.size(), 0);

    cache.memory().clear();
    assert!(cache.get("s", "k").is_none());
    assert!(!cache.has("s", "k"));

    cache.flush();
    cache.close();
}

/// Undecodable bytes on disk are a miss, not an error.
#[test]
fn test_undecodable_disk_entry_is_a_miss() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache_dir = temp_dir.path().join("content_cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    write_raw(&cache_dir, "corrupt", &[0x01, 0x02]);

    let cache: CacheCoordinator<String> = open(temp_dir.path());
    assert!(cache.get("s", "corrupt").is_none());
    assert!(cache.stats().disk_errors >= 1);

    // The slot is usable again
    cache.put("s", "corrupt", "fixed".to_string());
    cache.flush();
    cache.memory().clear();
    assert_eq!(cache.get("s", "corrupt").as_deref(), Some("fixed"));
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Close drains pending writes and disables the disk tier until reinit.
#[test]
fn test_close_and_reinit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    cache.put("s", "before", "durable".to_string());
    cache.close();
    cache.close();
    assert_eq!(cache.phase(), DiskPhase::Closed);
    assert_eq!(cache.size(), 0);

    // Memory keeps working while the disk is closed
    cache.put("s", "during", "memory only".to_string());
    assert_eq!(cache.get("s", "during").as_deref(), Some("memory only"));

    cache.memory().clear();
    assert!(cache.get("s", "before").is_none());

    cache.reinit();
    assert_eq!(cache.phase(), DiskPhase::Ready);
    assert_eq!(cache.get("s", "before").as_deref(), Some("durable"));
    assert!(cache.get("s", "during").is_none());
}

/// Clear empties both tiers and leaves a working cache behind.
#[test]
fn test_clear() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache: CacheCoordinator<String> = open(temp_dir.path());

    for i in 0..5 {
        cache.put("s", &format!("k{}", i), format!("v{}", i));
    }
    cache.flush();
    assert!(cache.size() > 0);

    cache.clear();

    assert_eq!(cache.phase(), DiskPhase::Ready);
    assert_eq!(cache.size(), 0);
    assert!(cache.memory().is_empty());
    for i in 0..5 {
        assert!(cache.get("s", &format!("k{}", i)).is_none());
    }

    cache.put("s", "fresh", "after clear".to_string());
    assert_eq!(cache.get("s", "fresh").as_deref(), Some("after clear"));
    cache.flush();
    cache.memory().clear();
    assert_eq!(cache.get("s", "fresh").as_deref(), Some("after clear"));
}

/// Opening and clearing a cache in a directory that already holds other
/// files leaves those files in place.
#[test]
fn test_open_in_non_empty_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache_dir = temp_dir.path().join("content_cache");
    std::fs::create_dir_all(cache_dir.join("photos")).unwrap();
    std::fs::write(cache_dir.join("important.txt"), b"keep me").unwrap();

    let cache: CacheCoordinator<String> = open(temp_dir.path());
    assert_eq!(cache.await_ready(), DiskPhase::Ready);
    cache.put("s", "k", "v".to_string());
    cache.flush();
    assert!(cache.size() > 0);

    cache.clear();
    cache.close();

    assert_eq!(std::fs::read(cache_dir.join("important.txt")).unwrap(), b"keep me");
    assert!(cache_dir.join("photos").is_dir());
}

/// Eviction in the store bounds the disk tier by its capacity.
#[test]
fn test_disk_capacity_is_bounded() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(temp_dir.path().join("content_cache")).with_size(64 * 1024);
    let cache: CacheCoordinator<Vec<u8>> = CacheCoordinator::open(config).unwrap();

    for i in 0..32 {
        cache.put("blobs", &format!("blob{}", i), vec![i as u8; 8 * 1024]);
    }
    cache.flush();

    assert!(cache.size() <= 64 * 1024);
    assert_eq!(cache.capacity(), 64 * 1024);

    // Some entries were evicted, the survivors are intact
    cache.memory().clear();
    let mut survivors = 0;
    for i in 0..32 {
        if let Some(blob) = cache.get("blobs", &format!("blob{}", i)) {
            assert_eq!(blob, vec![i as u8; 8 * 1024]);
            survivors += 1;
        }
    }
    assert!(survivors >= 1 && survivors < 32, "{} survivors", survivors);
}
