//! Cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the coordinator's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the memory tier.
    pub memory_hits: u64,
    /// Lookups served from the disk tier (and promoted).
    pub disk_hits: u64,
    /// Lookups that found nothing live in either tier.
    pub misses: u64,
    /// Entries purged because their TTL had passed.
    pub expirations: u64,
    /// Disk writes applied.
    pub disk_writes: u64,
    /// Disk operations that failed and were swallowed.
    pub disk_errors: u64,
    /// Entries currently held in memory.
    pub memory_entries: usize,
    /// Bytes currently held by the disk tier.
    pub disk_size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups served by either tier.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory hits {}, disk hits {}, misses {}, expired {}, {} entries in memory, {} bytes on disk",
            self.memory_hits,
            self.disk_hits,
            self.misses,
            self.expirations,
            self.memory_entries,
            self.disk_size_bytes
        )
    }
}

/// Lock-free counters updated from any thread.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub memory_hits: AtomicU64,
    pub disk_hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations: AtomicU64,
    pub disk_writes: AtomicU64,
    pub disk_errors: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, memory_entries: usize, disk_size_bytes: u64) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            disk_errors: self.disk_errors.load(Ordering::Relaxed),
            memory_entries,
            disk_size_bytes,
        }
    }
}
