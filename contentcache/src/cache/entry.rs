//! Cache entry and expiration model.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch for the current wall-clock time.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A cached value together with its ownership and expiry metadata.
///
/// This is also the exact shape written to the disk tier, so a promoted
/// entry carries the same expiration instant it was stored with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Context (namespace) that owns the entry.
    pub context: String,

    /// Logical id within the context.
    pub id: String,

    /// The cached payload.
    pub payload: V,

    /// Creation time in milliseconds since UNIX_EPOCH.
    pub created_at_ms: u64,

    /// Expiration instant in milliseconds since UNIX_EPOCH.
    /// `None` means the entry never expires.
    pub expires_at_ms: Option<u64>,
}

impl<V> CacheEntry<V> {
    /// Create an entry that never expires.
    pub fn new(context: impl Into<String>, id: impl Into<String>, payload: V) -> Self {
        Self {
            context: context.into(),
            id: id.into(),
            payload,
            created_at_ms: now_millis(),
            expires_at_ms: None,
        }
    }

    /// Create an entry that expires `ttl` after now.
    pub fn with_ttl(
        context: impl Into<String>,
        id: impl Into<String>,
        payload: V,
        ttl: Duration,
    ) -> Self {
        let mut entry = Self::new(context, id, payload);
        let ttl_ms = ttl.as_millis().min(u64::MAX as u128) as u64;
        entry.expires_at_ms = Some(entry.created_at_ms.saturating_add(ttl_ms));
        entry
    }

    /// Whether the entry is expired at the given instant.
    ///
    /// An entry is live strictly before its expiration instant.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at_ms {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// Whether the entry is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Consume the entry, returning its payload.
    pub fn into_payload(self) -> V {
        self.payload
    }
}
