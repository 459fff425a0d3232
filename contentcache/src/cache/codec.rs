//! Binary encoding of entries for the disk tier.
//!
//! Entries are written with bincode into the store's single value slot. The
//! whole [`CacheEntry`] is stored, so context, id and expiration survive a
//! restart alongside the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::entry::CacheEntry;
use crate::error::CacheResult;

/// Serialize an entry to bytes.
pub fn encode<V: Serialize>(entry: &CacheEntry<V>) -> CacheResult<Vec<u8>> {
    Ok(bincode::serialize(entry)?)
}

/// Deserialize an entry from bytes.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> CacheResult<CacheEntry<V>> {
    Ok(bincode::deserialize(bytes)?)
}
