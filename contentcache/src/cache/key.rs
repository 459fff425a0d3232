//! Disk key derivation.
//!
//! The disk tier is never addressed by the caller's id directly. Ids may
//! contain path separators or be arbitrarily long, so each id is mapped to
//! a fixed-shape, filesystem-safe key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use sha2::{Digest, Sha256};

/// Number of digest bytes kept for a content-address key.
pub const DIGEST_KEY_BYTES: usize = 16;

/// Strategy for turning a logical id into a disk key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyCodec {
    /// Truncated SHA-256 digest rendered as 32 lowercase hex characters.
    #[default]
    ContentAddress,

    /// Decimal rendering of a process-local 64-bit hash.
    ///
    /// Keys are only stable for a given std hasher implementation, so a
    /// toolchain upgrade may orphan previously written entries.
    LocalHash,
}

impl KeyCodec {
    /// Derive the disk key for `id`.
    pub fn disk_key(&self, id: &str) -> String {
        match self {
            KeyCodec::ContentAddress => content_address(id),
            KeyCodec::LocalHash => local_hash(id),
        }
    }

    /// Parse a strategy name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "content" | "sha256" | "digest" => Some(KeyCodec::ContentAddress),
            "local" | "hash" => Some(KeyCodec::LocalHash),
            _ => None,
        }
    }
}

fn content_address(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut key = String::with_capacity(DIGEST_KEY_BYTES * 2);
    for byte in &digest[..DIGEST_KEY_BYTES] {
        key.push_str(&format!("{:02x}", byte));
    }
    key
}

fn local_hash(id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_content_address_shape() {
        let key = KeyCodec::ContentAddress.disk_key("user42");
        assert_eq!(key.len(), 32);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_content_address_known_value() {
        // SHA-256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(
            KeyCodec::ContentAddress.disk_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223"
        );
    }

    #[test]
    fn test_local_hash_is_numeric() {
        let key = KeyCodec::LocalHash.disk_key("user42");
        assert!(key.parse::<u64>().is_ok());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(KeyCodec::from_name("content"), Some(KeyCodec::ContentAddress));
        assert_eq!(KeyCodec::from_name(" Local "), Some(KeyCodec::LocalHash));
        assert_eq!(KeyCodec::from_name("md4"), None);
    }

    proptest! {
        #[test]
        fn prop_disk_key_is_deterministic(id in ".*") {
            prop_assert_eq!(
                KeyCodec::ContentAddress.disk_key(&id),
                KeyCodec::ContentAddress.disk_key(&id)
            );
            prop_assert_eq!(
                KeyCodec::LocalHash.disk_key(&id),
                KeyCodec::LocalHash.disk_key(&id)
            );
        }

        #[test]
        fn prop_distinct_ids_get_distinct_keys(a in "[a-z0-9/]{1,24}", b in "[a-z0-9/]{1,24}") {
            prop_assume!(a != b);
            prop_assert_ne!(
                KeyCodec::ContentAddress.disk_key(&a),
                KeyCodec::ContentAddress.disk_key(&b)
            );
        }

        #[test]
        fn prop_disk_key_is_path_safe(id in ".*") {
            let key = KeyCodec::ContentAddress.disk_key(&id);
            prop_assert!(!key.contains('/'));
            prop_assert!(!key.contains('.'));
        }
    }
}
