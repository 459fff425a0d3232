//! In-memory tier keyed by context and id.
//!
//! The index is a plain store: it knows nothing about expiration or the disk
//! tier. The coordinator judges liveness from the entry metadata, which keeps
//! this module testable without a clock.
//!
//! Contexts are held in a `DashMap`, so lookups and writes on different
//! contexts never contend, and callers need no external locking.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::cache::entry::CacheEntry;

/// Per-context mapping from id to entry.
pub struct MemoryIndex<V> {
    contexts: DashMap<String, HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> MemoryIndex<V> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    /// Get a copy of the entry stored for `(context, id)`.
    pub fn get(&self, context: &str, id: &str) -> Option<CacheEntry<V>> {
        self.contexts
            .get(context)
            .and_then(|entries| entries.get(id).cloned())
    }

    /// Whether an entry exists for `(context, id)`, live or not.
    pub fn contains(&self, context: &str, id: &str) -> bool {
        self.contexts
            .get(context)
            .map(|entries| entries.contains_key(id))
            .unwrap_or(false)
    }

    /// Insert an entry, replacing any previous entry for the pair.
    ///
    /// The context's sub-mapping is created on first insertion.
    pub fn put(&self, context: &str, id: &str, entry: CacheEntry<V>) {
        self.contexts
            .entry(context.to_string())
            .or_default()
            .insert(id.to_string(), entry);
    }

    /// Remove the entry for `(context, id)`, returning it if present.
    ///
    /// A sub-mapping emptied by this call is dropped.
    pub fn remove(&self, context: &str, id: &str) -> Option<CacheEntry<V>> {
        let removed = {
            let mut entries = self.contexts.get_mut(context)?;
            entries.remove(id)
        };
        self.contexts
            .remove_if(context, |_, entries| entries.is_empty());
        removed
    }

    /// Remove the entry for `(context, id)` only if `predicate` holds for it.
    pub fn remove_if(
        &self,
        context: &str,
        id: &str,
        predicate: impl FnOnce(&CacheEntry<V>) -> bool,
    ) -> Option<CacheEntry<V>> {
        let removed = {
            let mut entries = self.contexts.get_mut(context)?;
            if !entries.get(id).map(predicate).unwrap_or(false) {
                return None;
            }
            entries.remove(id)
        };
        self.contexts
            .remove_if(context, |_, entries| entries.is_empty());
        removed
    }

    /// Insert an entry loaded from a slower tier unless the pair already
    /// holds one.
    ///
    /// `admit` is evaluated while the context is locked, so no writer can
    /// slip in between the check and the insertion.
    ///
    /// # Returns
    ///
    /// The entry the pair holds afterwards, or `None` if the pair was empty
    /// and `admit` refused the insertion.
    pub fn promote(
        &self,
        context: &str,
        id: &str,
        entry: CacheEntry<V>,
        admit: impl FnOnce() -> bool,
    ) -> Option<CacheEntry<V>> {
        let held = {
            let mut entries = self.contexts.entry(context.to_string()).or_default();
            if let Some(existing) = entries.get(id) {
                Some(existing.clone())
            } else if admit() {
                entries.insert(id.to_string(), entry.clone());
                Some(entry)
            } else {
                None
            }
        };
        if held.is_none() {
            self.contexts
                .remove_if(context, |_, entries| entries.is_empty());
        }
        held
    }

    /// Remove a whole context, returning every id with its entry.
    pub fn remove_context(&self, context: &str) -> Vec<(String, CacheEntry<V>)> {
        self.contexts
            .remove(context)
            .map(|(_, entries)| entries.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drop every context.
    pub fn clear(&self) {
        self.contexts.clear();
    }

    /// Number of entries held for a context.
    pub fn context_len(&self, context: &str) -> usize {
        self.contexts
            .get(context)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Total number of entries across all contexts.
    pub fn len(&self) -> usize {
        self.contexts.iter().map(|entries| entries.len()).sum()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the contexts currently holding entries.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.iter().map(|e| e.key().clone()).collect()
    }
}

impl<V: Clone> Default for MemoryIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}
