//! Memory Store Module
//!
//! Ephemeral tier: a HashMap of entries with lazy TTL expiration and a soft
//! capacity bound.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, MemoryStats};
use crate::config::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};

// == Memory Store ==
/// In-process key/value store with TTL expiration.
///
/// Capacity is a soft cap: when full, `set` reclaims expired entries first
/// and inserts regardless of whether anything was freed.
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Soft cap on the number of entries
    max_size: usize,
    /// TTL used when a caller passes none
    default_ttl: Duration,
    /// Bumped by every write or removal
    generation: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl MemoryStore {
    // == Constructor ==
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            default_ttl,
            generation: 0,
        }
    }

    // == Set ==
    /// Stores a value, overwriting any existing entry for `key`.
    ///
    /// `ttl` falls back to the store's default TTL when `None`.
    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));
        self.insert_entry(key, entry);
    }

    // == Insert Entry ==
    /// Stores a prebuilt entry, keeping its timestamps.
    pub fn insert_entry(&mut self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            let reclaimed = self.cleanup();
            if reclaimed == 0 {
                debug!(
                    size = self.entries.len(),
                    max_size = self.max_size,
                    "Memory tier over soft cap, inserting anyway"
                );
            }
        }

        self.entries.insert(key, entry);
        self.generation += 1;
    }

    // == Promote ==
    /// Inserts `entry` only if nothing was written or removed since
    /// `generation` was observed and `key` holds no live entry.
    ///
    /// Returns whether the entry was inserted.
    pub fn promote(&mut self, key: &str, entry: CacheEntry, generation: u64) -> bool {
        if self.generation != generation || self.get_entry(key).is_some() {
            return false;
        }

        self.insert_entry(key, entry);
        true
    }

    /// Current write generation, for use with [`MemoryStore::promote`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // == Get ==
    /// Retrieves a live value, dropping the entry if it has expired.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Retrieves a live entry including its timestamps.
    pub fn get_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;

        if entry.is_expired() {
            self.entries.remove(key);
            return None;
        }

        Some(entry.clone())
    }

    // == Delete ==
    /// Removes an entry. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.generation += 1;
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = current_timestamp_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    // == Remove Matching ==
    /// Removes every entry whose key satisfies `predicate`.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        self.generation += 1;
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key.as_str()));
        before - self.entries.len()
    }

    // == Stats ==
    pub fn stats(&self) -> MemoryStats {
        let now = current_timestamp_ms();
        let expired = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .count();

        MemoryStats {
            total: self.entries.len(),
            active: self.entries.len() - expired,
            expired,
            max_size: self.max_size,
        }
    }

    /// Keys currently held, expired or not.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    const SHORT: Duration = Duration::from_millis(1);

    #[test]
    fn test_store_new() {
        let store = MemoryStore::default();
        assert!(store.is_empty());
        assert_eq!(store.stats().max_size, 100);
        assert_eq!(store.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::default();

        store.set("k1", json!("v1"), Some(Duration::from_secs(5)));

        assert_eq!(store.get("k1"), Some(json!("v1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = MemoryStore::default();
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_store_delete() {
        let mut store = MemoryStore::default();

        store.set("k1", json!(1), None);
        assert!(store.delete("k1"));
        assert!(!store.delete("k1"));
        assert_eq!(store.get("k1"), None);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = MemoryStore::default();

        store.set("k1", json!("first"), None);
        store.set("k1", json!("second"), None);

        assert_eq!(store.get("k1"), Some(json!("second")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_lazy_expiration() {
        let mut store = MemoryStore::default();

        store.set("k1", json!("v1"), Some(SHORT));
        sleep(Duration::from_millis(10));

        assert_eq!(store.len(), 1, "Expired entry lingers until touched");
        assert_eq!(store.get("k1"), None);
        assert!(store.is_empty(), "Lookup removes the expired entry");
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = MemoryStore::default();

        store.set("short", json!(1), Some(SHORT));
        store.set("long", json!(2), Some(Duration::from_secs(10)));
        sleep(Duration::from_millis(10));

        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.cleanup(), 0);
        assert_eq!(store.get("long"), Some(json!(2)));
    }

    #[test]
    fn test_soft_cap_reclaims_expired_slots() {
        let mut store = MemoryStore::new(2, Duration::from_secs(60));

        store.set("a", json!(1), Some(SHORT));
        store.set("b", json!(2), None);
        sleep(Duration::from_millis(10));

        store.set("c", json!(3), None);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("c"), Some(json!(3)));
    }

    #[test]
    fn test_soft_cap_inserts_when_nothing_expired() {
        let mut store = MemoryStore::new(2, Duration::from_secs(60));

        store.set("a", json!(1), None);
        store.set("b", json!(2), None);
        store.set("c", json!(3), None);

        assert_eq!(store.len(), 3, "Soft cap never rejects or evicts live entries");
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_insert_entry_keeps_timestamps() {
        let mut store = MemoryStore::default();
        let entry = CacheEntry::new(json!("v"), Duration::from_secs(30));
        let expires_at = entry.expires_at;

        store.insert_entry("k", entry);

        assert_eq!(store.get_entry("k").unwrap().expires_at, expires_at);
    }

    #[test]
    fn test_promote_into_empty_slot() {
        let mut store = MemoryStore::default();
        let seen = store.generation();

        assert!(store.promote("k", CacheEntry::new(json!("disk"), Duration::from_secs(30)), seen));
        assert_eq!(store.get("k"), Some(json!("disk")));
    }

    #[test]
    fn test_promote_does_not_overwrite_newer_write() {
        let mut store = MemoryStore::default();
        let seen = store.generation();
        let stale = CacheEntry::new(json!("old"), Duration::from_secs(30));

        store.set("k", json!("new"), None);

        assert!(!store.promote("k", stale, seen));
        assert_eq!(store.get("k"), Some(json!("new")));
    }

    #[test]
    fn test_promote_skipped_after_removal() {
        let mut store = MemoryStore::default();
        let stale = CacheEntry::new(json!("old"), Duration::from_secs(30));

        let seen = store.generation();
        store.remove_matching(|key| key.contains("blog"));
        assert!(!store.promote("blog_1", stale.clone(), seen));

        let seen = store.generation();
        store.delete("blog_1");
        assert!(!store.promote("blog_1", stale.clone(), seen));

        let seen = store.generation();
        store.clear();
        assert!(!store.promote("blog_1", stale, seen));

        assert_eq!(store.get("blog_1"), None);
    }

    #[test]
    fn test_promote_keeps_live_entry() {
        let mut store = MemoryStore::default();
        store.set("k", json!("live"), None);
        let seen = store.generation();

        let stale = CacheEntry::new(json!("old"), Duration::from_secs(30));
        assert!(!store.promote("k", stale, seen));
        assert_eq!(store.get("k"), Some(json!("live")));
    }

    #[test]
    fn test_remove_matching() {
        let mut store = MemoryStore::default();
        store.set("blog_1", json!(1), None);
        store.set("blog_2", json!(2), None);
        store.set("shop_1", json!(3), None);

        assert_eq!(store.remove_matching(|key| key.contains("blog")), 2);
        assert_eq!(store.keys(), vec!["shop_1".to_string()]);
    }

    #[test]
    fn test_stats() {
        let mut store = MemoryStore::new(10, Duration::from_secs(60));
        store.set("live", json!(1), None);
        store.set("dead", json!(2), Some(SHORT));
        sleep(Duration::from_millis(10));

        assert_eq!(
            store.stats(),
            MemoryStats {
                total: 2,
                active: 1,
                expired: 1,
                max_size: 10,
            }
        );
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryStore::default();
        store.set("a", json!(1), None);
        store.set("b", json!(2), None);

        store.clear();

        assert!(store.is_empty());
    }
}
