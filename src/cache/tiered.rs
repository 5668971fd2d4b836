//! Tiered Cache Module
//!
//! Read-through / write-through orchestration of the memory and disk tiers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheCounters, CacheEntry, CleanupReport, DiskStore, MemoryStore, TieredStats, MAX_KEY_LENGTH,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Tiered Cache ==
/// Two-tier cache: a synchronous memory tier in front of a durable disk tier.
///
/// Owned by the host application and shared as `Arc<TieredCache>`. The memory
/// lock is never held across an `.await`.
#[derive(Debug)]
pub struct TieredCache {
    memory: Mutex<MemoryStore>,
    disk: DiskStore,
    counters: Mutex<CacheCounters>,
}

impl TieredCache {
    // == Constructor ==
    pub fn new(memory: MemoryStore, disk: DiskStore) -> Self {
        Self {
            memory: Mutex::new(memory),
            disk,
            counters: Mutex::new(CacheCounters::new()),
        }
    }

    /// Builds the cache from configuration. Nothing touches the disk until the
    /// first write.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MemoryStore::new(config.max_entries, config.default_ttl),
            DiskStore::new(&config.cache_dir),
        )
    }

    // == Get ==
    /// Looks `key` up in memory, then on disk.
    ///
    /// A disk hit is promoted into memory with the durable entry's timestamps,
    /// so the promoted copy expires exactly when the file does. Promotion is
    /// skipped when the memory tier changed while the file was being read, so
    /// a concurrent write or removal is never overwritten.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;

        let (cached, generation) = {
            let mut memory = self.memory();
            (memory.get(key), memory.generation())
        };
        if let Some(value) = cached {
            debug!(key, "Memory hit");
            self.counters().record_memory_hit();
            return Ok(decode(key, value));
        }

        match self.disk.get(key).await {
            Some(entry) => {
                let ttl_remaining_ms = entry.ttl_remaining_ms();
                let value = entry.value.clone();
                let promoted = self.memory().promote(key, entry, generation);
                debug!(key, ttl_remaining_ms, promoted, "Disk hit");
                self.counters().record_disk_hit();
                Ok(decode(key, value))
            }
            None => {
                debug!(key, "Cache miss");
                self.counters().record_miss();
                Ok(None)
            }
        }
    }

    /// Looks `key` up in the memory tier only.
    pub fn get_memory_only<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;

        let cached = self.memory().get(key);
        match cached {
            Some(value) => {
                self.counters().record_memory_hit();
                Ok(decode(key, value))
            }
            None => {
                self.counters().record_miss();
                Ok(None)
            }
        }
    }

    // == Set ==
    /// Writes `value` to both tiers.
    ///
    /// The memory write always lands; the disk write is best-effort and its
    /// failure is logged, not returned. Serialization errors propagate.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let entry = self.build_entry(key, value, ttl)?;

        self.memory().insert_entry(key, entry.clone());
        let disk_ok = self.disk.set(key, &entry).await;
        if !disk_ok {
            warn!(key, "Disk write failed, entry held in memory only");
        }

        self.counters().record_write(disk_ok);
        Ok(true)
    }

    /// Writes `value` to the memory tier only.
    pub fn set_memory_only<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let entry = self.build_entry(key, value, ttl)?;
        self.memory().insert_entry(key, entry);
        self.counters().record_write(true);
        Ok(true)
    }

    // == Delete ==
    /// Removes `key` from both tiers. Returns `false` if the file could not be
    /// removed.
    pub async fn delete(&self, key: &str) -> bool {
        self.memory().delete(key);
        let deleted = self.disk.delete(key).await;
        // Drops a copy promoted while the file was still on disk.
        self.memory().delete(key);
        deleted
    }

    // == Clear ==
    pub async fn clear(&self) -> bool {
        self.memory().clear();
        let cleared = self.disk.clear().await;
        self.memory().clear();
        info!(disk_cleared = cleared, "Cache cleared");
        cleared
    }

    // == Cleanup ==
    /// Purges expired entries from both tiers.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let memory_removed = self.memory().cleanup();
        let disk_removed = self.disk.cleanup().await?;

        Ok(CleanupReport {
            memory_removed,
            disk_removed,
        })
    }

    // == Stats ==
    pub async fn stats(&self) -> TieredStats {
        let memory = self.memory().stats();
        let disk = self.disk.stats().await;
        let counters = self.counters().clone();
        let hit_rate = counters.hit_rate();

        TieredStats {
            memory,
            disk,
            counters,
            hit_rate,
        }
    }

    /// Removes every entry in either tier whose key satisfies `predicate`.
    /// Returns `(memory_removed, disk_removed)`.
    pub(crate) async fn remove_matching<F>(&self, predicate: F) -> (usize, usize)
    where
        F: Fn(&str) -> bool,
    {
        let memory_removed = self.memory().remove_matching(&predicate);
        let disk_removed = self.disk.remove_matching(&predicate).await;
        // Drops copies promoted while the files were still on disk.
        self.memory().remove_matching(&predicate);
        (memory_removed, disk_removed)
    }

    /// Keys held by the memory tier.
    pub fn memory_keys(&self) -> Vec<String> {
        self.memory().keys()
    }

    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }

    fn build_entry<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<CacheEntry>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CacheError::InvalidTtl);
        }

        let value = serde_json::to_value(value)?;
        let ttl = ttl.unwrap_or_else(|| self.memory().default_ttl());
        Ok(CacheEntry::new(value, ttl))
    }

    fn memory(&self) -> MutexGuard<'_, MemoryStore> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn counters(&self) -> MutexGuard<'_, CacheCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {MAX_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// A stored value of the wrong shape is treated as a miss.
fn decode<T>(key: &str, value: Value) -> Option<T>
where
    T: DeserializeOwned,
{
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(key, error = %err, "Cached value has unexpected shape");
            None
        }
    }
}
