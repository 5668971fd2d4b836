//! Cache Statistics Module
//!
//! Tracks hit/miss counters across tiers and the per-tier snapshots returned
//! by `TieredCache::stats`.

use serde::Serialize;

// == Cache Counters ==
/// Running counters for tiered lookups and writes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheCounters {
    /// Lookups answered by the memory tier
    pub memory_hits: u64,
    /// Lookups answered by the disk tier (and promoted)
    pub disk_hits: u64,
    /// Lookups answered by neither tier
    pub misses: u64,
    /// Successful `set` calls
    pub writes: u64,
    /// `set` calls whose disk write failed
    pub failed_disk_writes: u64,
}

impl CacheCounters {
    // == Constructor ==
    /// Creates a new CacheCounters with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate across both tiers.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records a write; `disk_ok` is the outcome of the durable write.
    pub fn record_write(&mut self, disk_ok: bool) {
        self.writes += 1;
        if !disk_ok {
            self.failed_disk_writes += 1;
        }
    }
}

// == Memory Stats ==
/// Snapshot of the memory tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub max_size: usize,
}

// == Disk Stats ==
/// Snapshot of the disk tier, computed by scanning the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskStats {
    pub files: usize,
    pub expired: usize,
    pub corrupted: usize,
    pub bytes: u64,
}

// == Tiered Stats ==
/// Combined statistics for both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct TieredStats {
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub counters: CacheCounters,
    pub hit_rate: f64,
}

// == Cleanup Report ==
/// Entries removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub memory_removed: usize,
    pub disk_removed: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.memory_removed + self.disk_removed
    }
}
