//! Cache Module
//!
//! Two-tier caching with TTL expiration: a memory tier in front of a durable
//! disk tier, plus deterministic key generation.

mod disk;
mod entry;
mod key;
mod memory;
mod stats;
mod tiered;


// Re-export public types
pub use disk::DiskStore;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::{canonicalize, generate_key};
pub use memory::MemoryStore;
pub use stats::{CacheCounters, CleanupReport, DiskStats, MemoryStats, TieredStats};
pub use tiered::TieredCache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 160;
