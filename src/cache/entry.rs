//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.
//! The serialized form is the on-disk format of the durable tier:
//! `{"value": <any>, "expiresAt": <epoch-ms>, "createdAt": <epoch-ms>}`.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    ///
    /// Sub-millisecond TTLs round up, so a non-zero TTL always outlives the
    /// millisecond it was created in.
    pub fn new(value: Value, ttl: Duration) -> Self {
        let now = current_timestamp_ms();
        let ttl_ms = u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);

        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry stays valid up to and including its expiration instant and is
    /// expired once the current time is strictly past it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`is_expired`](Self::is_expired) against a fixed clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(json!("test_value"), Duration::from_secs(60));

        assert_eq!(entry.value, json!("test_value"));
        assert_eq!(entry.expires_at - entry.created_at, 60_000);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(json!(1), Duration::from_millis(1));

        sleep(Duration::from_millis(10));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = CacheEntry::new(json!(1), Duration::from_secs(10));

        let remaining_ms = entry.ttl_remaining_ms();
        assert!(remaining_ms <= 10_000);
        assert!(remaining_ms >= 9_000);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry {
            value: json!("test"),
            created_at: 1_000,
            expires_at: 2_000,
        };

        assert!(!entry.is_expired_at(2_000), "Entry is valid at its expiry instant");
        assert!(entry.is_expired_at(2_001));
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        let entry = CacheEntry::new(json!(1), Duration::from_micros(500));
        assert_eq!(entry.expires_at - entry.created_at, 1);

        let entry = CacheEntry::new(json!(1), Duration::from_nanos(1_000_001));
        assert_eq!(entry.expires_at - entry.created_at, 2);

        let entry = CacheEntry::new(json!(1), Duration::from_millis(7));
        assert_eq!(entry.expires_at - entry.created_at, 7);
    }

    #[test]
    fn test_serialized_layout() {
        let entry = CacheEntry {
            value: json!({"title": "hello"}),
            created_at: 10,
            expires_at: 20,
        };

        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            encoded,
            json!({"value": {"title": "hello"}, "expiresAt": 20, "createdAt": 10})
        );
    }
}
