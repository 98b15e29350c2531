//! Cache store trait and entry metadata.
//!
//! This module defines the trait that must be implemented by cache stores.
//! Stores deal in opaque byte payloads; typing and serialization belong to
//! [`TieredCache`](super::TieredCache).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pledge_core::CacheResult;
use serde::{Deserialize, Serialize};

/// Cache store trait for pluggable backends.
///
/// This trait abstracts over different stores (in-memory, LMDB, a remote
/// key-value service). Implementations must be thread-safe and support
/// concurrent access.
///
/// # Tag Contract
///
/// An entry written with tags `T` must be removed by `invalidate_tags(&[t])`
/// for every `t` in `T`. Rewriting a key replaces its tag set. Tag
/// invalidation must be all-or-nothing: on error, no entry is removed.
///
/// # Expiry
///
/// Expired entries must never be returned by `get` or `entry_info`. Physical
/// removal may be lazy; see `purge_expired`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Driver name reported in stats ("memory", "lmdb", ...).
    fn driver(&self) -> &'static str;

    /// Get a live payload, or None if absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a payload with a TTL and tags, replacing any previous entry.
    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration, tags: &[String])
        -> CacheResult<()>;

    /// Delete a single entry. Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Delete every entry associated with any of `tags`.
    ///
    /// Returns the number of entries removed.
    async fn invalidate_tags(&self, tags: &[String]) -> CacheResult<u64>;

    /// Metadata for a live entry.
    async fn entry_info(&self, key: &str) -> CacheResult<Option<EntryInfo>>;

    /// Physically remove expired entries. Returns the number removed.
    async fn purge_expired(&self) -> CacheResult<u64>;

    /// Get store statistics.
    async fn stats(&self) -> CacheResult<CacheStats>;
}

/// Metadata about a live cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
    /// Tags the entry was written with.
    pub tags: Vec<String>,
    /// Payload size in bytes.
    pub size_bytes: u64,
}

impl EntryInfo {
    /// Time left before expiry, zero if already past.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries currently stored, including expired ones not yet purged.
    pub entry_count: u64,
    /// Approximate payload bytes stored.
    pub memory_bytes: u64,
    /// Number of entries removed by tag invalidation.
    pub invalidated: u64,
    /// Number of expired entries removed.
    pub expired: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Expiry instant for a TTL starting now, saturating at the far future.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_ttl_remaining() {
        let info = EntryInfo {
            expires_at: Utc::now() + chrono::Duration::seconds(300),
            tags: vec![],
            size_bytes: 0,
        };
        let remaining = info.ttl_remaining();
        assert!(remaining <= Duration::from_secs(300));
        assert!(remaining > Duration::from_secs(290));

        let expired = EntryInfo {
            expires_at: Utc::now() - chrono::Duration::seconds(5),
            tags: vec![],
            size_bytes: 0,
        };
        assert_eq!(expired.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_expiry_after_saturates() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            expiry_after(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
    }
}
