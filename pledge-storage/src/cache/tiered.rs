//! TTL-tiered cache facade.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pledge_core::{InvalidationError, PledgeError, PledgeResult, TierConfig, TtlTier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::read::{Envelope, EnvelopeRef, Remembered};
use super::traits::{CacheStats, CacheStore, EntryInfo};

/// Snapshot of cache configuration and store counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    /// Store driver name.
    pub driver: String,
    /// Tier name -> TTL seconds.
    pub tiers: BTreeMap<String, u64>,
    /// Store counters. Defaults when the store could not report them.
    pub store: CacheStats,
    /// Why the store counters are missing, if they are.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

/// Cache facade mapping TTL tiers to durations over a tagged store.
///
/// Values are stored as JSON envelopes carrying the time they were cached.
/// See the [module docs](super) for the failure policy.
pub struct TieredCache<S: CacheStore> {
    store: Arc<S>,
    tiers: TierConfig,
}

impl<S: CacheStore> Clone for TieredCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tiers: self.tiers.clone(),
        }
    }
}

impl<S: CacheStore> TieredCache<S> {
    /// Create a cache over a store with a tier table.
    ///
    /// Zero tiers would make every write stale on arrival; they are logged
    /// and replaced with their defaults.
    pub fn new(store: Arc<S>, tiers: TierConfig) -> Self {
        let tiers = match tiers.validate() {
            Ok(()) => tiers,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid TTL tier table, using defaults for zero tiers");
                tiers.or_defaults()
            }
        };
        Self { store, tiers }
    }

    /// Create a cache with the default tier table.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, TierConfig::default())
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the tier table.
    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    /// TTL for a tier. A zero custom TTL uses the medium tier.
    pub fn ttl_for(&self, tier: TtlTier) -> Duration {
        if tier == TtlTier::Custom(0) {
            tracing::debug!("Zero custom TTL, using medium");
            return self.tiers.ttl(TtlTier::Medium);
        }
        self.tiers.ttl(tier)
    }

    /// Resolve a tier by name, falling back to `medium` for unknown names.
    pub fn resolve_tier(&self, name: &str) -> TtlTier {
        TtlTier::from_name(name).unwrap_or_else(|| {
            tracing::debug!(tier = name, "Unknown TTL tier, using medium");
            TtlTier::Medium
        })
    }

    /// Read a value. Absent, expired, unreadable and undecodable entries
    /// are all reported as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_read(key).await.map(Remembered::into_value)
    }

    /// Read a value along with the time it was cached.
    pub async fn get_read<T: DeserializeOwned>(&self, key: &str) -> Option<Remembered<T>> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(cache_key = key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(envelope) => {
                tracing::debug!(cache_key = key, "Cache hit");
                Some(Remembered::from(envelope))
            }
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Cached payload undecodable, treating as miss");
                None
            }
        }
    }

    /// Write a value. Returns whether the store accepted it; failures are
    /// logged and otherwise ignored.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, tags: &[String]) -> bool {
        let envelope = EnvelopeRef {
            cached_at: Utc::now(),
            value,
        };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Value not serializable, skipping cache write");
                return false;
            }
        };

        match self.store.put(key, payload, ttl, tags).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Return the cached value for `key`, or run `builder`, cache its result
    /// for the tier's TTL under `tags`, and return it.
    ///
    /// Builder errors propagate unchanged and nothing is cached.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        tier: TtlTier,
        tags: &[String],
        builder: F,
    ) -> PledgeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PledgeResult<T>>,
    {
        self.read_through(key, self.ttl_for(tier), tags, builder)
            .await
            .map(Remembered::into_value)
    }

    /// Like [`remember`](Self::remember) with an explicit TTL.
    pub async fn remember_with_ttl<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        builder: F,
    ) -> PledgeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PledgeResult<T>>,
    {
        self.read_through(key, ttl, tags, builder)
            .await
            .map(Remembered::into_value)
    }

    /// Like [`remember`](Self::remember), reporting whether the value came
    /// from the cache and when it was cached.
    pub async fn remember_read<T, F, Fut>(
        &self,
        key: &str,
        tier: TtlTier,
        tags: &[String],
        builder: F,
    ) -> PledgeResult<Remembered<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PledgeResult<T>>,
    {
        self.read_through(key, self.ttl_for(tier), tags, builder).await
    }

    async fn read_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        builder: F,
    ) -> PledgeResult<Remembered<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PledgeResult<T>>,
    {
        if let Some(read) = self.get_read::<T>(key).await {
            return Ok(read);
        }

        let value = builder().await?;
        self.put(key, &value, ttl, tags).await;
        Ok(Remembered::built(value))
    }

    /// Delete a single key. Returns whether an entry was removed.
    pub async fn forget(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Remove every entry carrying any of `tags`.
    ///
    /// Returns the number of entries removed. An empty tag list is a no-op.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> PledgeResult<u64> {
        if tags.is_empty() {
            return Ok(0);
        }

        match self.store.invalidate_tags(tags).await {
            Ok(removed) => {
                tracing::debug!(tags = ?tags, removed, "Invalidated cache tags");
                Ok(removed)
            }
            Err(e) => {
                tracing::error!(tags = ?tags, error = %e, "Cache invalidation failed");
                Err(PledgeError::from(InvalidationError::Failed {
                    tags: tags.to_vec(),
                    reason: e.to_string(),
                }))
            }
        }
    }

    /// Remaining TTL and tags of a live entry.
    pub async fn inspect(&self, key: &str) -> Option<EntryInfo> {
        match self.store.entry_info(key).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "Cache inspect failed");
                None
            }
        }
    }

    /// Physically remove expired entries from the store.
    pub async fn purge_expired(&self) -> PledgeResult<u64> {
        Ok(self.store.purge_expired().await?)
    }

    /// Driver, tier table and store counters. Never fails.
    pub async fn get_stats(&self) -> CacheStatsReport {
        let (store, store_error) = match self.store.stats().await {
            Ok(stats) => (stats, None),
            Err(e) => {
                tracing::warn!(driver = self.store.driver(), error = %e, "Cache stats unavailable");
                (CacheStats::default(), Some(e.to_string()))
            }
        };

        CacheStatsReport {
            driver: self.store.driver().to_string(),
            tiers: self.tiers.table(),
            store,
            store_error,
        }
    }
}
