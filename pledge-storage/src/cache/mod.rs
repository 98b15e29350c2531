//! Tagged cache layer with TTL tiers.
//!
//! Entries are written with a TTL and a set of tags. A single call to
//! [`TieredCache::invalidate_by_tags`] removes every entry carrying any of
//! the given tags, atomically from the caller's point of view.
//!
//! # Failure Policy
//!
//! The cache accelerates a feature; it must never take the feature down.
//! Store failures on the read path are treated as a miss, store failures on
//! the write path are logged and dropped. Invalidation failures are the
//! exception: they are surfaced, because a silent failure leaves stale data
//! in place until the TTL runs out.
//!
//! # Example
//!
//! ```ignore
//! let cache = TieredCache::new(Arc::new(InMemoryCacheStore::new()), TierConfig::default());
//!
//! let totals = cache
//!     .remember("org:12:totals", TtlTier::Short, &["organization:12".into()], || async {
//!         load_totals(12).await
//!     })
//!     .await?;
//!
//! // Organization 12 changed: drop everything derived from it.
//! cache.invalidate_by_tags(&["organization:12".into()]).await?;
//! ```

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod tiered;
pub mod traits;

pub use key::CacheKey;
pub use lmdb_backend::{EntryFrame, LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use read::{Origin, Remembered};
pub use tiered::{CacheStatsReport, TieredCache};
pub use traits::{CacheStats, CacheStore, EntryInfo};
