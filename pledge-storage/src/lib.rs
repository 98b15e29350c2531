//! PLEDGE Storage - Cache Stores and the Tiered Cache Facade
//!
//! Defines the `CacheStore` abstraction the read-model layer writes through,
//! an in-memory store, an LMDB-backed store, and `TieredCache`, which maps
//! named TTL tiers onto store writes and owns the failure policy.

pub mod cache;

pub use cache::{
    CacheKey, CacheStats, CacheStatsReport, CacheStore, EntryFrame, EntryInfo, InMemoryCacheStore,
    LmdbCacheError, LmdbCacheStore, Origin, Remembered, TieredCache,
};
