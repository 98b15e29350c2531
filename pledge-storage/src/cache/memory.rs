//! In-memory cache store.
//!
//! Entries and the tag index live behind a single lock, so tag invalidation
//! is atomic with respect to concurrent reads and writes. Used in tests and
//! for single-process deployments.
//!
//! Entries are also indexed by expiry. Every write drops whatever has
//! expired, so keys that are never read again do not accumulate.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pledge_core::{CacheError, CacheResult};

use super::traits::{expiry_after, CacheStats, CacheStore, EntryInfo};

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
    tags: Vec<String>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

enum Lookup {
    Live(Vec<u8>),
    Expired,
    Absent,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, StoredEntry>,
    /// tag -> keys carrying it
    tag_index: HashMap<String, HashSet<String>>,
    /// (expiry, key), oldest first
    expiry_index: BTreeSet<(DateTime<Utc>, String)>,
}

impl Inner {
    fn insert(&mut self, key: &str, entry: StoredEntry) {
        self.remove(key);
        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.expiry_index.insert((entry.expires_at, key.to_string()));
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove an entry and unlink it from every tag it carried.
    fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        self.expiry_index.remove(&(entry.expires_at, key.to_string()));
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    /// Remove every entry expired at `now`. Returns how many were removed.
    fn sweep_expired(&mut self, now: DateTime<Utc>) -> u64 {
        let mut swept = 0u64;
        while let Some((expires_at, key)) = self.expiry_index.first().cloned() {
            if expires_at > now {
                break;
            }
            if self.remove(&key).is_none() {
                self.expiry_index.remove(&(expires_at, key));
            }
            swept += 1;
        }
        swept
    }

    fn memory_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.payload.len() as u64).sum()
    }
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    inner: RwLock<Inner>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently associated with a tag.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .read()
            .ok()
            .and_then(|inner| inner.tag_index.get(tag).cloned())
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn record_hit(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += 1;
        }
    }

    fn record_miss(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.misses += 1;
        }
    }

    fn record_expired(&self, count: u64) {
        if count == 0 {
            return;
        }
        if let Ok(mut stats) = self.stats.write() {
            stats.expired += count;
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn driver(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let lookup = {
            let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired(now) => Lookup::Live(entry.payload.clone()),
                Some(_) => Lookup::Expired,
                None => Lookup::Absent,
            }
        };

        match lookup {
            Lookup::Live(payload) => {
                self.record_hit();
                return Ok(Some(payload));
            }
            Lookup::Expired => {
                let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;
                // Re-check under the write lock; a writer may have refreshed it.
                if inner.entries.get(key).is_some_and(|e| e.is_expired(now)) {
                    inner.remove(key);
                    drop(inner);
                    self.record_expired(1);
                }
            }
            Lookup::Absent => {}
        }

        self.record_miss();
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        payload: Vec<u8>,
        ttl: Duration,
        tags: &[String],
    ) -> CacheResult<()> {
        let mut tags: Vec<String> = tags.iter().filter(|t| !t.is_empty()).cloned().collect();
        tags.sort();
        tags.dedup();

        let now = Utc::now();
        let entry = StoredEntry {
            payload,
            expires_at: expiry_after(now, ttl),
            tags,
        };

        let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;
        let swept = inner.sweep_expired(now);
        inner.insert(key, entry);
        drop(inner);

        self.record_expired(swept);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;
        Ok(inner.remove(key).is_some())
    }

    async fn invalidate_tags(&self, tags: &[String]) -> CacheResult<u64> {
        let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;

        let keys: HashSet<String> = tags
            .iter()
            .filter_map(|tag| inner.tag_index.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect();

        let mut removed = 0u64;
        for key in &keys {
            if inner.remove(key).is_some() {
                removed += 1;
            }
        }
        drop(inner);

        if let Ok(mut stats) = self.stats.write() {
            stats.invalidated += removed;
        }
        Ok(removed)
    }

    async fn entry_info(&self, key: &str) -> CacheResult<Option<EntryInfo>> {
        let now = Utc::now();
        let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| EntryInfo {
                expires_at: entry.expires_at,
                tags: entry.tags.clone(),
                size_bytes: entry.payload.len() as u64,
            }))
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.write().map_err(|_| CacheError::LockPoisoned)?;
        let purged = inner.sweep_expired(now);
        drop(inner);

        self.record_expired(purged);
        Ok(purged)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let (entry_count, memory_bytes) = {
            let inner = self.inner.read().map_err(|_| CacheError::LockPoisoned)?;
            (inner.entries.len() as u64, inner.memory_bytes())
        };
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.entry_count = entry_count;
        stats.memory_bytes = memory_bytes;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryCacheStore::new();
        store
            .put("k1", b"hello".to_vec(), Duration::from_secs(60), &[])
            .await
            .expect("put should succeed");

        let value = store.get("k1").await.expect("get should succeed");
        assert_eq!(value, Some(b"hello".to_vec()));
        assert_eq!(store.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = InMemoryCacheStore::new();
        store
            .put("k1", b"v".to_vec(), Duration::from_millis(20), &tags(&["t"]))
            .await
            .expect("put should succeed");

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("k1").await.expect("get"), None);
        assert!(store.is_empty(), "expired entry is removed on read");
        assert!(store.keys_for_tag("t").is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_tags_is_selective() {
        let store = InMemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store
            .put("a", b"1".to_vec(), ttl, &tags(&["organization:1", "campaigns"]))
            .await
            .expect("put");
        store
            .put("b", b"2".to_vec(), ttl, &tags(&["organization:2", "campaigns"]))
            .await
            .expect("put");
        store
            .put("c", b"3".to_vec(), ttl, &tags(&["organization:2"]))
            .await
            .expect("put");

        let removed = store
            .invalidate_tags(&tags(&["organization:2"]))
            .await
            .expect("invalidate should succeed");
        assert_eq!(removed, 2);

        assert!(store.get("a").await.expect("get").is_some());
        assert!(store.get("b").await.expect("get").is_none());
        assert!(store.get("c").await.expect("get").is_none());
        assert_eq!(store.keys_for_tag("campaigns"), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_tags() {
        let store = InMemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store
            .put("k", b"old".to_vec(), ttl, &tags(&["old-tag"]))
            .await
            .expect("put");
        store
            .put("k", b"new".to_vec(), ttl, &tags(&["new-tag"]))
            .await
            .expect("put");

        let removed = store
            .invalidate_tags(&tags(&["old-tag"]))
            .await
            .expect("invalidate");
        assert_eq!(removed, 0);
        assert_eq!(store.get("k").await.expect("get"), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_entry_info_reports_ttl_and_tags() {
        let store = InMemoryCacheStore::new();
        store
            .put("k", b"abc".to_vec(), Duration::from_secs(300), &tags(&["b", "a", "a"]))
            .await
            .expect("put");

        let info = store
            .entry_info("k")
            .await
            .expect("entry_info")
            .expect("entry exists");
        assert_eq!(info.tags, tags(&["a", "b"]));
        assert_eq!(info.size_bytes, 3);
        assert!(info.ttl_remaining() <= Duration::from_secs(300));
        assert!(info.ttl_remaining() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryCacheStore::new();
        store
            .put("short", b"1".to_vec(), Duration::from_millis(10), &[])
            .await
            .expect("put");
        store
            .put("long", b"2".to_vec(), Duration::from_secs(60), &[])
            .await
            .expect("put");

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await.expect("purge"), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_unread_expired_entries() {
        let store = InMemoryCacheStore::new();
        for i in 0..1000 {
            store
                .put(&format!("page:{}", i), b"x".to_vec(), Duration::from_millis(1), &tags(&["pages"]))
                .await
                .expect("put");
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .put("fresh", b"y".to_vec(), Duration::from_secs(60), &[])
            .await
            .expect("put");

        assert_eq!(store.len(), 1);
        assert!(store.keys_for_tag("pages").is_empty());
        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.expired, 1000);
        assert_eq!(store.purge_expired().await.expect("purge"), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryCacheStore::new();
        let _ = store.get("k").await;
        store
            .put("k", b"1234".to_vec(), Duration::from_secs(60), &tags(&["t"]))
            .await
            .expect("put");
        let _ = store.get("k").await;
        let _ = store.get("k").await;
        store.invalidate_tags(&tags(&["t"])).await.expect("invalidate");

        let stats = store.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.invalidated, 1);
        assert_eq!(stats.entry_count, 0);
    }
}
