//! LMDB-backed cache store with a persistent tag index.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts and can be shared by
//! several worker processes on one host.
//!
//! # Layout
//!
//! Two databases live in one environment:
//! - `entries`: cache key -> [`EntryFrame`]
//! - `tag_index`: `[tag][0xFF][cache key]` -> empty
//!
//! # Atomicity
//!
//! `put`, `delete`, `invalidate_tags` and `purge_expired` each run in a
//! single write transaction that touches both databases. If anything fails
//! before commit the transaction is aborted and nothing is removed.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use pledge_core::{CacheError, CacheResult};

use super::key::{split_tag_index_key, tag_index_key, tag_prefix};
use super::traits::{expiry_after, CacheStats, CacheStore, EntryInfo};

/// Size of the fixed frame header: expiry millis (8) + tag block length (4).
const HEADER_LEN: usize = 12;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A stored frame could not be decoded.
    #[error("Corrupt entry frame: {0}")]
    Frame(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to CacheError.
impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Frame(reason) => CacheError::Deserialization {
                key: "lmdb entry frame".to_string(),
                reason,
            },
            other => CacheError::unavailable("lmdb", other.to_string()),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Stored form of one cache entry.
///
/// Binary format:
/// - Bytes 0-7: expiry as Unix milliseconds (i64, little endian)
/// - Bytes 8-11: length `n` of the tag block (u32, little endian)
/// - Bytes 12..12+n: tags as a JSON array of strings
/// - Remainder: payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFrame {
    pub expires_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub payload: Vec<u8>,
}

impl EntryFrame {
    /// Encode the frame for storage.
    pub fn encode(&self) -> Result<Vec<u8>, LmdbCacheError> {
        let tag_block = serde_json::to_vec(&self.tags)
            .map_err(|e| LmdbCacheError::Frame(e.to_string()))?;
        let tag_len = u32::try_from(tag_block.len())
            .map_err(|_| LmdbCacheError::Frame("tag block too large".to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + tag_block.len() + self.payload.len());
        bytes.extend_from_slice(&self.expires_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&tag_len.to_le_bytes());
        bytes.extend_from_slice(&tag_block);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Decode a stored frame. Never panics on malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Frame(format!(
                "frame is {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let millis_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbCacheError::Frame("invalid expiry".to_string()))?;
        let expires_at = DateTime::from_timestamp_millis(i64::from_le_bytes(millis_bytes))
            .ok_or_else(|| LmdbCacheError::Frame("expiry out of range".to_string()))?;

        let len_bytes: [u8; 4] = bytes[8..12]
            .try_into()
            .map_err(|_| LmdbCacheError::Frame("invalid tag length".to_string()))?;
        let tag_len = u32::from_le_bytes(len_bytes) as usize;
        let tag_end = HEADER_LEN
            .checked_add(tag_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| LmdbCacheError::Frame("tag block overruns frame".to_string()))?;

        let tags: Vec<String> = serde_json::from_slice(&bytes[HEADER_LEN..tag_end])
            .map_err(|e| LmdbCacheError::Frame(e.to_string()))?;

        Ok(Self {
            expires_at,
            tags,
            payload: bytes[tag_end..].to_vec(),
        })
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// LMDB-backed cache store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbCacheStore::new("/var/cache/pledge", 512)?;
/// let cache = TieredCache::new(Arc::new(store), TierConfig::from_env());
/// ```
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// Cache key -> encoded entry frame.
    entries: Database<Bytes, Bytes>,
    /// Tag index rows.
    tag_index: Database<Bytes, Bytes>,
    /// Hit/miss/invalidation counters.
    stats: RwLock<CacheStats>,
}

impl LmdbCacheStore {
    /// Create a new LMDB cache store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Databases cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;

        let entries: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("entries"))
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        let tag_index: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("tag_index"))
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            entries,
            tag_index,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Read and decode the frame stored under `key`, inside any transaction.
    fn read_frame(&self, txn: &heed::RoTxn, key: &str) -> Result<Option<EntryFrame>, LmdbCacheError> {
        match self.entries.get(txn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => EntryFrame::decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Delete an entry and its tag index rows within a write transaction.
    ///
    /// An entry whose frame no longer decodes is still deleted; its index
    /// rows are left for `invalidate_tags` to sweep.
    fn remove_in(&self, wtxn: &mut RwTxn, key: &str) -> Result<bool, LmdbCacheError> {
        let tags = match self.read_frame(wtxn, key) {
            Ok(Some(frame)) => frame.tags,
            Ok(None) => return Ok(false),
            Err(_) => Vec::new(),
        };
        for tag in &tags {
            self.tag_index
                .delete(wtxn, &tag_index_key(tag, key))
                .map_err(txn_err)?;
        }
        self.entries.delete(wtxn, key.as_bytes()).map_err(txn_err)
    }

    /// Collect index rows for a tag within a transaction.
    ///
    /// Rows sort by tag, so this is a range scan over `tag 0xFF ..`; rows for
    /// other tags are never visited.
    fn rows_for_tag(&self, txn: &heed::RoTxn, tag: &str) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let prefix = tag_prefix(tag);
        let mut rows = Vec::new();
        for result in self
            .tag_index
            .prefix_iter(txn, prefix.as_slice())
            .map_err(txn_err)?
        {
            let (row, _) = result.map_err(txn_err)?;
            rows.push(row.to_vec());
        }
        Ok(rows)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    fn driver(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let frame = match self.read_frame(&rtxn, key) {
            Ok(frame) => frame,
            Err(e) => {
                self.record(|s| s.misses += 1);
                return Err(e.into());
            }
        };

        match frame {
            Some(frame) if !frame.is_expired(Utc::now()) => {
                self.record(|s| s.hits += 1);
                Ok(Some(frame.payload))
            }
            _ => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
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

        let frame = EntryFrame {
            expires_at: expiry_after(Utc::now(), ttl),
            tags,
            payload,
        };
        let encoded = frame.encode()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.remove_in(&mut wtxn, key)?;
        self.entries
            .put(&mut wtxn, key.as_bytes(), &encoded)
            .map_err(txn_err)?;
        for tag in &frame.tags {
            self.tag_index
                .put(&mut wtxn, &tag_index_key(tag, key), &[])
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.remove_in(&mut wtxn, key)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    async fn invalidate_tags(&self, tags: &[String]) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let mut rows = Vec::new();
        for tag in tags {
            rows.extend(self.rows_for_tag(&wtxn, tag)?);
        }

        let mut removed = 0u64;
        for row in &rows {
            if let Some((_, key)) = split_tag_index_key(row) {
                if self.remove_in(&mut wtxn, key)? {
                    removed += 1;
                }
            }
            // Dangling rows (entry already gone) are swept here too.
            self.tag_index.delete(&mut wtxn, row).map_err(txn_err)?;
        }

        wtxn.commit().map_err(txn_err)?;

        self.record(|s| s.invalidated += removed);
        Ok(removed)
    }

    async fn entry_info(&self, key: &str) -> CacheResult<Option<EntryInfo>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let frame = self.read_frame(&rtxn, key)?;
        Ok(frame
            .filter(|frame| !frame.is_expired(Utc::now()))
            .map(|frame| EntryInfo {
                expires_at: frame.expires_at,
                size_bytes: frame.payload.len() as u64,
                tags: frame.tags,
            }))
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        let now = Utc::now();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let mut expired = Vec::new();
        for result in self.entries.iter(&wtxn).map_err(txn_err)? {
            let (key, bytes) = result.map_err(txn_err)?;
            let is_expired = EntryFrame::decode(bytes)
                .map(|frame| frame.is_expired(now))
                .unwrap_or(true);
            if is_expired {
                if let Ok(key) = std::str::from_utf8(key) {
                    expired.push(key.to_string());
                }
            }
        }

        let mut purged = 0u64;
        for key in &expired {
            if self.remove_in(&mut wtxn, key)? {
                purged += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        self.record(|s| s.expired += purged);
        Ok(purged)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.entries.len(&rtxn).map_err(txn_err)?;

        let mut memory_bytes = 0u64;
        for result in self.entries.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = result.map_err(txn_err)?;
            memory_bytes += bytes.len() as u64;
        }

        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        stats.memory_bytes = memory_bytes;
        Ok(stats)
    }
}
