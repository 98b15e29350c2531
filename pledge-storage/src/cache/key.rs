//! Deterministic cache keys.
//!
//! A `CacheKey` can only be built from a repository prefix, a subject (or a
//! collection segment) and a normalized [`FilterSet`], so the same inputs
//! always produce the same key and logically identical filter maps never
//! produce two keys.

use pledge_core::{FilterSet, SubjectId};
use std::fmt;

/// Separator byte between a tag and the cache key in the LMDB tag index.
/// Never valid inside UTF-8, so tags cannot collide with it.
const SEPARATOR: u8 = 0xFF;

/// Marker placed before collection segments. Subject segments always start
/// with `n:` or `s:` (see [`SubjectId::key_segment`]), so the two never meet.
const COLLECTION_MARKER: char = '@';

/// A cache key.
///
/// # Format
///
/// - Subject keys: `<prefix>:<segment>` or `<prefix>:<segment>:<fingerprint>`,
///   where the segment is `n:<id>` or `s:<escaped id>`
/// - Collection keys: `<prefix>:@<segment>` or `<prefix>:@<segment>:<fingerprint>`
///
/// The fingerprint is present only when the filter set is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Private - only the constructors below can produce a key.
    inner: String,
}

impl CacheKey {
    /// Key for one subject of a repository under a filter set.
    pub fn new(prefix: &str, id: &SubjectId, filters: &FilterSet) -> Self {
        Self::compose(prefix, &id.key_segment(), filters)
    }

    /// Key for a collection-level artifact (`count`, `page`) under a filter set.
    pub fn collection(prefix: &str, segment: &str, filters: &FilterSet) -> Self {
        Self::compose(prefix, &format!("{}{}", COLLECTION_MARKER, segment), filters)
    }

    fn compose(prefix: &str, head: &str, filters: &FilterSet) -> Self {
        let inner = match filters.fingerprint() {
            Some(fp) => format!("{}:{}:{}", prefix, head, fp),
            None => format!("{}:{}", prefix, head),
        };
        Self { inner }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

/// Encode a tag index row: `[tag bytes][0xFF][key bytes]`.
pub(crate) fn tag_index_key(tag: &str, key: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(tag.len() + 1 + key.len());
    bytes.extend_from_slice(tag.as_bytes());
    bytes.push(SEPARATOR);
    bytes.extend_from_slice(key.as_bytes());
    bytes
}

/// Prefix covering every index row of a tag.
pub(crate) fn tag_prefix(tag: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(tag.len() + 1);
    bytes.extend_from_slice(tag.as_bytes());
    bytes.push(SEPARATOR);
    bytes
}

/// Split an index row back into `(tag, key)`.
pub(crate) fn split_tag_index_key(bytes: &[u8]) -> Option<(&str, &str)> {
    let pos = bytes.iter().position(|b| *b == SEPARATOR)?;
    let tag = std::str::from_utf8(&bytes[..pos]).ok()?;
    let key = std::str::from_utf8(&bytes[pos + 1..]).ok()?;
    Some((tag, key))
}
