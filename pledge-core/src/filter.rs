//! Normalized filter sets for read-model lookups
//!
//! A filter set is part of a cache key, so two logically identical filter
//! maps must normalize to the same bytes. Keys are ordered, nested objects
//! are ordered recursively, and null-valued filters are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex characters of the SHA-256 digest kept in cache keys.
const FINGERPRINT_LEN: usize = 16;

/// An ordered, normalized set of named filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct FilterSet {
    entries: BTreeMap<String, Value>,
}

impl FilterSet {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Add or replace a filter. Null values remove the filter.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = canonicalize(value.into());
        if value.is_null() {
            self.entries.remove(&field);
        } else {
            self.entries.insert(field, value);
        }
    }

    /// Get a filter value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries.get(field)
    }

    /// Get a string filter value.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.entries.get(field).and_then(Value::as_str)
    }

    /// Get an integer filter value.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.entries.get(field).and_then(Value::as_i64)
    }

    /// Returns true when no filters are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate filters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Canonical JSON encoding. Stable across insertion order.
    pub fn canonical_json(&self) -> String {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(object).to_string()
    }

    /// Short digest of the canonical encoding, or `None` for an empty set.
    pub fn fingerprint(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        Some(hex)
    }
}

impl From<BTreeMap<String, Value>> for FilterSet {
    fn from(map: BTreeMap<String, Value>) -> Self {
        let mut set = Self::new();
        for (field, value) in map {
            set.insert(field, value);
        }
        set
    }
}

impl From<FilterSet> for BTreeMap<String, Value> {
    fn from(set: FilterSet) -> Self {
        set.entries
    }
}

impl From<Map<String, Value>> for FilterSet {
    fn from(map: Map<String, Value>) -> Self {
        let mut set = Self::new();
        for (field, value) in map {
            set.insert(field, value);
        }
        set
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (field, value) in iter {
            set.insert(field, value);
        }
        set
    }
}

/// Rebuild objects with sorted keys, recursively.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = FilterSet::new().with("status", "active").with("year", 2024);
        let b = FilterSet::new().with("year", 2024).with("status", "active");

        assert_eq!(a, b);
        assert_eq!(a.canonical_json(), b.canonical_json());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let a = FilterSet::new().with("range", json!({"to": 10, "from": 1}));
        let b = FilterSet::new().with("range", json!({"from": 1, "to": 10}));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_null_filters_are_dropped() {
        let with_null = FilterSet::new().with("status", "active").with("owner", Value::Null);
        let without = FilterSet::new().with("status", "active");
        assert_eq!(with_null, without);
        assert_eq!(with_null.len(), 1);
    }

    #[test]
    fn test_empty_has_no_fingerprint() {
        assert!(FilterSet::new().fingerprint().is_none());
        let fp = FilterSet::new()
            .with("a", 1)
            .fingerprint()
            .expect("non-empty set has a fingerprint");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_different_values_differ() {
        let a = FilterSet::new().with("year", 2023);
        let b = FilterSet::new().with("year", 2024);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_typed_getters() {
        let filters = FilterSet::new().with("status", "active").with("year", 2024);
        assert_eq!(filters.get_str("status"), Some("active"));
        assert_eq!(filters.get_i64("year"), Some(2024));
        assert_eq!(filters.get_str("year"), None);
    }

    #[test]
    fn test_serde_roundtrip_normalizes() {
        let parsed: FilterSet =
            serde_json::from_str(r#"{"b": 2, "a": null, "c": {"y": 1, "x": 2}}"#)
                .expect("filter set should parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.canonical_json(), r#"{"b":2,"c":{"x":2,"y":1}}"#);
    }

    proptest! {
        /// Property: any permutation of the same pairs yields the same fingerprint.
        #[test]
        fn prop_fingerprint_ignores_order(
            pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
        ) {
            let forward: FilterSet = pairs.iter().map(|(k, v)| (k.clone(), *v)).collect();
            let reverse: FilterSet = pairs.iter().rev().map(|(k, v)| (k.clone(), *v)).collect();
            prop_assert_eq!(forward.fingerprint(), reverse.fingerprint());
        }
    }
}
