//! Read model value object.
//!
//! A `ReadModel` is an immutable snapshot of builder output for one subject,
//! stamped with a version at build time and carrying the tags it is cached
//! under. Derived getters are pure functions of `data`.

use chrono::{DateTime, Utc};
use pledge_core::{SubjectId, TagSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Raw builder output.
pub type RawData = Map<String, Value>;

// ============================================================================
// MODEL VERSION
// ============================================================================

/// Build-time version token.
///
/// A UUIDv7: ordered by creation within a process and embedding the build
/// timestamp, so two versions compare by which build happened later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersion(Uuid);

impl ModelVersion {
    /// A version stamped now.
    pub fn now() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Build time embedded in the version, if it carries one.
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
    }

    /// Returns true if this version was built after `other`.
    pub fn is_newer_than(&self, other: &ModelVersion) -> bool {
        self > other
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// READ MODEL
// ============================================================================

/// Versioned snapshot of derived data for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadModel {
    id: SubjectId,
    data: RawData,
    version: ModelVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_ms: Option<u64>,
    #[serde(default)]
    tags: TagSet,
}

impl ReadModel {
    /// Wrap builder output, stamping a fresh version.
    pub fn new(id: impl Into<SubjectId>, data: RawData) -> Self {
        Self {
            id: id.into(),
            data,
            version: ModelVersion::now(),
            ttl_ms: None,
            tags: TagSet::new(),
        }
    }

    pub fn with_version(mut self, version: ModelVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    pub fn data(&self) -> &RawData {
        &self.data
    }

    pub fn version(&self) -> ModelVersion {
        self.version
    }

    /// TTL this model asks to be cached for, if it set one.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Tags this model is cached under.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Returns true for collection/summary models.
    pub fn is_summary(&self) -> bool {
        self.id.is_summary()
    }

    /// Returns true if the model was built at or after `timestamp`.
    pub fn is_fresh_as_of(&self, timestamp: DateTime<Utc>) -> bool {
        self.version
            .built_at()
            .is_some_and(|built_at| built_at >= timestamp)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Integer field. Floats with no fractional part are accepted.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        let value = self.get(field)?;
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
    }

    /// Numeric field. Numeric strings (as some SQL drivers return decimals)
    /// are accepted.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Array field, empty if absent or not an array.
    pub fn get_array(&self, field: &str) -> &[Value] {
        self.get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The whole data map.
    pub fn to_array(&self) -> RawData {
        self.data.clone()
    }

    // ------------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------------

    /// `part / whole` as a percentage rounded to 2 decimal places, 0 when
    /// `whole` is 0.
    pub fn percentage(part: f64, whole: f64) -> f64 {
        if whole == 0.0 {
            return 0.0;
        }
        round2(part / whole * 100.0)
    }

    /// Label/value pairs from an array of `{"label": .., "value": ..}`
    /// objects. Malformed items are skipped.
    pub fn breakdown(&self, field: &str) -> Vec<(String, f64)> {
        self.get_array(field)
            .iter()
            .filter_map(|item| {
                let label = match item.get("label")? {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let value = match item.get("value")? {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse().ok()?,
                    _ => return None,
                };
                Some((label, value))
            })
            .collect()
    }
}

/// Round to 2 decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> RawData {
        match value {
            Value::Object(map) => map,
            _ => panic!("test data must be an object"),
        }
    }

    #[test]
    fn test_accessors() {
        let model = ReadModel::new(
            42u64,
            data(json!({
                "name": "Acme",
                "donors": 12,
                "raised": "1520.50",
                "goal": 4000.0,
                "recent": [1, 2, 3]
            })),
        );

        assert_eq!(model.get_str("name"), Some("Acme"));
        assert_eq!(model.get_i64("donors"), Some(12));
        assert_eq!(model.get_i64("goal"), Some(4000));
        assert_eq!(model.get_f64("raised"), Some(1520.5));
        assert_eq!(model.get_array("recent").len(), 3);
        assert!(model.get_array("missing").is_empty());
        assert_eq!(model.to_array()["name"], json!("Acme"));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(ReadModel::percentage(1.0, 3.0), 33.33);
        assert_eq!(ReadModel::percentage(5.0, 0.0), 0.0);
        assert_eq!(ReadModel::percentage(4000.0, 4000.0), 100.0);
    }

    #[test]
    fn test_breakdown_skips_malformed_items() {
        let model = ReadModel::new(
            1u64,
            data(json!({
                "daily": [
                    {"label": "2024-05-01", "value": 120},
                    {"label": "2024-05-02", "value": "80.5"},
                    {"label": "2024-05-03"},
                    "garbage"
                ]
            })),
        );
        assert_eq!(
            model.breakdown("daily"),
            vec![
                ("2024-05-01".to_string(), 120.0),
                ("2024-05-02".to_string(), 80.5)
            ]
        );
    }

    #[test]
    fn test_versions_increase() {
        let first = ReadModel::new(1u64, RawData::new());
        let second = ReadModel::new(1u64, RawData::new());
        assert!(second.version().is_newer_than(&first.version()));
    }

    #[test]
    fn test_version_embeds_build_time() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let model = ReadModel::new(1u64, RawData::new());
        assert!(model.is_fresh_as_of(before));
        assert!(!model.is_fresh_as_of(Utc::now() + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_serde_roundtrip_keeps_tags_and_ttl() {
        let model = ReadModel::new("acme", data(json!({"name": "Acme"})))
            .with_ttl(Duration::from_secs(300))
            .with_tags(TagSet::new().with("read_model").with("organization:acme"));

        let json = serde_json::to_string(&model).expect("serialize");
        let back: ReadModel = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back, model);
        assert_eq!(back.ttl(), Some(Duration::from_secs(300)));
        assert!(back.tags().contains("organization:acme"));
    }

    #[test]
    fn test_summary_model() {
        assert!(ReadModel::new(SubjectId::summary(), RawData::new()).is_summary());
        assert!(!ReadModel::new(7u64, RawData::new()).is_summary());
    }
}
