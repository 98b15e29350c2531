//! PLEDGE Core - Shared Types
//!
//! Identifiers, configuration, filter normalization, cache tags and the error
//! taxonomy shared by the storage and read-model crates. No I/O lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod error;
pub mod filter;
pub mod tags;

pub use config::{RepositoryConfig, TierConfig, TtlTier};
pub use error::{
    BuildError, CacheError, CacheResult, ConfigError, InvalidationError, PledgeError,
    PledgeResult,
};
pub use filter::FilterSet;
pub use tags::{subject_tag, entity_tag, TagSet, READ_MODEL_TAG};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identity of the entity a read model describes.
///
/// Domain rows are keyed either by integer primary keys or by slugs. The
/// numeric id `0` is reserved for collection and summary models that do not
/// describe a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(untagged)]
pub enum SubjectId {
    /// Integer primary key.
    Numeric(u64),
    /// String key (slug, external reference).
    Named(String),
}

impl SubjectId {
    /// The sentinel id used by aggregate/summary models.
    pub fn summary() -> Self {
        Self::Numeric(0)
    }

    /// Returns true if this is the summary sentinel.
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Numeric(0))
    }

    /// Numeric value, if this id is numeric.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Named(_) => None,
        }
    }

    /// Unambiguous encoding for cache keys and subject tags.
    ///
    /// Numeric ids become `n:<id>`, named ids `s:<id>` with `%`, `:` and `@`
    /// percent-escaped, so `Numeric(42)` and `Named("42")` never share a key
    /// and a slug cannot pose as a collection segment or fingerprint.
    pub fn key_segment(&self) -> String {
        match self {
            Self::Numeric(n) => format!("n:{}", n),
            Self::Named(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push_str("s:");
                for c in s.chars() {
                    match c {
                        '%' => out.push_str("%25"),
                        ':' => out.push_str("%3A"),
                        '@' => out.push_str("%40"),
                        c => out.push(c),
                    }
                }
                out
            }
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{}", n),
            Self::Named(s) => f.write_str(s),
        }
    }
}

impl From<u64> for SubjectId {
    fn from(value: u64) -> Self {
        Self::Numeric(value)
    }
}

impl From<u32> for SubjectId {
    fn from(value: u32) -> Self {
        Self::Numeric(u64::from(value))
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_display() {
        assert_eq!(SubjectId::from(42u64).to_string(), "42");
        assert_eq!(SubjectId::from("spring-drive").to_string(), "spring-drive");
    }

    #[test]
    fn test_summary_sentinel() {
        assert!(SubjectId::summary().is_summary());
        assert!(!SubjectId::from(7u64).is_summary());
        assert!(!SubjectId::from("0").is_summary());
    }

    #[test]
    fn test_subject_id_serde_untagged() {
        let numeric: SubjectId = serde_json::from_str("42").expect("numeric id should parse");
        assert_eq!(numeric, SubjectId::Numeric(42));

        let named: SubjectId = serde_json::from_str("\"acme\"").expect("named id should parse");
        assert_eq!(named, SubjectId::Named("acme".to_string()));

        assert_eq!(
            serde_json::to_string(&SubjectId::from(9u64)).expect("serialize"),
            "9"
        );
    }

    #[test]
    fn test_key_segment_distinguishes_kinds() {
        assert_eq!(SubjectId::from(42u64).key_segment(), "n:42");
        assert_eq!(SubjectId::from("42").key_segment(), "s:42");
        assert_eq!(SubjectId::from("@count").key_segment(), "s:%40count");
        assert_eq!(SubjectId::from("a:b%").key_segment(), "s:a%3Ab%25");
        assert_ne!(
            SubjectId::from("a:b").key_segment(),
            SubjectId::from("a%3Ab").key_segment()
        );
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(SubjectId::from(5u32).as_u64(), Some(5));
        assert_eq!(SubjectId::from("x").as_u64(), None);
    }
}
