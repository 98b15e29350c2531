//! Error types for PLEDGE operations

use thiserror::Error;

/// Cache store errors.
///
/// These never reach end users: the read path treats them as a miss and the
/// write path logs and drops them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store unavailable ({driver}): {reason}")]
    StoreUnavailable { driver: String, reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

impl CacheError {
    /// Shorthand for a store failure on the given driver.
    pub fn unavailable(driver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            driver: driver.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by read-model builders.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Build failed for {subject}: {reason}")]
    Failed { subject: String, reason: String },

    #[error("Builder returned inconsistent data: {reason}")]
    Inconsistent { reason: String },
}

impl BuildError {
    /// Build failure for a single subject.
    pub fn failed(subject: impl ToString, reason: impl Into<String>) -> Self {
        Self::Failed {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }
}

/// Tag invalidation errors. Unlike store read/write failures these are
/// surfaced, since a silent failure leaves stale data in place.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidationError {
    #[error("Invalidation failed for tags {tags:?}: {reason}")]
    Failed { tags: Vec<String>, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all PLEDGE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PledgeError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Invalidation error: {0}")]
    Invalidation(#[from] InvalidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for cache store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for PLEDGE operations.
pub type PledgeResult<T> = Result<T, PledgeError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_display() {
        let err = CacheError::unavailable("memory", "connection refused");
        let msg = format!("{}", err);
        assert!(msg.contains("unavailable"));
        assert!(msg.contains("memory"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_build_error_display() {
        let err = BuildError::failed(42, "query timed out");
        let msg = format!("{}", err);
        assert!(msg.contains("42"));
        assert!(msg.contains("query timed out"));
    }

    #[test]
    fn test_invalidation_error_lists_tags() {
        let err = InvalidationError::Failed {
            tags: vec!["organization:1".to_string()],
            reason: "disk full".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("organization:1"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_pledge_error_from_variants() {
        let cache = PledgeError::from(CacheError::LockPoisoned);
        assert!(matches!(cache, PledgeError::Cache(_)));

        let build = PledgeError::from(BuildError::Inconsistent {
            reason: "duplicate id".to_string(),
        });
        assert!(matches!(build, PledgeError::Build(_)));

        let invalidation = PledgeError::from(InvalidationError::Failed {
            tags: vec![],
            reason: "x".to_string(),
        });
        assert!(matches!(invalidation, PledgeError::Invalidation(_)));

        let config = PledgeError::from(ConfigError::InvalidValue {
            field: "short".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, PledgeError::Config(_)));
    }
}
