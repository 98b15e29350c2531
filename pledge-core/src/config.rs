//! Configuration types
//!
//! All configuration is read once at construction and passed explicitly to
//! the cache and repositories. Nothing here is global.

use crate::error::{ConfigError, PledgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// TTL TIERS
// ============================================================================

/// Named time-to-live tier for cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TtlTier {
    /// Near-real-time counters (~5 minutes by default)
    Short,
    /// Default tier (~30 minutes)
    #[default]
    Medium,
    /// Slow-moving aggregates (~1 hour)
    Long,
    /// Daily rollups
    Daily,
    /// Weekly rollups
    Weekly,
    /// Explicit override in seconds
    Custom(u64),
}

impl TtlTier {
    /// Look up a tier by name.
    ///
    /// Accepts the five tier names (case-insensitive) or a bare number of
    /// seconds. Returns `None` for anything else; callers decide the fallback.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            other => other.parse::<u64>().ok().map(Self::Custom),
        }
    }

    /// Stable name for logs and stats.
    pub fn name(&self) -> String {
        match self {
            Self::Short => "short".to_string(),
            Self::Medium => "medium".to_string(),
            Self::Long => "long".to_string(),
            Self::Daily => "daily".to_string(),
            Self::Weekly => "weekly".to_string(),
            Self::Custom(secs) => format!("{}s", secs),
        }
    }
}

/// Tier to TTL mapping, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TierConfig {
    pub short: u64,
    pub medium: u64,
    pub long: u64,
    pub daily: u64,
    pub weekly: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            short: 300,
            medium: 1800,
            long: 3600,
            daily: 86_400,
            weekly: 604_800,
        }
    }
}

impl TierConfig {
    /// Create TierConfig from environment variables.
    ///
    /// Environment variables (seconds; unset, unparsable or zero keeps the default):
    /// - `PLEDGE_CACHE_TTL_SHORT` (default: 300)
    /// - `PLEDGE_CACHE_TTL_MEDIUM` (default: 1800)
    /// - `PLEDGE_CACHE_TTL_LONG` (default: 3600)
    /// - `PLEDGE_CACHE_TTL_DAILY` (default: 86400)
    /// - `PLEDGE_CACHE_TTL_WEEKLY` (default: 604800)
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) over an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: u64| parse_secs(lookup(name)).unwrap_or(default);
        Self {
            short: secs("PLEDGE_CACHE_TTL_SHORT", defaults.short),
            medium: secs("PLEDGE_CACHE_TTL_MEDIUM", defaults.medium),
            long: secs("PLEDGE_CACHE_TTL_LONG", defaults.long),
            daily: secs("PLEDGE_CACHE_TTL_DAILY", defaults.daily),
            weekly: secs("PLEDGE_CACHE_TTL_WEEKLY", defaults.weekly),
        }
    }

    /// Replace every zero tier with its default.
    pub fn or_defaults(self) -> Self {
        let defaults = Self::default();
        let keep = |secs: u64, default: u64| if secs == 0 { default } else { secs };
        Self {
            short: keep(self.short, defaults.short),
            medium: keep(self.medium, defaults.medium),
            long: keep(self.long, defaults.long),
            daily: keep(self.daily, defaults.daily),
            weekly: keep(self.weekly, defaults.weekly),
        }
    }

    /// Seconds configured for a tier.
    pub fn seconds(&self, tier: TtlTier) -> u64 {
        match tier {
            TtlTier::Short => self.short,
            TtlTier::Medium => self.medium,
            TtlTier::Long => self.long,
            TtlTier::Daily => self.daily,
            TtlTier::Weekly => self.weekly,
            TtlTier::Custom(secs) => secs,
        }
    }

    /// TTL for a tier.
    pub fn ttl(&self, tier: TtlTier) -> Duration {
        Duration::from_secs(self.seconds(tier))
    }

    /// The table as name → seconds, for stats output.
    pub fn table(&self) -> BTreeMap<String, u64> {
        [
            TtlTier::Short,
            TtlTier::Medium,
            TtlTier::Long,
            TtlTier::Daily,
            TtlTier::Weekly,
        ]
        .into_iter()
        .map(|tier| (tier.name(), self.seconds(tier)))
        .collect()
    }

    /// Validate the configuration.
    ///
    /// Every tier must be positive. A zero TTL would make every write
    /// immediately stale.
    pub fn validate(&self) -> PledgeResult<()> {
        for (name, secs) in self.table() {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: name,
                    value: secs.to_string(),
                    reason: "TTL must be greater than zero".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

// ============================================================================
// REPOSITORY CONFIGURATION
// ============================================================================

/// Per-repository cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// When false, every lookup rebuilds and nothing is written to the cache.
    pub cache_enabled: bool,
    /// Overrides the view's tier TTL for single-model entries.
    pub default_ttl: Option<Duration>,
    /// Tier for cached collection counts.
    pub count_tier: TtlTier,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_ttl: None,
            count_tier: TtlTier::Short,
        }
    }
}

impl RepositoryConfig {
    /// Create a new repository config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create RepositoryConfig from environment variables.
    ///
    /// For a prefix `org_dashboard`:
    /// - `PLEDGE_ORG_DASHBOARD_CACHE_ENABLED`: "false" disables caching (default: true)
    /// - `PLEDGE_ORG_DASHBOARD_CACHE_TTL`: TTL override in seconds (default: none)
    pub fn from_env(prefix: &str) -> Self {
        let prefix = prefix.to_ascii_uppercase();

        let cache_enabled = std::env::var(format!("PLEDGE_{}_CACHE_ENABLED", prefix))
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let default_ttl =
            env_secs(&format!("PLEDGE_{}_CACHE_TTL", prefix)).map(Duration::from_secs);

        Self {
            cache_enabled,
            default_ttl,
            ..Self::default()
        }
    }

    /// Enable or disable caching.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the TTL override.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the tier used for collection counts.
    pub fn with_count_tier(mut self, tier: TtlTier) -> Self {
        self.count_tier = tier;
        self
    }
}

fn env_secs(name: &str) -> Option<u64> {
    parse_secs(std::env::var(name).ok())
}

/// Positive whole seconds, or `None`.
fn parse_secs(value: Option<String>) -> Option<u64> {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let config = TierConfig::default();
        assert_eq!(config.seconds(TtlTier::Short), 300);
        assert_eq!(config.seconds(TtlTier::Medium), 1800);
        assert_eq!(config.seconds(TtlTier::Long), 3600);
        assert_eq!(config.seconds(TtlTier::Daily), 86_400);
        assert_eq!(config.seconds(TtlTier::Weekly), 604_800);
        assert_eq!(config.ttl(TtlTier::Custom(42)), Duration::from_secs(42));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(TtlTier::from_name("short"), Some(TtlTier::Short));
        assert_eq!(TtlTier::from_name(" Weekly "), Some(TtlTier::Weekly));
        assert_eq!(TtlTier::from_name("120"), Some(TtlTier::Custom(120)));
        assert_eq!(TtlTier::from_name("hourly"), None);
    }

    #[test]
    fn test_table_lists_named_tiers() {
        let table = TierConfig::default().table();
        assert_eq!(table.len(), 5);
        assert_eq!(table.get("short"), Some(&300));
        assert_eq!(table.get("weekly"), Some(&604_800));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = TierConfig {
            short: 0,
            ..TierConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TierConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_vars_ignores_zero_and_garbage() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("PLEDGE_CACHE_TTL_SHORT", "0"),
            ("PLEDGE_CACHE_TTL_MEDIUM", " 120 "),
            ("PLEDGE_CACHE_TTL_LONG", "soon"),
            ("PLEDGE_CACHE_TTL_DAILY", "-5"),
        ]
        .into_iter()
        .collect();

        let config = TierConfig::from_vars(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.short, 300);
        assert_eq!(config.medium, 120);
        assert_eq!(config.long, 3600);
        assert_eq!(config.daily, 86_400);
        assert_eq!(config.weekly, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_or_defaults_fills_only_zero_tiers() {
        let config = TierConfig {
            short: 0,
            medium: 60,
            weekly: 0,
            ..TierConfig::default()
        }
        .or_defaults();
        assert_eq!(config.short, 300);
        assert_eq!(config.medium, 60);
        assert_eq!(config.weekly, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_repository_config_builder() {
        let config = RepositoryConfig::new()
            .with_cache_enabled(false)
            .with_default_ttl(Duration::from_secs(90))
            .with_count_tier(TtlTier::Long);

        assert!(!config.cache_enabled);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(90)));
        assert_eq!(config.count_tier, TtlTier::Long);
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&TtlTier::Daily).expect("serialize");
        assert_eq!(json, "\"daily\"");
        let parsed: TtlTier = serde_json::from_str("\"short\"").expect("deserialize");
        assert_eq!(parsed, TtlTier::Short);
    }
}
