//! Cache warming.
//!
//! Proactively builds read models for a population of subjects (most active
//! organizations, campaigns ending soon) so the first real request after a
//! deploy or a bulk import does not pay the build cost.

use std::sync::Arc;

use async_trait::async_trait;
use pledge_core::{FilterSet, PledgeResult, SubjectId};
use pledge_storage::CacheStore;
use serde::{Deserialize, Serialize};

use crate::builder::ReadModelBuilder;
use crate::repository::ReadModelRepository;

/// Outcome of a warming run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmReport {
    /// Subjects built and cached.
    pub warmed: usize,
    /// Subjects that were already cached.
    pub already_cached: usize,
    /// Subjects the builder had no data for.
    pub missing: usize,
    /// Subjects whose build failed, with the error.
    pub failed: Vec<(SubjectId, String)>,
}

impl WarmReport {
    /// Number of subjects processed.
    pub fn attempted(&self) -> usize {
        self.warmed + self.already_cached + self.missing + self.failed.len()
    }

    /// Returns true if no subject failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Source of the subjects worth warming.
#[async_trait]
pub trait WarmingPopulation: Send + Sync {
    /// Up to `limit` subject ids, most important first.
    async fn top_ids(&self, limit: usize) -> PledgeResult<Vec<SubjectId>>;
}

/// A fixed list of subjects.
#[async_trait]
impl WarmingPopulation for Vec<SubjectId> {
    async fn top_ids(&self, limit: usize) -> PledgeResult<Vec<SubjectId>> {
        Ok(self.iter().take(limit).cloned().collect())
    }
}

/// Warms one repository from a population.
pub struct CacheWarmer<S: CacheStore, B: ReadModelBuilder, P: WarmingPopulation> {
    repository: ReadModelRepository<S, B>,
    population: Arc<P>,
}

impl<S: CacheStore, B: ReadModelBuilder, P: WarmingPopulation> CacheWarmer<S, B, P> {
    pub fn new(repository: ReadModelRepository<S, B>, population: Arc<P>) -> Self {
        Self {
            repository,
            population,
        }
    }

    pub fn repository(&self) -> &ReadModelRepository<S, B> {
        &self.repository
    }

    /// Warm the top `limit` subjects. Subjects already cached are left alone.
    ///
    /// Fails only if the population cannot be listed.
    pub async fn warm(&self, limit: usize) -> PledgeResult<WarmReport> {
        let ids = self.population.top_ids(limit).await?;
        tracing::debug!(prefix = self.repository.prefix(), count = ids.len(), "Warming read models");
        Ok(self.repository.warm_cache_for(&ids).await)
    }

    /// Rebuild the given subjects even if cached, e.g. after a bulk import.
    pub async fn refresh(&self, ids: &[SubjectId]) -> WarmReport {
        let filters = FilterSet::new();
        let mut report = WarmReport::default();

        for id in ids {
            match self.repository.rebuild(id.clone(), &filters).await {
                Ok(Some(_)) => report.warmed += 1,
                Ok(None) => report.missing += 1,
                Err(e) => {
                    tracing::warn!(prefix = self.repository.prefix(), subject = %id, error = %e, "Failed to refresh read model");
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            prefix = self.repository.prefix(),
            refreshed = report.warmed,
            missing = report.missing,
            failed = report.failed.len(),
            "Cache refresh finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = WarmReport {
            warmed: 2,
            already_cached: 1,
            missing: 1,
            failed: vec![(SubjectId::from(9u64), "boom".to_string())],
        };
        assert_eq!(report.attempted(), 5);
        assert!(!report.is_clean());
        assert!(WarmReport::default().is_clean());
    }

    #[tokio::test]
    async fn test_static_population_respects_limit() {
        let population: Vec<SubjectId> = (1..=5u64).map(SubjectId::from).collect();
        let top = population.top_ids(3).await.expect("top_ids");
        assert_eq!(top, vec![SubjectId::from(1u64), SubjectId::from(2u64), SubjectId::from(3u64)]);
    }
}
