//! Read-model repository.
//!
//! Turns a subject id (or a batch of ids, or a filter set for a paginated
//! collection) into a cached `ReadModel`, calling the builder only on a miss.
//!
//! The repository holds no state beyond its configuration and `Arc`ed
//! dependencies; every call is independent and safe to run concurrently.
//! Two callers missing the same key at once will both build and both write
//! (last write wins).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pledge_core::{
    subject_tag, ConfigError, FilterSet, PledgeResult, RepositoryConfig, SubjectId, TagSet,
};
use pledge_storage::{CacheKey, CacheStatsReport, CacheStore, TieredCache};
use serde::{Deserialize, Serialize};

use crate::builder::{BuiltModel, ReadModelBuilder};
use crate::model::{RawData, ReadModel};
use crate::view::ReadModelView;
use crate::warmer::WarmReport;

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T = ReadModel> {
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    /// Number of the last page (at least 1).
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    /// Returns true if pages after this one exist.
    pub fn has_more(&self) -> bool {
        self.page < self.last_page()
    }

    /// Map every item, keeping the paging metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Cached repository for one read-model type.
///
/// # Example
///
/// ```ignore
/// let repo = ReadModelRepository::new(cache, Arc::new(DashboardBuilder::new(pool)), config);
///
/// let dashboard = repo.find_view(12u64, &FilterSet::new()).await?;
///
/// // Organization 12 was updated elsewhere.
/// repo.invalidate(&[entity_tag("organization", 12)]).await?;
/// ```
pub struct ReadModelRepository<S: CacheStore, B: ReadModelBuilder> {
    cache: TieredCache<S>,
    builder: Arc<B>,
    config: RepositoryConfig,
}

impl<S: CacheStore, B: ReadModelBuilder> Clone for ReadModelRepository<S, B> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            builder: Arc::clone(&self.builder),
            config: self.config.clone(),
        }
    }
}

impl<S: CacheStore, B: ReadModelBuilder> ReadModelRepository<S, B> {
    pub fn new(cache: TieredCache<S>, builder: Arc<B>, config: RepositoryConfig) -> Self {
        Self {
            cache,
            builder,
            config,
        }
    }

    /// Create a repository with caching enabled and default TTLs.
    pub fn with_defaults(cache: TieredCache<S>, builder: Arc<B>) -> Self {
        Self::new(cache, builder, RepositoryConfig::default())
    }

    pub fn cache(&self) -> &TieredCache<S> {
        &self.cache
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Cache key prefix of this repository.
    pub fn prefix(&self) -> &'static str {
        B::View::CACHE_PREFIX
    }

    /// Cache key for one subject under a filter set.
    pub fn key_for(&self, id: &SubjectId, filters: &FilterSet) -> CacheKey {
        CacheKey::new(self.prefix(), id, filters)
    }

    /// TTL for single models and pages.
    fn model_ttl(&self) -> Duration {
        self.config
            .default_ttl
            .unwrap_or_else(|| self.cache.ttl_for(B::View::TTL_TIER))
    }

    fn wrap(&self, id: SubjectId, data: RawData) -> ReadModel {
        let tags = B::View::cache_tags(&id, &data);
        ReadModel::new(id, data)
            .with_ttl(self.model_ttl())
            .with_tags(tags)
    }

    async fn build(&self, id: &SubjectId, filters: &FilterSet) -> PledgeResult<Option<ReadModel>> {
        match self.builder.build_one(id, filters).await? {
            Some(data) if !data.is_empty() => Ok(Some(self.wrap(id.clone(), data))),
            _ => {
                tracing::debug!(prefix = self.prefix(), subject = %id, "No data for subject, not caching absence");
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &CacheKey, model: &ReadModel) -> bool {
        let ttl = model.ttl().unwrap_or_else(|| self.model_ttl());
        self.cache
            .put(key.as_str(), model, ttl, &model.tags().to_vec())
            .await
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Find the read model for a subject, building and caching it on a miss.
    ///
    /// Returns `Ok(None)` if the builder has no data for the subject; that
    /// absence is not cached.
    pub async fn find(
        &self,
        id: impl Into<SubjectId>,
        filters: &FilterSet,
    ) -> PledgeResult<Option<ReadModel>> {
        let id = id.into();
        if !self.config.cache_enabled {
            return self.build(&id, filters).await;
        }

        let key = self.key_for(&id, filters);
        if let Some(model) = self.cache.get::<ReadModel>(key.as_str()).await {
            return Ok(Some(model));
        }

        let Some(model) = self.build(&id, filters).await? else {
            return Ok(None);
        };
        self.store(&key, &model).await;
        Ok(Some(model))
    }

    /// Like [`find`](Self::find), wrapped in the typed view.
    pub async fn find_view(
        &self,
        id: impl Into<SubjectId>,
        filters: &FilterSet,
    ) -> PledgeResult<Option<B::View>> {
        Ok(self.find(id, filters).await?.map(B::View::from_model))
    }

    /// Find several subjects.
    ///
    /// Cache misses are built with a single `build_many` call. The result
    /// follows the order of `ids`, with duplicates collapsed and subjects the
    /// builder has no data for left out.
    pub async fn find_many(
        &self,
        ids: &[SubjectId],
        filters: &FilterSet,
    ) -> PledgeResult<Vec<ReadModel>> {
        let mut seen = HashSet::new();
        let unique: Vec<SubjectId> = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();

        let mut found: HashMap<SubjectId, ReadModel> = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();

        if self.config.cache_enabled {
            for id in &unique {
                let key = self.key_for(id, filters);
                match self.cache.get::<ReadModel>(key.as_str()).await {
                    Some(model) => {
                        found.insert(id.clone(), model);
                    }
                    None => misses.push(id.clone()),
                }
            }
        } else {
            misses = unique.clone();
        }

        if !misses.is_empty() {
            let requested: HashSet<&SubjectId> = misses.iter().collect();
            for BuiltModel { id, data } in self.builder.build_many(&misses, filters).await? {
                if data.is_empty() {
                    continue;
                }
                if !requested.contains(&id) {
                    tracing::debug!(prefix = self.prefix(), subject = %id, "Batch build returned unrequested subject, ignoring");
                    continue;
                }
                let model = self.wrap(id.clone(), data);
                if self.config.cache_enabled {
                    self.store(&self.key_for(&id, filters), &model).await;
                }
                found.insert(id, model);
            }
        }

        Ok(unique
            .into_iter()
            .filter_map(|id| found.remove(&id))
            .collect())
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Number of subjects matching `filters`, cached under the count tier.
    pub async fn count(&self, filters: &FilterSet) -> PledgeResult<u64> {
        if !self.config.cache_enabled {
            return self.builder.build_count(filters).await;
        }

        let key = CacheKey::collection(self.prefix(), "count", filters);
        let tags = B::View::collection_tags().to_vec();
        self.cache
            .remember(key.as_str(), self.config.count_tier, &tags, || {
                self.builder.build_count(filters)
            })
            .await
    }

    /// Page `page` (1-based) of `per_page` items.
    pub async fn paginate(&self, filters: &FilterSet, page: u64, per_page: u64) -> PledgeResult<Page> {
        if page == 0 {
            return Err(invalid("page", page, "pages are numbered from 1"));
        }
        let offset = (page - 1).saturating_mul(per_page);
        self.paginate_range(filters, per_page, offset).await
    }

    /// `limit` items starting at `offset`.
    ///
    /// The total and the page are built and cached separately: counts live
    /// under the count tier, pages under the view tier.
    pub async fn paginate_range(
        &self,
        filters: &FilterSet,
        limit: u64,
        offset: u64,
    ) -> PledgeResult<Page> {
        if limit == 0 {
            return Err(invalid("per_page", limit, "page size must be positive"));
        }

        let total = self.count(filters).await?;
        let items = if offset >= total {
            Vec::new()
        } else {
            self.page_items(filters, limit, offset).await?
        };

        Ok(Page {
            items,
            total,
            page: offset / limit + 1,
            per_page: limit,
        })
    }

    async fn page_items(&self, filters: &FilterSet, limit: u64, offset: u64) -> PledgeResult<Vec<ReadModel>> {
        if !self.config.cache_enabled {
            return self.build_page(filters, limit, offset).await;
        }

        let segment = format!("page:{}:{}", limit, offset);
        let key = CacheKey::collection(self.prefix(), &segment, filters);
        if let Some(items) = self.cache.get::<Vec<ReadModel>>(key.as_str()).await {
            return Ok(items);
        }

        let items = self.build_page(filters, limit, offset).await?;
        let mut tags = B::View::collection_tags();
        for model in &items {
            tags.extend(model.tags().iter().cloned());
        }
        self.cache
            .put(key.as_str(), &items, self.model_ttl(), &tags.to_vec())
            .await;
        Ok(items)
    }

    async fn build_page(&self, filters: &FilterSet, limit: u64, offset: u64) -> PledgeResult<Vec<ReadModel>> {
        let built = self.builder.build_page(filters, limit, offset).await?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        if built.len() > limit {
            tracing::debug!(prefix = self.prefix(), returned = built.len(), limit, "Builder overfilled page, truncating");
        }

        Ok(built
            .into_iter()
            .filter(|b| !b.data.is_empty())
            .take(limit)
            .map(|BuiltModel { id, data }| self.wrap(id, data))
            .collect())
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Invalidate `tags` plus this repository's collection tag.
    pub async fn invalidate(&self, tags: &[String]) -> PledgeResult<u64> {
        let mut merged: TagSet = tags.iter().cloned().collect();
        merged.insert(B::View::COLLECTION_TAG);
        self.cache.invalidate_by_tags(&merged.to_vec()).await
    }

    /// Invalidate everything cached for one subject, plus collections.
    pub async fn invalidate_subject(&self, id: impl Into<SubjectId>) -> PledgeResult<u64> {
        let id = id.into();
        self.invalidate(&[subject_tag(self.prefix(), &id)]).await
    }

    /// Drop the cached entry for a subject and build it again.
    pub async fn rebuild(
        &self,
        id: impl Into<SubjectId>,
        filters: &FilterSet,
    ) -> PledgeResult<Option<ReadModel>> {
        let id = id.into();
        let key = self.key_for(&id, filters);
        self.cache.forget(key.as_str()).await;

        let model = self.build(&id, filters).await?;
        if let Some(model) = &model {
            if self.config.cache_enabled {
                self.store(&key, model).await;
            }
        }
        Ok(model)
    }

    // ========================================================================
    // Warming and stats
    // ========================================================================

    /// Make sure each subject is cached (unfiltered).
    ///
    /// Subjects are processed one at a time. A failing subject is logged and
    /// recorded in the report; it never stops the rest.
    pub async fn warm_cache_for(&self, ids: &[SubjectId]) -> WarmReport {
        let mut report = WarmReport::default();
        if !self.config.cache_enabled {
            tracing::debug!(prefix = self.prefix(), "Caching disabled, skipping warm");
            return report;
        }

        let filters = FilterSet::new();
        let mut seen = HashSet::new();
        for id in ids.iter().filter(|id| seen.insert(*id)) {
            let key = self.key_for(id, &filters);
            if self.cache.get::<ReadModel>(key.as_str()).await.is_some() {
                report.already_cached += 1;
                continue;
            }

            match self.build(id, &filters).await {
                Ok(Some(model)) => {
                    self.store(&key, &model).await;
                    report.warmed += 1;
                }
                Ok(None) => report.missing += 1,
                Err(e) => {
                    tracing::warn!(prefix = self.prefix(), subject = %id, error = %e, "Failed to warm read model");
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            prefix = self.prefix(),
            warmed = report.warmed,
            already_cached = report.already_cached,
            missing = report.missing,
            failed = report.failed.len(),
            "Cache warm finished"
        );
        report
    }

    /// Driver, tier table and store counters.
    pub async fn get_cache_stats(&self) -> CacheStatsReport {
        self.cache.get_stats().await
    }
}

fn invalid(field: &str, value: u64, reason: &str) -> pledge_core::PledgeError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
