//! PLEDGE Test Utilities
//!
//! Centralized test infrastructure for the PLEDGE workspace:
//! - Scripted builders, failing stores and populations
//! - Proptest generators for ids, filters, tags and tiers
//! - Fixtures for the concrete read models
//! - Custom assertions on PLEDGE errors

// Re-export core types for convenience
pub use pledge_core::{
    BuildError, CacheError, CacheResult, ConfigError, FilterSet, InvalidationError, PledgeError,
    PledgeResult, RepositoryConfig, SubjectId, TagSet, TierConfig, TtlTier,
};
pub use pledge_readmodel::{
    BuiltModel, RawData, ReadModel, ReadModelBuilder, ReadModelRepository, ReadModelView,
    WarmingPopulation,
};
pub use pledge_storage::{CacheStats, CacheStore, EntryInfo, InMemoryCacheStore, TieredCache};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a tracing subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; defaults to `pledge=debug`. Safe to call from every test.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pledge_storage=debug,pledge_readmodel=debug,warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builder output from a JSON value. Non-objects are wrapped under `value`.
pub fn raw(value: Value) -> RawData {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = RawData::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

// ============================================================================
// SCRIPTED BUILDER
// ============================================================================

/// In-memory builder for any view, with call counters and scripted failures.
///
/// Rows are served in id order. Filters match rows whose fields equal every
/// filter value.
pub struct ScriptedBuilder<V> {
    rows: Mutex<BTreeMap<SubjectId, RawData>>,
    failing: Mutex<HashSet<SubjectId>>,
    one_calls: AtomicUsize,
    many_calls: AtomicUsize,
    count_calls: AtomicUsize,
    page_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    _view: PhantomData<fn() -> V>,
}

impl<V> Default for ScriptedBuilder<V> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            one_calls: AtomicUsize::new(0),
            many_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            _view: PhantomData,
        }
    }
}

impl<V> ScriptedBuilder<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row, builder style.
    pub fn with_row(self, id: impl Into<SubjectId>, data: Value) -> Self {
        self.set_row(id, data);
        self
    }

    /// Add or replace a row.
    pub fn set_row(&self, id: impl Into<SubjectId>, data: Value) {
        lock(&self.rows).insert(id.into(), raw(data));
    }

    pub fn remove_row(&self, id: impl Into<SubjectId>) {
        lock(&self.rows).remove(&id.into());
    }

    /// Make every build touching `id` fail.
    pub fn fail_on(&self, id: impl Into<SubjectId>) {
        lock(&self.failing).insert(id.into());
    }

    pub fn recover(&self, id: impl Into<SubjectId>) {
        lock(&self.failing).remove(&id.into());
    }

    pub fn one_calls(&self) -> usize {
        self.one_calls.load(Ordering::SeqCst)
    }

    pub fn many_calls(&self) -> usize {
        self.many_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// Number of ids requested by each `build_many` call.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batch_sizes).clone()
    }

    fn check(&self, id: &SubjectId) -> PledgeResult<()> {
        if lock(&self.failing).contains(id) {
            return Err(BuildError::failed(id, "scripted failure").into());
        }
        Ok(())
    }

    fn matching(&self, filters: &FilterSet) -> Vec<(SubjectId, RawData)> {
        lock(&self.rows)
            .iter()
            .filter(|(_, data)| filters.iter().all(|(field, value)| data.get(field) == Some(value)))
            .map(|(id, data)| (id.clone(), data.clone()))
            .collect()
    }
}

#[async_trait]
impl<V: ReadModelView> ReadModelBuilder for ScriptedBuilder<V> {
    type View = V;

    async fn build_one(&self, id: &SubjectId, _filters: &FilterSet) -> PledgeResult<Option<RawData>> {
        self.one_calls.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;
        Ok(lock(&self.rows).get(id).cloned())
    }

    async fn build_many(&self, ids: &[SubjectId], _filters: &FilterSet) -> PledgeResult<Vec<BuiltModel>> {
        self.many_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.batch_sizes).push(ids.len());
        for id in ids {
            self.check(id)?;
        }
        let rows = lock(&self.rows);
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|data| BuiltModel::new(id.clone(), data.clone())))
            .collect())
    }

    async fn build_count(&self, filters: &FilterSet) -> PledgeResult<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matching(filters).len() as u64)
    }

    async fn build_page(&self, filters: &FilterSet, limit: u64, offset: u64) -> PledgeResult<Vec<BuiltModel>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let page: Vec<(SubjectId, RawData)> = self
            .matching(filters)
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        for (id, _) in &page {
            self.check(id)?;
        }
        Ok(page
            .into_iter()
            .map(|(id, data)| BuiltModel::new(id, data))
            .collect())
    }
}

// ============================================================================
// FAILING STORE
// ============================================================================

/// In-memory store whose reads, writes and invalidations can be switched to
/// fail independently.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: InMemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_invalidation: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails everything.
    pub fn broken() -> Self {
        let store = Self::new();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        store.set_fail_invalidation(true);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_invalidation(&self, fail: bool) {
        self.fail_invalidation.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store, bypassing failure injection.
    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    fn guard(&self, flag: &AtomicBool, op: &str) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("failing", format!("scripted {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    fn driver(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.guard(&self.fail_reads, "read")?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration, tags: &[String]) -> CacheResult<()> {
        self.guard(&self.fail_writes, "write")?;
        self.inner.put(key, payload, ttl, tags).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.guard(&self.fail_writes, "delete")?;
        self.inner.delete(key).await
    }

    async fn invalidate_tags(&self, tags: &[String]) -> CacheResult<u64> {
        self.guard(&self.fail_invalidation, "invalidation")?;
        self.inner.invalidate_tags(tags).await
    }

    async fn entry_info(&self, key: &str) -> CacheResult<Option<EntryInfo>> {
        self.guard(&self.fail_reads, "read")?;
        self.inner.entry_info(key).await
    }

    async fn purge_expired(&self) -> CacheResult<u64> {
        self.guard(&self.fail_writes, "purge")?;
        self.inner.purge_expired().await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.guard(&self.fail_reads, "stats")?;
        self.inner.stats().await
    }
}

// ============================================================================
// POPULATION
// ============================================================================

/// Fixed warming population that counts calls and can be made to fail.
#[derive(Debug, Default)]
pub struct CountingPopulation {
    ids: Vec<SubjectId>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingPopulation {
    pub fn new(ids: impl IntoIterator<Item = impl Into<SubjectId>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WarmingPopulation for CountingPopulation {
    async fn top_ids(&self, limit: usize) -> PledgeResult<Vec<SubjectId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BuildError::failed("population", "scripted failure").into());
        }
        Ok(self.ids.iter().take(limit).cloned().collect())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for PLEDGE types.

    use super::*;
    use proptest::prelude::*;

    /// Numeric ids (including the summary sentinel), slugs, and named ids
    /// that look numeric or contain key punctuation.
    pub fn arb_subject_id() -> impl Strategy<Value = SubjectId> {
        prop_oneof![
            (0u64..10_000).prop_map(SubjectId::from),
            "[a-z][a-z0-9-]{0,11}".prop_map(SubjectId::from),
            "[0-9]{1,4}".prop_map(SubjectId::from),
            "[@:%a-z0-9]{1,8}".prop_map(SubjectId::from),
        ]
    }

    /// Scalar filter values.
    pub fn arb_filter_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    }

    pub fn arb_filter_set() -> impl Strategy<Value = FilterSet> {
        prop::collection::btree_map("[a-z_]{1,8}", arb_filter_value(), 0..5)
            .prop_map(|entries| entries.into_iter().collect())
    }

    /// Entity tags such as `organization:12`.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        ("(organization|campaign|user|campaign_type)", 1u32..500)
            .prop_map(|(kind, id)| format!("{}:{}", kind, id))
    }

    pub fn arb_tier() -> impl Strategy<Value = TtlTier> {
        prop_oneof![
            Just(TtlTier::Short),
            Just(TtlTier::Medium),
            Just(TtlTier::Long),
            Just(TtlTier::Daily),
            Just(TtlTier::Weekly),
            (1u64..86_400).prop_map(TtlTier::Custom),
        ]
    }

    /// Tier tables that pass validation.
    pub fn arb_tier_config() -> impl Strategy<Value = TierConfig> {
        (1u64..600, 1u64..3_600, 1u64..7_200, 1u64..86_400, 1u64..604_800).prop_map(
            |(short, medium, long, daily, weekly)| TierConfig {
                short,
                medium,
                long,
                daily,
                weekly,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and wiring for common scenarios.

    use super::*;
    use serde_json::json;

    /// Tier table with short = 300s and medium = 1800s.
    pub fn short_medium_tiers() -> TierConfig {
        TierConfig {
            short: 300,
            medium: 1800,
            ..TierConfig::default()
        }
    }

    /// A tiered cache over a fresh in-memory store.
    pub fn memory_cache() -> TieredCache<InMemoryCacheStore> {
        TieredCache::with_defaults(Arc::new(InMemoryCacheStore::new()))
    }

    /// Repository over a fresh in-memory store.
    pub fn memory_repository<V: ReadModelView>(
        builder: ScriptedBuilder<V>,
    ) -> ReadModelRepository<InMemoryCacheStore, ScriptedBuilder<V>> {
        ReadModelRepository::with_defaults(memory_cache(), Arc::new(builder))
    }

    pub fn organization_row(name: &str, raised: f64, goal: f64) -> Value {
        json!({
            "name": name,
            "active_campaigns": 2,
            "total_campaigns": 3,
            "total_raised": raised,
            "total_goal": goal,
            "donor_count": 17,
            "recent_donations": [
                {"donor": "anonymous", "amount": 25.0},
                {"donor": "j.doe", "amount": 100.0}
            ]
        })
    }

    pub fn campaign_row(organization_id: u64, owner_id: u64, campaign_type: &str) -> Value {
        json!({
            "title": "Clean Water",
            "organization_id": organization_id,
            "owner_id": owner_id,
            "campaign_type": campaign_type,
            "raised": 2500.0,
            "goal": 10000.0,
            "donor_count": 40,
            "donation_count": 50,
            "daily": [
                {"label": "2024-05-01", "value": 1000.0},
                {"label": "2024-05-02", "value": 1500.0}
            ]
        })
    }

    pub fn permissions_row(organizations: &[u64], permissions: &[&str]) -> Value {
        let memberships: Vec<Value> = organizations
            .iter()
            .map(|org| json!({"organization_id": org, "role": "member"}))
            .collect();
        json!({
            "roles": ["member"],
            "permissions": permissions,
            "memberships": memberships
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on PLEDGE error variants.

    use super::*;

    #[track_caller]
    pub fn assert_build_error<T: std::fmt::Debug>(result: &PledgeResult<T>) {
        match result {
            Err(PledgeError::Build(_)) => {}
            other => panic!("Expected Build error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalidation_error<T: std::fmt::Debug>(result: &PledgeResult<T>) {
        match result {
            Err(PledgeError::Invalidation(_)) => {}
            other => panic!("Expected Invalidation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &PledgeResult<T>) {
        match result {
            Err(PledgeError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }
}
