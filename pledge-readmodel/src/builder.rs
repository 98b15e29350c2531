//! Builder hook trait.
//!
//! Builders perform the actual aggregation (SQL joins, statistics) for one
//! read-model type. The repository only decides when to call them.

use async_trait::async_trait;
use pledge_core::{FilterSet, PledgeResult, SubjectId};

use crate::model::RawData;
use crate::view::ReadModelView;

/// Builder output for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltModel {
    pub id: SubjectId,
    pub data: RawData,
}

impl BuiltModel {
    pub fn new(id: impl Into<SubjectId>, data: RawData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Builds raw data for a read-model type.
///
/// An absent subject is reported as `Ok(None)` (or, in batch calls, by
/// omitting it). Empty data is treated the same as absence.
#[async_trait]
pub trait ReadModelBuilder: Send + Sync {
    /// The typed view produced from this builder's output.
    type View: ReadModelView;

    /// Build data for one subject.
    async fn build_one(&self, id: &SubjectId, filters: &FilterSet) -> PledgeResult<Option<RawData>>;

    /// Build data for several subjects in one go.
    ///
    /// The default calls `build_one` per id. Builders backed by a store that
    /// can batch should override it.
    async fn build_many(
        &self,
        ids: &[SubjectId],
        filters: &FilterSet,
    ) -> PledgeResult<Vec<BuiltModel>> {
        let mut built = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = self.build_one(id, filters).await? {
                built.push(BuiltModel {
                    id: id.clone(),
                    data,
                });
            }
        }
        Ok(built)
    }

    /// Count the subjects matching `filters`.
    async fn build_count(&self, filters: &FilterSet) -> PledgeResult<u64>;

    /// Build one page of subjects matching `filters`, in a stable order.
    async fn build_page(
        &self,
        filters: &FilterSet,
        limit: u64,
        offset: u64,
    ) -> PledgeResult<Vec<BuiltModel>>;
}
