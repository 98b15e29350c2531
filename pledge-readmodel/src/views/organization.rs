//! Organization dashboard.

use pledge_core::{entity_tag, SubjectId, TagSet, TtlTier};
use serde_json::Value;

use crate::model::{RawData, ReadModel};
use crate::view::ReadModelView;

/// Headline numbers for one organization's dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationDashboard {
    model: ReadModel,
}

impl ReadModelView for OrganizationDashboard {
    const CACHE_PREFIX: &'static str = "org_dashboard";
    const COLLECTION_TAG: &'static str = "organizations";
    const TTL_TIER: TtlTier = TtlTier::Medium;

    fn subject_tags(id: &SubjectId, _data: &RawData) -> TagSet {
        TagSet::new().with(entity_tag("organization", id))
    }

    fn from_model(model: ReadModel) -> Self {
        Self { model }
    }

    fn model(&self) -> &ReadModel {
        &self.model
    }
}

impl OrganizationDashboard {
    pub fn organization_id(&self) -> &SubjectId {
        self.model.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.model.get_str("name")
    }

    pub fn active_campaigns(&self) -> i64 {
        self.model.get_i64("active_campaigns").unwrap_or(0)
    }

    pub fn total_campaigns(&self) -> i64 {
        self.model.get_i64("total_campaigns").unwrap_or(0)
    }

    pub fn total_raised(&self) -> f64 {
        self.model.get_f64("total_raised").unwrap_or(0.0)
    }

    pub fn total_goal(&self) -> f64 {
        self.model.get_f64("total_goal").unwrap_or(0.0)
    }

    pub fn donor_count(&self) -> i64 {
        self.model.get_i64("donor_count").unwrap_or(0)
    }

    /// Raised vs. goal across all campaigns, in percent.
    pub fn goal_progress(&self) -> f64 {
        ReadModel::percentage(self.total_raised(), self.total_goal())
    }

    /// Share of campaigns currently active, in percent.
    pub fn active_ratio(&self) -> f64 {
        ReadModel::percentage(self.active_campaigns() as f64, self.total_campaigns() as f64)
    }

    pub fn recent_donations(&self) -> &[Value] {
        self.model.get_array("recent_donations")
    }
}
