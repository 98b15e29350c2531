//! Campaign analytics.

use pledge_core::{entity_tag, SubjectId, TagSet, TtlTier};

use super::subject_from;
use crate::model::{round2, RawData, ReadModel};
use crate::view::ReadModelView;

/// Fundraising analytics for one campaign.
///
/// Cached under the short tier: donations land continuously and the numbers
/// are shown next to live progress bars.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignAnalytics {
    model: ReadModel,
}

impl ReadModelView for CampaignAnalytics {
    const CACHE_PREFIX: &'static str = "campaign_analytics";
    const COLLECTION_TAG: &'static str = "campaigns";
    const TTL_TIER: TtlTier = TtlTier::Short;

    fn subject_tags(id: &SubjectId, data: &RawData) -> TagSet {
        let mut tags = TagSet::new().with(entity_tag("campaign", id));
        if let Some(org) = data.get("organization_id").and_then(subject_from) {
            tags.insert(entity_tag("organization", org));
        }
        if let Some(owner) = data.get("owner_id").and_then(subject_from) {
            tags.insert(entity_tag("user", owner));
        }
        if let Some(kind) = data.get("campaign_type").and_then(|v| v.as_str()) {
            tags.insert(entity_tag("campaign_type", kind));
        }
        tags
    }

    fn from_model(model: ReadModel) -> Self {
        Self { model }
    }

    fn model(&self) -> &ReadModel {
        &self.model
    }
}

impl CampaignAnalytics {
    pub fn campaign_id(&self) -> &SubjectId {
        self.model.id()
    }

    pub fn organization_id(&self) -> Option<SubjectId> {
        self.model.get("organization_id").and_then(subject_from)
    }

    pub fn campaign_type(&self) -> Option<&str> {
        self.model.get_str("campaign_type")
    }

    pub fn raised(&self) -> f64 {
        self.model.get_f64("raised").unwrap_or(0.0)
    }

    pub fn goal(&self) -> f64 {
        self.model.get_f64("goal").unwrap_or(0.0)
    }

    pub fn progress(&self) -> f64 {
        ReadModel::percentage(self.raised(), self.goal())
    }

    pub fn donor_count(&self) -> i64 {
        self.model.get_i64("donor_count").unwrap_or(0)
    }

    pub fn donation_count(&self) -> i64 {
        self.model.get_i64("donation_count").unwrap_or(0)
    }

    /// Mean donation amount, 0 when nothing was donated yet.
    pub fn average_donation(&self) -> f64 {
        match self.donation_count() {
            n if n > 0 => round2(self.raised() / n as f64),
            _ => 0.0,
        }
    }

    /// Amount raised per day, oldest first as built.
    pub fn daily_breakdown(&self) -> Vec<(String, f64)> {
        self.model.breakdown("daily")
    }
}
