//! User permission sets.

use pledge_core::{entity_tag, SubjectId, TagSet, TtlTier};
use serde_json::Value;

use super::subject_from;
use crate::model::{RawData, ReadModel};
use crate::view::ReadModelView;

/// Effective roles and permissions of one user.
///
/// Tagged with every organization the user belongs to, so a membership
/// change in any of them drops the cached set.
#[derive(Debug, Clone, PartialEq)]
pub struct UserPermissions {
    model: ReadModel,
}

fn membership_orgs(data: &RawData) -> impl Iterator<Item = SubjectId> + '_ {
    data.get("memberships")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|m| m.get("organization_id").and_then(subject_from))
}

impl ReadModelView for UserPermissions {
    const CACHE_PREFIX: &'static str = "user_permissions";
    const COLLECTION_TAG: &'static str = "permissions";
    const TTL_TIER: TtlTier = TtlTier::Long;

    fn subject_tags(id: &SubjectId, data: &RawData) -> TagSet {
        let mut tags = TagSet::new().with(entity_tag("user", id));
        tags.extend(membership_orgs(data).map(|org| entity_tag("organization", org)));
        tags
    }

    fn from_model(model: ReadModel) -> Self {
        Self { model }
    }

    fn model(&self) -> &ReadModel {
        &self.model
    }
}

impl UserPermissions {
    pub fn user_id(&self) -> &SubjectId {
        self.model.id()
    }

    fn strings(&self, field: &str) -> Vec<&str> {
        self.model
            .get_array(field)
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    pub fn roles(&self) -> Vec<&str> {
        self.strings("roles")
    }

    pub fn permissions(&self) -> Vec<&str> {
        self.strings("permissions")
    }

    /// Returns true if the user holds `permission`.
    pub fn can(&self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().contains(&role)
    }

    /// Organizations the user is a member of.
    pub fn organizations(&self) -> Vec<SubjectId> {
        membership_orgs(self.model.data()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn permissions(value: Value) -> UserPermissions {
        let Value::Object(data) = value else {
            panic!("object expected");
        };
        let id = SubjectId::from(7u64);
        let tags = UserPermissions::cache_tags(&id, &data);
        UserPermissions::from_model(ReadModel::new(id, data).with_tags(tags))
    }

    #[test]
    fn test_can_and_roles() {
        let view = permissions(json!({
            "roles": ["campaign_manager"],
            "permissions": ["campaign.create", "campaign.edit"],
            "memberships": [
                {"organization_id": 3, "role": "admin"},
                {"organization_id": 5, "role": "member"}
            ]
        }));

        assert!(view.can("campaign.edit"));
        assert!(!view.can("organization.delete"));
        assert!(view.has_role("campaign_manager"));
        assert_eq!(view.organizations(), vec![SubjectId::from(3u64), SubjectId::from(5u64)]);
    }

    #[test]
    fn test_tags_per_membership() {
        let view = permissions(json!({
            "memberships": [{"organization_id": 3}, {"organization_id": 5}, {"role": "orphan"}]
        }));
        let tags = view.model().tags();
        assert!(tags.contains("user:7"));
        assert!(tags.contains("organization:3"));
        assert!(tags.contains("organization:5"));
        assert!(tags.contains("permissions"));
        assert_eq!(tags.len(), 6);
    }

    #[test]
    fn test_no_memberships() {
        let view = permissions(json!({}));
        assert!(view.organizations().is_empty());
        assert!(!view.can("anything"));
    }
}
