//! Concrete read-model views.

pub mod campaign;
pub mod organization;
pub mod permissions;

pub use campaign::CampaignAnalytics;
pub use organization::OrganizationDashboard;
pub use permissions::UserPermissions;

use pledge_core::SubjectId;
use serde_json::Value;

/// Reads an entity reference from builder output (integer key or slug).
pub(crate) fn subject_from(value: &Value) -> Option<SubjectId> {
    match value {
        Value::Number(n) => n.as_u64().map(SubjectId::from),
        Value::String(s) if !s.is_empty() => Some(SubjectId::from(s.as_str())),
        _ => None,
    }
}
