//! PLEDGE Read Models
//!
//! Cached, versioned aggregates (dashboards, analytics, permission sets)
//! built on demand by domain-supplied builders.
//!
//! - [`ReadModel`]: immutable snapshot of builder output with version and tags
//! - [`ReadModelView`]: typed accessors and cache settings per read-model type
//! - [`ReadModelBuilder`]: the aggregation hook a domain supplies
//! - [`ReadModelRepository`]: find / find_many / paginate / invalidate / warm
//! - [`CacheWarmer`]: warms a repository from a population of subjects

pub mod builder;
pub mod model;
pub mod repository;
pub mod view;
pub mod views;
pub mod warmer;

pub use builder::{BuiltModel, ReadModelBuilder};
pub use model::{ModelVersion, RawData, ReadModel};
pub use repository::{Page, ReadModelRepository};
pub use view::ReadModelView;
pub use views::{CampaignAnalytics, OrganizationDashboard, UserPermissions};
pub use warmer::{CacheWarmer, WarmReport, WarmingPopulation};
