pub mod influence;
pub mod migrate;
pub mod org_dedup;
pub mod pg;
pub mod relations;
pub mod repair;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use influence::{compute_topic_ranks, InfluenceBreakdown, InfluenceScorer, MetricsAggregator};
pub use migrate::run_migrations;
pub use org_dedup::{DedupReport, MergeReport, OrganizationDeduplicator};
pub use pg::PgStore;
pub use relations::{Contradiction, RelationGraph};
pub use repair::{GroundTruth, RelationRepairer, RepairReport, ReversalReport};
pub use store::{
    ContentRepository, EntityRepository, OrgMergePlan, OrganizationRepository, PersonIngestPlan,
    RelationChanges, RelationRepository,
};
