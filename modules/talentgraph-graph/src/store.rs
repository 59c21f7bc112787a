// Repository interfaces injected into every engine component.
//
// Components never reach into the store directly. Each multi-row write is a
// single method that the implementation runs as one all-or-nothing unit:
// a crash mid-call leaves the store as if the call never happened.
//
// PgStore backs these with Postgres; MemoryStore (feature `test-utils`)
// backs them with an in-memory map for deterministic tests.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use talentgraph_common::types::{
    AffiliationFact, ContentItem, EdgeKey, ExternalId, InfluenceSignals, Organization, Person,
    PersonMetrics, RelationEdge,
};

// ---------------------------------------------------------------------------
// Unit-of-work payloads
// ---------------------------------------------------------------------------

/// Everything one organization merge changes, applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgMergePlan {
    pub survivor_id: Uuid,
    pub loser_ids: Vec<Uuid>,
    /// Affiliations re-pointed from a loser to the survivor.
    pub repoint_affiliations: Vec<Uuid>,
    /// Affiliations already present on the survivor; deleted instead of moved.
    pub drop_affiliations: Vec<Uuid>,
    pub repoint_content: Vec<Uuid>,
    /// Localized name adopted from a loser when the survivor has none.
    pub adopt_localized_name: Option<String>,
}

/// One person's ingestion: the person when new, the organizations created
/// for them, and the affiliations and links attached. Applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonIngestPlan {
    pub person: Option<Person>,
    pub organizations: Vec<Organization>,
    pub affiliations: Vec<AffiliationFact>,
    pub content: Vec<ContentItem>,
}

impl PersonIngestPlan {
    pub fn is_empty(&self) -> bool {
        self.person.is_none()
            && self.organizations.is_empty()
            && self.affiliations.is_empty()
            && self.content.is_empty()
    }
}

/// Edge reversals and deletions applied as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationChanges {
    pub reverse: Vec<Uuid>,
    pub delete: Vec<Uuid>,
    /// Recorded in the same unit so a one-time migration never runs twice.
    pub migration: Option<String>,
}

impl RelationChanges {
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty() && self.delete.is_empty() && self.migration.is_none()
    }
}

// ---------------------------------------------------------------------------
// EntityRepository: people
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn list_people(&self) -> Result<Vec<Person>>;

    async fn get_person(&self, id: Uuid) -> Result<Option<Person>>;

    async fn find_person_by_external_id(&self, external_id: &ExternalId) -> Result<Option<Person>>;

    /// Insert a new person. Fails with `TalentGraphError::IdentifierConflict`
    /// if the external id is already taken.
    async fn create_person(&self, person: &Person) -> Result<()>;

    /// Attach an external id to a person that has none. Fails with
    /// `TalentGraphError::IdentifierConflict` if another person holds it.
    async fn set_external_id(&self, id: Uuid, external_id: &ExternalId) -> Result<()>;

    /// Insert everything in the plan or nothing. A new person whose external
    /// id is taken fails with `TalentGraphError::IdentifierConflict`.
    async fn apply_ingest(&self, plan: &PersonIngestPlan) -> Result<()>;

    /// Append aliases not already present (case-insensitive). Returns how many were added.
    async fn add_aliases(&self, id: Uuid, aliases: &[String]) -> Result<usize>;

    async fn set_localized_name(&self, id: Uuid, localized_name: &str) -> Result<()>;

    /// Raw influence inputs. `content_items` is counted from the content store.
    async fn influence_signals(&self, id: Uuid) -> Result<InfluenceSignals>;

    async fn upsert_signals(&self, id: Uuid, signals: &InfluenceSignals) -> Result<()>;

    /// Write scores and topic ranks for every listed person in one unit.
    async fn save_metrics(&self, metrics: &[PersonMetrics]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// OrganizationRepository: organizations and affiliations
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    async fn create_organization(&self, org: &Organization) -> Result<()>;

    async fn list_affiliations(&self) -> Result<Vec<AffiliationFact>>;

    async fn add_affiliation(&self, fact: &AffiliationFact) -> Result<()>;

    /// Apply one merge: re-point, drop duplicates, delete losers. All or nothing.
    async fn apply_merge(&self, plan: &OrgMergePlan) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RelationRepository: person-to-person edges
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RelationRepository: Send + Sync {
    async fn list_relations(&self) -> Result<Vec<RelationEdge>>;

    async fn get_relation(&self, id: Uuid) -> Result<Option<RelationEdge>>;

    /// First edge with this `(source, target, type)`, if any.
    async fn find_relation(&self, key: &EdgeKey) -> Result<Option<RelationEdge>>;

    /// Unconditional insert. Duplicate checks belong to `RelationGraph`.
    async fn insert_relation(&self, edge: &RelationEdge) -> Result<()>;

    /// Apply reversals and deletions in one unit.
    async fn apply_changes(&self, changes: &RelationChanges) -> Result<()>;

    async fn migration_applied(&self, name: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// ContentRepository: links and content items
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn list_content(&self) -> Result<Vec<ContentItem>>;

    async fn add_content(&self, item: &ContentItem) -> Result<()>;

    /// Delete the listed items in one unit. Returns how many existed.
    async fn delete_content(&self, ids: &[Uuid]) -> Result<usize>;
}
