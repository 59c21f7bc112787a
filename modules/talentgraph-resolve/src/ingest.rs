//! Ingestion: people from the knowledge graph, relations from extraction
//! sources.
//!
//! Person ingestion per name: search, take the top hit, fetch the record,
//! run the matcher, then either merge aliases into the existing person or
//! create the person with localized names, organizations, affiliations and
//! official links. Everything a name adds goes to the store as one
//! `PersonIngestPlan`, so a failure leaves nothing half-written. Affiliations
//! and links are only added when missing, so a rerun fills gaps instead of
//! duplicating.
//!
//! Relation ingestion normalizes every edge to the canonical direction at the
//! boundary: a source declares its native direction and inverted sources have
//! their endpoints swapped before insert.

use std::sync::Arc;

use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use talentgraph_common::config::IngestConfig;
use talentgraph_common::types::{
    normalize_name, AffiliationFact, ContentItem, ExternalId, OrgType, Organization, Person,
    RelationEdge, RelationType,
};
use talentgraph_common::{LinkType, TalentGraphError};
use talentgraph_graph::{
    ContentRepository, EntityRepository, OrganizationRepository, PersonIngestPlan, RelationGraph,
};

use crate::jobs::JobSummary;
use crate::knowledge::{EntityRecord, KnowledgeSource, OrganizationRef};
use crate::matcher::{resolve, Candidate, EntityMatcher, EntityView, MatchOutcome};
use crate::pacing::Pacer;
use crate::translate::{check_batch_len, Translator};

/// Role recorded for `educated at` organizations.
const STUDENT_ROLE: &str = "student";

// ---------------------------------------------------------------------------
// People
// ---------------------------------------------------------------------------

#[derive(Clone, TypedBuilder)]
pub struct IngestDeps {
    pub people: Arc<dyn EntityRepository>,
    pub orgs: Arc<dyn OrganizationRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub translator: Arc<dyn Translator>,
    pub pacer: Arc<Pacer>,
    #[builder(default)]
    pub config: IngestConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created {
        person_id: Uuid,
        affiliations: usize,
        links: usize,
    },
    Updated {
        person_id: Uuid,
        aliases_added: usize,
        affiliations: usize,
    },
    /// The external id is already held by a differently-named person.
    Conflict(String),
}

pub struct PersonIngestor {
    deps: IngestDeps,
    matcher: EntityMatcher,
}

impl PersonIngestor {
    pub fn new(deps: IngestDeps) -> Self {
        let matcher = EntityMatcher::new(deps.people.clone(), deps.orgs.clone());
        Self { deps, matcher }
    }

    /// Ingest every name in order. One bad name never stops the batch.
    pub async fn run(&self, names: &[String]) -> JobSummary {
        let mut summary = JobSummary::new("ingest-people", names.len());

        for (i, name) in names.iter().enumerate() {
            match self.ingest_one(name).await {
                Ok(IngestOutcome::Conflict(reason)) => {
                    error!(
                        name = name.as_str(),
                        reason = reason.as_str(),
                        "Identifier conflict, needs manual resolution"
                    );
                    summary.flag(name.as_str(), reason);
                }
                Ok(outcome) => {
                    info!(name = name.as_str(), ?outcome, "Ingested person");
                    summary.processed();
                }
                Err(e) => summary.skip(name.as_str(), e),
            }
            info!("processed {} of {}", i + 1, names.len());
        }

        summary.log();
        summary
    }

    pub async fn ingest_one(&self, name: &str) -> Result<IngestOutcome, TalentGraphError> {
        let d = &self.deps;
        let limit = d.config.search_limit;

        let hits = d
            .pacer
            .call("search", || d.knowledge.search(name, limit))
            .await?;
        let Some(top) = hits.into_iter().next() else {
            return Err(TalentGraphError::NotFound(format!("no search results for {name}")));
        };

        let record = d
            .pacer
            .call("get_entity", || d.knowledge.get_entity(&top.external_id))
            .await?;

        let mut aliases = record.aliases.clone();
        if normalize_name(name) != normalize_name(&record.label) {
            aliases.push(name.to_string());
        }
        let candidate = Candidate::new(record.label.clone())
            .with_aliases(aliases)
            .with_external_id(top.external_id.clone());

        match self.matcher.match_person(&candidate).await? {
            MatchOutcome::Existing { id, .. } => {
                let existing = d
                    .people
                    .get_person(id)
                    .await?
                    .ok_or_else(|| TalentGraphError::NotFound(format!("person {id}")))?;
                let plan = self.plan_record(id, &record).await?;

                if existing.external_id.is_none() {
                    let attached = d
                        .people
                        .set_external_id(id, &top.external_id)
                        .await
                        .map_err(TalentGraphError::from_store);
                    match attached {
                        Ok(()) => {}
                        Err(e @ TalentGraphError::IdentifierConflict { .. }) => {
                            return Ok(IngestOutcome::Conflict(e.to_string()))
                        }
                        Err(e) => return Err(e),
                    }
                }

                let mut names = candidate.aliases.clone();
                names.push(candidate.name.clone());
                let aliases_added = d.people.add_aliases(id, &names).await?;
                if !plan.is_empty() {
                    d.people.apply_ingest(&plan).await?;
                }
                Ok(IngestOutcome::Updated {
                    person_id: id,
                    aliases_added,
                    affiliations: plan.affiliations.len(),
                })
            }
            conflict @ MatchOutcome::Conflict { .. } => Ok(IngestOutcome::Conflict(
                conflict
                    .into_conflict_error(&candidate.name)
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            )),
            MatchOutcome::CreateNew => self.create(&candidate, top.external_id, &record).await,
        }
    }

    async fn create(
        &self,
        candidate: &Candidate,
        external_id: ExternalId,
        record: &EntityRecord,
    ) -> Result<IngestOutcome, TalentGraphError> {
        let d = &self.deps;
        let localized = d
            .pacer
            .call("translate", || d.translator.translate(&candidate.name))
            .await?;

        let mut person = Person::new(candidate.name.clone())
            .with_external_id(external_id)
            .with_aliases(candidate.aliases.iter().cloned());
        if normalize_name(&localized) != normalize_name(&person.name) {
            person.localized_name = Some(localized);
        }
        let person_id = person.id;

        let mut plan = self.plan_record(person_id, record).await?;
        plan.person = Some(person);

        // A racing writer may have taken the id since the match.
        let applied = d
            .people
            .apply_ingest(&plan)
            .await
            .map_err(TalentGraphError::from_store);
        match applied {
            Ok(()) => Ok(IngestOutcome::Created {
                person_id,
                affiliations: plan.affiliations.len(),
                links: plan.content.len(),
            }),
            Err(e @ TalentGraphError::IdentifierConflict { .. }) => {
                Ok(IngestOutcome::Conflict(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Organizations, affiliations and official links from `record` that
    /// `person_id` does not hold yet. Nothing is written.
    async fn plan_record(
        &self,
        person_id: Uuid,
        record: &EntityRecord,
    ) -> Result<PersonIngestPlan, TalentGraphError> {
        let d = &self.deps;
        let mut plan = PersonIngestPlan::default();

        let employer_role = record
            .occupations
            .first()
            .cloned()
            .unwrap_or_else(|| d.config.default_role.clone());
        let roles: Vec<String> = record
            .organizations
            .iter()
            .map(|org| match org.org_type {
                OrgType::University => STUDENT_ROLE.to_string(),
                _ => employer_role.clone(),
            })
            .collect();
        let localized_roles = if roles.is_empty() {
            Vec::new()
        } else {
            let out = d
                .pacer
                .call("translate_batch", || d.translator.translate_batch(&roles))
                .await?;
            check_batch_len(roles.len(), out.len())?;
            out
        };

        let mut known = d.orgs.list_organizations().await?;
        let existing = d.orgs.list_affiliations().await?;
        let mut held: Vec<_> = existing
            .iter()
            .filter(|a| a.person_id == person_id)
            .map(|a| (a.organization_id, a.identity_key()))
            .collect();

        for (org_ref, role) in record.organizations.iter().zip(localized_roles) {
            let org_id = match self.resolve_organization(org_ref, &known).await {
                Ok(OrgResolution::Known(id)) => id,
                Ok(OrgResolution::New(org)) => {
                    let id = org.id;
                    info!(organization = org.name.as_str(), %id, "Planned new organization");
                    known.push(org.clone());
                    plan.organizations.push(org);
                    id
                }
                Err(e) => {
                    warn!(
                        organization = org_ref.label.as_str(),
                        error = %e,
                        "Skipping organization"
                    );
                    continue;
                }
            };
            let fact = AffiliationFact::new(person_id, org_id, role)
                .between(org_ref.start_date, org_ref.end_date);
            let key = (org_id, fact.identity_key());
            if held.contains(&key) {
                continue;
            }
            held.push(key);
            plan.affiliations.push(fact);
        }

        let known_urls: Vec<String> = d
            .content
            .list_content()
            .await?
            .into_iter()
            .filter(|c| c.person_id == person_id)
            .map(|c| c.link.url().to_string())
            .collect();
        for url in &record.official_links {
            let planned = plan.content.iter().any(|c| c.link.url() == url.as_str());
            if planned || known_urls.iter().any(|u| u == url) {
                continue;
            }
            let mut item = ContentItem::new(person_id, LinkType::Official { url: url.clone() });
            item.first_party = true;
            item.summary = record.description.clone().unwrap_or_default();
            plan.content.push(item);
        }

        Ok(plan)
    }

    /// Match `org_ref` against `known` organizations, or build a new one. An
    /// identifier held by a differently-named organization is not reused:
    /// the organization goes under its placeholder id, and a placeholder
    /// minted by an earlier run is found again rather than minted twice.
    async fn resolve_organization(
        &self,
        org_ref: &OrganizationRef,
        known: &[Organization],
    ) -> Result<OrgResolution, TalentGraphError> {
        let d = &self.deps;
        let candidate = Candidate::new(org_ref.label.clone())
            .with_external_id(org_ref.external_id.clone());
        let views: Vec<EntityView<'_>> = known.iter().map(EntityView::from).collect();

        let external_id = match resolve(&candidate, &views) {
            MatchOutcome::Existing { id, .. } => return Ok(OrgResolution::Known(id)),
            MatchOutcome::Conflict {
                external_id,
                existing_name,
                ..
            } => {
                let placeholder = ExternalId::synthesize(&org_ref.label);
                if let Some(id) = placeholder_holder(known, &placeholder, &org_ref.label) {
                    return Ok(OrgResolution::Known(id));
                }
                error!(
                    organization = org_ref.label.as_str(),
                    external_id = %external_id,
                    existing = existing_name.as_str(),
                    "Organization identifier conflict, minting placeholder"
                );
                placeholder
            }
            MatchOutcome::CreateNew => org_ref.external_id.clone(),
        };

        let localized = d
            .pacer
            .call("translate", || d.translator.translate(&org_ref.label))
            .await?;
        let mut org = Organization::new(org_ref.label.clone(), org_ref.org_type)
            .with_external_id(external_id);
        if normalize_name(&localized) != normalize_name(&org.name) {
            org.localized_name = Some(localized);
        }
        Ok(OrgResolution::New(org))
    }
}

enum OrgResolution {
    Known(Uuid),
    New(Organization),
}

/// The organization standing in for a conflicted identifier: the one holding
/// `placeholder`, else one with exactly `label` as its name and no canonical id.
fn placeholder_holder(
    known: &[Organization],
    placeholder: &ExternalId,
    label: &str,
) -> Option<Uuid> {
    let key = normalize_name(label);
    known
        .iter()
        .find(|o| o.external_id.as_ref() == Some(placeholder))
        .or_else(|| {
            known.iter().find(|o| {
                normalize_name(&o.name) == key
                    && !o.external_id.as_ref().is_some_and(ExternalId::is_well_formed)
            })
        })
        .map(|o| o.id)
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Which side of an edge a source calls "self".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDirection {
    /// `(A, B, type)` means B is A's `type`.
    Canonical,
    /// `(A, B, type)` means A is B's `type`.
    Inverted,
}

/// A relation extraction source: its provenance tag and native direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSource {
    pub provenance: String,
    pub direction: SourceDirection,
}

impl RelationSource {
    pub fn new(provenance: impl Into<String>, direction: SourceDirection) -> Self {
        Self {
            provenance: provenance.into(),
            direction,
        }
    }
}

/// An edge as a source reports it, in the source's own direction.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationCandidate {
    pub from: Uuid,
    pub to: Uuid,
    pub relation: RelationType,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    /// Already present; a successful no-op.
    Duplicate,
}

pub struct RelationIngestor {
    graph: RelationGraph,
}

impl RelationIngestor {
    pub fn new(graph: RelationGraph) -> Self {
        Self { graph }
    }

    /// Build the canonical edge for a candidate from `source`.
    pub fn normalize(source: &RelationSource, candidate: &RelationCandidate) -> RelationEdge {
        let (from, to) = match source.direction {
            SourceDirection::Canonical => (candidate.from, candidate.to),
            SourceDirection::Inverted => (candidate.to, candidate.from),
        };
        RelationEdge::new(from, to, candidate.relation, source.provenance.clone())
            .with_description(candidate.description.clone())
            .with_confidence(candidate.confidence)
    }

    pub async fn insert(
        &self,
        source: &RelationSource,
        candidate: &RelationCandidate,
    ) -> Result<InsertOutcome, TalentGraphError> {
        let edge = Self::normalize(source, candidate);

        // Symmetric types are stored once per pair.
        if !edge.relation.is_antisymmetric()
            && self
                .graph
                .exists(edge.target_id, edge.source_id, edge.relation)
                .await?
        {
            return Ok(InsertOutcome::Duplicate);
        }

        match self.graph.insert(&edge).await {
            Ok(id) => Ok(InsertOutcome::Inserted(id)),
            Err(TalentGraphError::DuplicateEdge { .. }) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    pub async fn ingest(
        &self,
        source: &RelationSource,
        candidates: &[RelationCandidate],
    ) -> JobSummary {
        let mut summary =
            JobSummary::new(format!("relations:{}", source.provenance), candidates.len());
        let mut inserted = 0;

        for candidate in candidates {
            match self.insert(source, candidate).await {
                Ok(InsertOutcome::Inserted(_)) => {
                    inserted += 1;
                    summary.processed();
                }
                Ok(InsertOutcome::Duplicate) => summary.processed(),
                Err(e) => summary.skip(
                    format!("{} -[{}]-> {}", candidate.from, candidate.relation, candidate.to),
                    e,
                ),
            }
        }

        info!(provenance = source.provenance.as_str(), inserted, "Relation ingestion complete");
        summary.log();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockKnowledge, MockTranslator};
    use chrono::NaiveDate;
    use talentgraph_graph::testing::MemoryStore;

    fn deps(store: &Arc<MemoryStore>, knowledge: MockKnowledge) -> IngestDeps {
        IngestDeps::builder()
            .people(store.clone())
            .orgs(store.clone())
            .content(store.clone())
            .knowledge(Arc::new(knowledge))
            .translator(Arc::new(MockTranslator::suffix("-zh")))
            .pacer(Arc::new(Pacer::unpaced()))
            .build()
    }

    fn hinton() -> EntityRecord {
        EntityRecord {
            external_id: Some(ExternalId::new("Q92894")),
            label: "Geoffrey Hinton".to_string(),
            description: Some("computer scientist".to_string()),
            aliases: vec!["Geoff Hinton".to_string()],
            image_url: None,
            occupations: vec!["computer scientist".to_string()],
            organizations: vec![
                OrganizationRef {
                    external_id: ExternalId::new("Q95"),
                    label: "Google".to_string(),
                    org_type: OrgType::Company,
                    start_date: NaiveDate::from_ymd_opt(2013, 3, 1),
                    end_date: NaiveDate::from_ymd_opt(2023, 5, 1),
                },
                OrganizationRef {
                    external_id: ExternalId::new("Q180865"),
                    label: "University of Toronto".to_string(),
                    org_type: OrgType::University,
                    start_date: None,
                    end_date: None,
                },
            ],
            official_links: vec!["https://www.cs.toronto.edu/~hinton/".to_string()],
        }
    }

    #[tokio::test]
    async fn creates_person_with_affiliations_and_links() {
        let store = Arc::new(MemoryStore::new());
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        let summary = ingestor.run(&["geoff hinton".to_string()]).await;

        assert_eq!(summary.processed, 1);
        let people = store.people();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Geoffrey Hinton");
        assert_eq!(people[0].localized_name.as_deref(), Some("Geoffrey Hinton-zh"));
        assert_eq!(people[0].external_id, Some(ExternalId::new("Q92894")));

        assert_eq!(store.organizations().len(), 2);
        let roles: Vec<String> = store.affiliations().into_iter().map(|a| a.role).collect();
        assert!(roles.contains(&"computer scientist-zh".to_string()));
        assert!(roles.contains(&"student-zh".to_string()));

        let content = store.content();
        assert_eq!(content.len(), 1);
        assert!(content[0].first_party);
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        ingestor.run(&["Geoffrey Hinton".to_string()]).await;
        let second = ingestor.ingest_one("Geoffrey Hinton").await.unwrap();

        assert!(matches!(
            second,
            IngestOutcome::Updated {
                aliases_added: 0,
                affiliations: 0,
                ..
            }
        ));
        assert_eq!(store.people().len(), 1);
        assert_eq!(store.organizations().len(), 2);
        assert_eq!(store.affiliations().len(), 2);
        assert_eq!(store.content().len(), 1);
    }

    #[tokio::test]
    async fn existing_organization_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let google = store.seed_organization(
            Organization::new("Google", OrgType::Company).with_external_id(ExternalId::new("Q95")),
        );
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        ingestor.ingest_one("Geoffrey Hinton").await.unwrap();

        assert_eq!(store.organizations().len(), 2);
        assert!(store.affiliations().iter().any(|a| a.organization_id == google));
    }

    #[tokio::test]
    async fn identifier_conflict_is_flagged_not_overwritten() {
        let store = Arc::new(MemoryStore::new());
        let other = store
            .seed_person(Person::new("Someone Else").with_external_id(ExternalId::new("Q92894")));
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        let summary = ingestor.run(&["Geoffrey Hinton".to_string()]).await;

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.flagged.len(), 1);
        let people = store.people();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].id, other);
        assert_eq!(people[0].name, "Someone Else");
    }

    #[tokio::test]
    async fn conflicting_organization_placeholder_is_reused_on_rerun() {
        let store = Arc::new(MemoryStore::new());
        let llc = store.seed_organization(
            Organization::new("Google LLC", OrgType::Company)
                .with_external_id(ExternalId::new("Q95")),
        );
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        for _ in 0..3 {
            ingestor.ingest_one("Geoffrey Hinton").await.unwrap();
        }

        let orgs = store.organizations();
        assert_eq!(orgs.len(), 3);
        let google: Vec<_> = orgs.iter().filter(|o| o.name == "Google").collect();
        assert_eq!(google.len(), 1);
        assert_eq!(google[0].external_id, Some(ExternalId::synthesize("Google")));
        assert_eq!(store.affiliations().len(), 2);
        assert!(store.affiliations().iter().all(|a| a.organization_id != llc));
    }

    #[tokio::test]
    async fn hand_entered_placeholder_name_is_reused_on_conflict() {
        let store = Arc::new(MemoryStore::new());
        store.seed_organization(
            Organization::new("Google LLC", OrgType::Company)
                .with_external_id(ExternalId::new("Q95")),
        );
        let manual = store.seed_organization(Organization::new("Google", OrgType::Company));
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        ingestor.ingest_one("Geoffrey Hinton").await.unwrap();

        assert_eq!(store.organizations().len(), 3);
        assert!(store.affiliations().iter().any(|a| a.organization_id == manual));
    }

    #[tokio::test]
    async fn matched_person_without_identifier_receives_it() {
        let store = Arc::new(MemoryStore::new());
        let seeded = store.seed_person(Person::new("Geoffrey Hinton"));
        let ingestor =
            PersonIngestor::new(deps(&store, MockKnowledge::new().with_record(hinton())));

        let outcome = ingestor.ingest_one("Geoffrey Hinton").await.unwrap();

        assert!(matches!(outcome, IngestOutcome::Updated { person_id, .. } if person_id == seeded));
        let people = store.people();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].external_id, Some(ExternalId::new("Q92894")));

        // The identifier now short-circuits matching on the next run.
        let again = ingestor.ingest_one("Geoff Hinton").await.unwrap();
        assert!(matches!(again, IngestOutcome::Updated { person_id, .. } if person_id == seeded));
        assert_eq!(store.people().len(), 1);
    }

    #[tokio::test]
    async fn failed_lookup_after_match_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let deps = IngestDeps::builder()
            .people(store.clone())
            .orgs(store.clone())
            .content(store.clone())
            .knowledge(Arc::new(MockKnowledge::new().with_record(hinton())))
            .translator(Arc::new(MockTranslator::suffix("-zh").failing_on("student")))
            .pacer(Arc::new(Pacer::unpaced()))
            .build();
        let ingestor = PersonIngestor::new(deps);

        let summary = ingestor.run(&["Geoffrey Hinton".to_string()]).await;

        assert_eq!(summary.skipped.len(), 1);
        assert!(store.people().is_empty());
        assert!(store.organizations().is_empty());
        assert!(store.affiliations().is_empty());
        assert!(store.content().is_empty());
    }

    #[tokio::test]
    async fn missing_and_failing_items_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let knowledge = MockKnowledge::new()
            .with_record(hinton())
            .failing_on("Broken Lookup");
        let ingestor = PersonIngestor::new(deps(&store, knowledge));

        let names = vec![
            "Nobody At All".to_string(),
            "Broken Lookup".to_string(),
            "Geoffrey Hinton".to_string(),
        ];
        let summary = ingestor.run(&names).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(store.people().len(), 1);
    }

    #[tokio::test]
    async fn inverted_source_is_normalized_before_insert() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = RelationIngestor::new(RelationGraph::new(store.clone()));
        let (advisor, student) = (Uuid::new_v4(), Uuid::new_v4());

        // This source writes (advisor, student): "A is B's advisor".
        let source = RelationSource::new("advisor-extractor", SourceDirection::Inverted);
        let candidate = RelationCandidate {
            from: advisor,
            to: student,
            relation: RelationType::Advisor,
            description: "PhD advisor".to_string(),
            confidence: 0.9,
        };
        let outcome = ingestor.insert(&source, &candidate).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        let edges = store.relations();
        assert_eq!((edges[0].source_id, edges[0].target_id), (student, advisor));
        assert_eq!(edges[0].provenance, "advisor-extractor");
    }

    #[tokio::test]
    async fn duplicates_are_successful_no_ops() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = RelationIngestor::new(RelationGraph::new(store.clone()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let canonical = RelationSource::new("news", SourceDirection::Canonical);
        let colleague = RelationCandidate {
            from: a,
            to: b,
            relation: RelationType::Colleague,
            description: String::new(),
            confidence: 0.7,
        };
        let reverse_colleague = RelationCandidate {
            from: b,
            to: a,
            ..colleague.clone()
        };

        let summary = ingestor
            .ingest(&canonical, &[colleague.clone(), colleague, reverse_colleague])
            .await;

        assert_eq!(summary.processed, 3);
        assert!(summary.skipped.is_empty());
        assert_eq!(store.relations().len(), 1);
    }
}
