//! Relation inference from shared affiliations.
//!
//! Two people holding affiliations with the same organization over
//! overlapping periods become a candidate edge: `cofounder` when both roles
//! mention founding, `colleague` otherwise. Missing dates are open-ended.
//! Candidates go through the normal ingestion path, so reruns are no-ops.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use talentgraph_common::config::InferenceConfig;
use talentgraph_common::types::{AffiliationFact, RelationType};
use talentgraph_common::TalentGraphError;
use talentgraph_graph::OrganizationRepository;

use crate::ingest::{RelationCandidate, RelationIngestor, RelationSource, SourceDirection};
use crate::jobs::JobSummary;

pub const INFERENCE_PROVENANCE: &str = "affiliation-inference";

const FOUNDER_MARKERS: &[&str] = &["found", "创始", "創始"];

fn is_founder_role(role: &str) -> bool {
    let role = role.to_lowercase();
    FOUNDER_MARKERS.iter().any(|m| role.contains(m))
}

fn periods_overlap(a: &AffiliationFact, b: &AffiliationFact) -> bool {
    let starts_before_end = |start: Option<NaiveDate>, end: Option<NaiveDate>| match (start, end) {
        (Some(s), Some(e)) => s <= e,
        _ => true,
    };
    starts_before_end(a.start_date, b.end_date) && starts_before_end(b.start_date, a.end_date)
}

/// Candidate edges implied by `affiliations`, one per unordered pair of
/// people. A pair that co-founded anywhere is reported as `cofounder`.
pub fn infer_candidates(
    affiliations: &[AffiliationFact],
    org_names: &HashMap<Uuid, String>,
    config: &InferenceConfig,
) -> Vec<RelationCandidate> {
    let mut by_org: BTreeMap<Uuid, Vec<&AffiliationFact>> = BTreeMap::new();
    for fact in affiliations {
        by_org.entry(fact.organization_id).or_default().push(fact);
    }

    let mut pairs: BTreeMap<(Uuid, Uuid), RelationCandidate> = BTreeMap::new();
    for (org_id, facts) in &by_org {
        let org = org_names.get(org_id).map(String::as_str).unwrap_or("a shared organization");
        for (i, a) in facts.iter().enumerate() {
            for b in &facts[i + 1..] {
                if a.person_id == b.person_id || !periods_overlap(a, b) {
                    continue;
                }
                let (from, to) = if a.person_id < b.person_id {
                    (a.person_id, b.person_id)
                } else {
                    (b.person_id, a.person_id)
                };
                let founders = is_founder_role(&a.role) && is_founder_role(&b.role);
                let candidate = if founders {
                    RelationCandidate {
                        from,
                        to,
                        relation: RelationType::Cofounder,
                        description: format!("Co-founded {org}"),
                        confidence: config.cofounder_confidence,
                    }
                } else {
                    RelationCandidate {
                        from,
                        to,
                        relation: RelationType::Colleague,
                        description: format!("Overlapping affiliation with {org}"),
                        confidence: config.colleague_confidence,
                    }
                };

                match pairs.get(&(from, to)) {
                    Some(existing) if existing.relation == RelationType::Cofounder => {}
                    Some(_) if candidate.relation != RelationType::Cofounder => {}
                    _ => {
                        pairs.insert((from, to), candidate);
                    }
                }
            }
        }
    }
    pairs.into_values().collect()
}

pub struct RelationInference {
    orgs: Arc<dyn OrganizationRepository>,
    ingestor: RelationIngestor,
    config: InferenceConfig,
}

impl RelationInference {
    pub fn new(
        orgs: Arc<dyn OrganizationRepository>,
        ingestor: RelationIngestor,
        config: InferenceConfig,
    ) -> Self {
        Self {
            orgs,
            ingestor,
            config,
        }
    }

    pub async fn run(&self) -> Result<JobSummary, TalentGraphError> {
        let affiliations = self.orgs.list_affiliations().await?;
        let org_names: HashMap<Uuid, String> = self
            .orgs
            .list_organizations()
            .await?
            .into_iter()
            .map(|o| (o.id, o.name))
            .collect();

        let candidates = infer_candidates(&affiliations, &org_names, &self.config);
        info!(
            affiliations = affiliations.len(),
            candidates = candidates.len(),
            "Inferred relation candidates"
        );

        let source = RelationSource::new(INFERENCE_PROVENANCE, SourceDirection::Canonical);
        Ok(self.ingestor.ingest(&source, &candidates).await)
    }
}
