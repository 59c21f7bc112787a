//! Organization deduplication.
//!
//! Organizations are grouped when they share a normalized name or an
//! external id (placeholders included). Each group of two or more collapses into one
//! survivor; affiliations and content items pointing at the losers are
//! re-pointed, identical affiliations are dropped, and the losers are deleted.
//! Every group is one unit of work: a failed group changes nothing and the
//! job moves on to the next.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use talentgraph_common::types::{normalize_name, AffiliationFact, ContentItem, Organization};
use talentgraph_common::TalentGraphError;

use crate::store::{ContentRepository, OrgMergePlan, OrganizationRepository};

/// Audit line for one merged group.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub survivor_id: Uuid,
    pub survivor_name: String,
    pub merged_ids: Vec<Uuid>,
    pub edges_moved: usize,
    pub duplicates_dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub groups: Vec<MergeReport>,
    /// Groups whose merge failed and was rolled back: (member ids, error).
    pub failed: Vec<(Vec<Uuid>, String)>,
}

pub struct OrganizationDeduplicator {
    orgs: Arc<dyn OrganizationRepository>,
    content: Arc<dyn ContentRepository>,
}

impl OrganizationDeduplicator {
    pub fn new(orgs: Arc<dyn OrganizationRepository>, content: Arc<dyn ContentRepository>) -> Self {
        Self { orgs, content }
    }

    pub async fn run(&self) -> Result<DedupReport, TalentGraphError> {
        let organizations = self.orgs.list_organizations().await?;
        let affiliations = self.orgs.list_affiliations().await?;
        let content = self.content.list_content().await?;

        let groups = group_duplicates(&organizations);
        info!(
            organizations = organizations.len(),
            groups = groups.len(),
            "Organization dedup scan complete"
        );

        let refs = reference_counts(&affiliations, &content);
        let mut report = DedupReport::default();

        for group in groups {
            let Some(survivor) = pick_survivor(&group, &refs) else {
                continue;
            };
            let plan = plan_merge(survivor, &group, &affiliations, &content);
            let member_ids: Vec<Uuid> = group.iter().map(|o| o.id).collect();

            match self.orgs.apply_merge(&plan).await {
                Ok(()) => {
                    let edges_moved = plan.repoint_affiliations.len() + plan.repoint_content.len();
                    info!(
                        survivor_id = %survivor.id,
                        survivor = survivor.name.as_str(),
                        merged = plan.loser_ids.len(),
                        edges_moved,
                        dropped = plan.drop_affiliations.len(),
                        "Merged duplicate organizations"
                    );
                    report.groups.push(MergeReport {
                        survivor_id: survivor.id,
                        survivor_name: survivor.name.clone(),
                        merged_ids: plan.loser_ids.clone(),
                        edges_moved,
                        duplicates_dropped: plan.drop_affiliations.len(),
                    });
                }
                Err(e) => {
                    warn!(
                        survivor_id = %survivor.id,
                        survivor = survivor.name.as_str(),
                        error = %e,
                        "Organization merge failed, group left unchanged"
                    );
                    report.failed.push((member_ids, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// Group organizations sharing a normalized name or any external id,
/// placeholders included. Only groups with two or more members are returned,
/// each sorted by creation.
pub fn group_duplicates(orgs: &[Organization]) -> Vec<Vec<Organization>> {
    let mut parent: Vec<usize> = (0..orgs.len()).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = i;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    let mut first_by_key: HashMap<String, usize> = HashMap::new();
    for (i, org) in orgs.iter().enumerate() {
        let mut keys = vec![format!("name:{}", normalize_name(&org.name))];
        if let Some(ext) = &org.external_id {
            keys.push(format!("id:{ext}"));
        }
        for key in keys {
            match first_by_key.get(&key) {
                Some(&j) => {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[ri] = rj;
                    }
                }
                None => {
                    first_by_key.insert(key, i);
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<Organization>> = HashMap::new();
    for (i, org) in orgs.iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(org.clone());
    }

    let mut out: Vec<Vec<Organization>> = groups.into_values().filter(|g| g.len() > 1).collect();
    for group in &mut out {
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }
    out.sort_by(|a, b| a[0].created_at.cmp(&b[0].created_at).then(a[0].id.cmp(&b[0].id)));
    out
}

/// Affiliations and content items pointing at each organization.
pub fn reference_counts(
    affiliations: &[AffiliationFact],
    content: &[ContentItem],
) -> HashMap<Uuid, usize> {
    let mut refs: HashMap<Uuid, usize> = HashMap::new();
    for fact in affiliations {
        *refs.entry(fact.organization_id).or_default() += 1;
    }
    for org_id in content.iter().filter_map(|c| c.organization_id) {
        *refs.entry(org_id).or_default() += 1;
    }
    refs
}

/// Survivor ranking, compared lexicographically in priority order:
/// identifier tier (well-formed > placeholder/other > none), reference count,
/// presence of a localized name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SurvivorScore {
    pub id_tier: u8,
    pub references: usize,
    pub has_localized_name: bool,
}

pub fn survivor_score(org: &Organization, refs: &HashMap<Uuid, usize>) -> SurvivorScore {
    let id_tier = match &org.external_id {
        Some(ext) if ext.is_well_formed() => 2,
        Some(_) => 1,
        None => 0,
    };
    SurvivorScore {
        id_tier,
        references: refs.get(&org.id).copied().unwrap_or(0),
        has_localized_name: org
            .localized_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty()),
    }
}

/// Highest score wins; full ties go to the earliest-created record.
pub fn pick_survivor<'a>(
    group: &'a [Organization],
    refs: &HashMap<Uuid, usize>,
) -> Option<&'a Organization> {
    group
        .iter()
        .max_by(|a, b| {
            survivor_score(a, refs)
                .cmp(&survivor_score(b, refs))
                .then_with(|| match b.created_at.cmp(&a.created_at) {
                    Ordering::Equal => b.id.cmp(&a.id),
                    other => other,
                })
        })
}

/// Build the unit of work that folds every other group member into `survivor`.
pub fn plan_merge(
    survivor: &Organization,
    group: &[Organization],
    affiliations: &[AffiliationFact],
    content: &[ContentItem],
) -> OrgMergePlan {
    let loser_ids: Vec<Uuid> = group
        .iter()
        .filter(|o| o.id != survivor.id)
        .map(|o| o.id)
        .collect();
    let losers: HashSet<Uuid> = loser_ids.iter().copied().collect();

    let mut seen: HashSet<_> = affiliations
        .iter()
        .filter(|a| a.organization_id == survivor.id)
        .map(AffiliationFact::identity_key)
        .collect();

    let mut plan = OrgMergePlan {
        survivor_id: survivor.id,
        loser_ids,
        ..Default::default()
    };

    for fact in affiliations.iter().filter(|a| losers.contains(&a.organization_id)) {
        if seen.insert(fact.identity_key()) {
            plan.repoint_affiliations.push(fact.id);
        } else {
            plan.drop_affiliations.push(fact.id);
        }
    }

    plan.repoint_content = content
        .iter()
        .filter(|c| c.organization_id.is_some_and(|id| losers.contains(&id)))
        .map(|c| c.id)
        .collect();

    if survivor.localized_name.is_none() {
        plan.adopt_localized_name = group
            .iter()
            .filter(|o| o.id != survivor.id)
            .find_map(|o| o.localized_name.clone());
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::{Duration, NaiveDate, Utc};
    use talentgraph_common::types::{ExternalId, OrgType};
    use talentgraph_common::LinkType;

    fn org(name: &str) -> Organization {
        Organization::new(name, OrgType::Company)
    }

    fn dedup(store: &Arc<MemoryStore>) -> OrganizationDeduplicator {
        OrganizationDeduplicator::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn well_formed_identifier_survives() {
        let store = Arc::new(MemoryStore::new());
        let placeholder = org("OpenAI").with_external_id(ExternalId::synthesize("OpenAI"));
        let canonical = org("openai ").with_external_id(ExternalId::new("Q1"));
        store.seed_organization(placeholder);
        let keep = store.seed_organization(canonical);

        let report = dedup(&store).run().await.unwrap();

        let remaining = store.organizations();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
        assert_eq!(remaining[0].external_id, Some(ExternalId::new("Q1")));
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].merged_ids.len(), 1);
    }

    #[test]
    fn any_identifier_beats_none_and_references_break_ties() {
        let with_placeholder = org("DeepMind").with_external_id(ExternalId::synthesize("DeepMind"));
        let bare = org("DeepMind");
        let mut refs = HashMap::new();
        refs.insert(bare.id, 50);
        let group = vec![bare.clone(), with_placeholder.clone()];
        assert_eq!(pick_survivor(&group, &refs).unwrap().id, with_placeholder.id);

        let a = org("Anthropic");
        let b = org("Anthropic");
        let mut refs = HashMap::new();
        refs.insert(b.id, 2);
        let group = vec![a, b.clone()];
        assert_eq!(pick_survivor(&group, &refs).unwrap().id, b.id);
    }

    #[test]
    fn localized_name_is_smallest_tiebreaker() {
        let plain = org("Meta");
        let localized = org("Meta").with_localized_name("元");
        let group = vec![plain, localized.clone()];
        assert_eq!(pick_survivor(&group, &HashMap::new()).unwrap().id, localized.id);
    }

    #[test]
    fn full_tie_keeps_earliest_created() {
        let mut older = org("Cohere");
        older.created_at = Utc::now() - Duration::days(30);
        let newer = org("Cohere");
        let group = vec![newer, older.clone()];
        assert_eq!(pick_survivor(&group, &HashMap::new()).unwrap().id, older.id);
    }

    #[test]
    fn groups_by_well_formed_identifier_across_names() {
        let a = org("Google DeepMind").with_external_id(ExternalId::new("Q15733006"));
        let b = org("DeepMind Technologies").with_external_id(ExternalId::new("Q15733006"));
        let c = org("Mistral AI");
        let groups = group_duplicates(&[a, b, c]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn shared_placeholder_identifiers_group() {
        let a = org("Lab A").with_external_id(ExternalId::new("local:x"));
        let b = org("Lab B").with_external_id(ExternalId::new("local:x"));
        let c = org("Lab C").with_external_id(ExternalId::new("local:y"));
        let groups = group_duplicates(&[a, b, c]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[tokio::test]
    async fn names_slugging_to_one_placeholder_collapse() {
        let store = Arc::new(MemoryStore::new());
        store.seed_organization(org("Lab A").with_external_id(ExternalId::synthesize("Lab A")));
        store.seed_organization(org("Lab-A").with_external_id(ExternalId::synthesize("Lab-A")));

        let report = dedup(&store).run().await.unwrap();

        assert_eq!(report.groups.len(), 1);
        let ids: Vec<_> = store.organizations().into_iter().map(|o| o.external_id).collect();
        assert_eq!(ids, vec![Some(ExternalId::synthesize("Lab A"))]);
    }

    #[tokio::test]
    async fn affiliations_are_migrated_and_duplicates_dropped() {
        let store = Arc::new(MemoryStore::new());
        let survivor =
            store.seed_organization(org("OpenAI").with_external_id(ExternalId::new("Q1")));
        let loser = store.seed_organization(org("OPENAI"));
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let start = NaiveDate::from_ymd_opt(2016, 1, 1);

        store.seed_affiliation(
            AffiliationFact::new(alice, survivor, "Researcher").between(start, None),
        );
        store.seed_affiliation(
            AffiliationFact::new(alice, loser, "researcher").between(start, None),
        );
        store.seed_affiliation(AffiliationFact::new(bob, loser, "Engineer"));
        store.seed_affiliation(AffiliationFact::new(alice, loser, "Researcher"));
        let mut item = ContentItem::new(
            bob,
            LinkType::Official {
                url: "https://openai.com".to_string(),
            },
        );
        item.organization_id = Some(loser);
        store.seed_content(item);

        let before = store.affiliations().len();
        let report = dedup(&store).run().await.unwrap();
        let after = store.affiliations();

        let group = &report.groups[0];
        assert_eq!(group.duplicates_dropped, 1);
        assert_eq!(group.edges_moved, 3);
        assert_eq!(after.len(), before - group.duplicates_dropped);
        assert!(after.iter().all(|a| a.organization_id == survivor));
        assert_eq!(store.content()[0].organization_id, Some(survivor));
    }

    #[tokio::test]
    async fn identical_facts_on_two_losers_keep_one_copy() {
        let store = Arc::new(MemoryStore::new());
        let survivor =
            store.seed_organization(org("Stanford").with_external_id(ExternalId::new("Q41506")));
        let l1 = store.seed_organization(org("stanford"));
        let l2 = store.seed_organization(org(" Stanford "));
        let person = Uuid::new_v4();
        store.seed_affiliation(AffiliationFact::new(person, l1, "Professor"));
        store.seed_affiliation(AffiliationFact::new(person, l2, "Professor"));

        dedup(&store).run().await.unwrap();

        let after = store.affiliations();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].organization_id, survivor);
    }

    #[tokio::test]
    async fn no_two_survivors_share_a_normalized_name() {
        let store = Arc::new(MemoryStore::new());
        for name in ["OpenAI", "openai", "Anthropic", "ANTHROPIC ", "anthropic", "xAI"] {
            store.seed_organization(org(name));
        }

        dedup(&store).run().await.unwrap();

        let names: Vec<String> = store
            .organizations()
            .iter()
            .map(|o| normalize_name(&o.name))
            .collect();
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), 3);
        assert_eq!(unique.len(), names.len());
    }

    #[tokio::test]
    async fn failed_group_is_left_untouched() {
        let store = Arc::new(MemoryStore::new());
        let good =
            store.seed_organization(org("Baidu").with_external_id(ExternalId::new("Q14772")));
        store.seed_organization(org("baidu"));
        let bad = store.seed_organization(
            org("Tsinghua University").with_external_id(ExternalId::new("Q16955")),
        );
        let bad_loser = store.seed_organization(org("tsinghua university"));
        let fact =
            store.seed_affiliation(AffiliationFact::new(Uuid::new_v4(), bad_loser, "Student"));
        store.fail_merge_into(bad);

        let report = dedup(&store).run().await.unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].survivor_id, good);
        assert_eq!(report.failed.len(), 1);
        let orgs = store.organizations();
        assert!(orgs.iter().any(|o| o.id == bad_loser));
        let facts = store.affiliations();
        assert_eq!(facts.iter().find(|a| a.id == fact).unwrap().organization_id, bad_loser);
    }

    #[tokio::test]
    async fn survivor_adopts_localized_name() {
        let store = Arc::new(MemoryStore::new());
        let keep = store.seed_organization(
            org("Microsoft Research").with_external_id(ExternalId::new("Q2294")),
        );
        store.seed_organization(org("microsoft research").with_localized_name("微软研究院"));

        dedup(&store).run().await.unwrap();

        let orgs = store.organizations();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].id, keep);
        assert_eq!(orgs[0].localized_name.as_deref(), Some("微软研究院"));
    }
}
