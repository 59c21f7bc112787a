// In-memory store implementing every repository trait.
//
// Each trait method takes the lock once, validates, then mutates, so a
// rejected unit of work leaves the state untouched just like a rolled-back
// transaction. `fail_merge_into` lets tests simulate a failure mid-job.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use talentgraph_common::types::{
    add_alias, AffiliationFact, ContentItem, EdgeKey, ExternalId, InfluenceSignals, Organization,
    Person, PersonMetrics, RelationEdge,
};
use talentgraph_common::TalentGraphError;

use crate::store::{
    ContentRepository, EntityRepository, OrgMergePlan, OrganizationRepository, PersonIngestPlan,
    RelationChanges, RelationRepository,
};

#[derive(Default)]
struct State {
    people: Vec<Person>,
    signals: Vec<(Uuid, InfluenceSignals)>,
    organizations: Vec<Organization>,
    affiliations: Vec<AffiliationFact>,
    relations: Vec<RelationEdge>,
    content: Vec<ContentItem>,
    migrations: HashSet<String>,
    fail_merges: HashSet<Uuid>,
}

impl State {
    fn identifier_conflict(
        &self,
        external_id: &ExternalId,
        candidate: &Person,
    ) -> Option<TalentGraphError> {
        self.people
            .iter()
            .find(|p| p.id != candidate.id && p.external_id.as_ref() == Some(external_id))
            .map(|existing| TalentGraphError::IdentifierConflict {
                external_id: external_id.clone(),
                existing_id: existing.id,
                existing_name: existing.name.clone(),
                candidate_name: candidate.name.clone(),
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding (bypasses all checks, like a legacy import) ---

    pub fn seed_person(&self, person: Person) -> Uuid {
        let id = person.id;
        self.state.lock().unwrap().people.push(person);
        id
    }

    pub fn seed_organization(&self, org: Organization) -> Uuid {
        let id = org.id;
        self.state.lock().unwrap().organizations.push(org);
        id
    }

    pub fn seed_affiliation(&self, fact: AffiliationFact) -> Uuid {
        let id = fact.id;
        self.state.lock().unwrap().affiliations.push(fact);
        id
    }

    pub fn seed_relation(&self, edge: RelationEdge) -> Uuid {
        let id = edge.id;
        self.state.lock().unwrap().relations.push(edge);
        id
    }

    pub fn seed_content(&self, item: ContentItem) -> Uuid {
        let id = item.id;
        self.state.lock().unwrap().content.push(item);
        id
    }

    pub fn seed_signals(&self, person_id: Uuid, signals: InfluenceSignals) {
        let mut state = self.state.lock().unwrap();
        state.signals.retain(|(id, _)| *id != person_id);
        state.signals.push((person_id, signals));
    }

    /// Make every merge into `survivor_id` fail as if the transaction aborted.
    pub fn fail_merge_into(&self, survivor_id: Uuid) {
        self.state.lock().unwrap().fail_merges.insert(survivor_id);
    }

    // --- Snapshots ---

    pub fn people(&self) -> Vec<Person> {
        self.state.lock().unwrap().people.clone()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.state.lock().unwrap().organizations.clone()
    }

    pub fn affiliations(&self) -> Vec<AffiliationFact> {
        self.state.lock().unwrap().affiliations.clone()
    }

    pub fn relations(&self) -> Vec<RelationEdge> {
        self.state.lock().unwrap().relations.clone()
    }

    pub fn content(&self) -> Vec<ContentItem> {
        self.state.lock().unwrap().content.clone()
    }
}

#[async_trait]
impl EntityRepository for MemoryStore {
    async fn list_people(&self) -> Result<Vec<Person>> {
        Ok(self.people())
    }

    async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
        let state = self.state.lock().unwrap();
        Ok(state.people.iter().find(|p| p.id == id).cloned())
    }

    async fn find_person_by_external_id(&self, external_id: &ExternalId) -> Result<Option<Person>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .people
            .iter()
            .find(|p| p.external_id.as_ref() == Some(external_id))
            .cloned())
    }

    async fn create_person(&self, person: &Person) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.people.iter().any(|p| p.id == person.id) {
            bail!("person {} already exists", person.id);
        }
        if let Some(conflict) = person
            .external_id
            .as_ref()
            .and_then(|ext| state.identifier_conflict(ext, person))
        {
            return Err(conflict.into());
        }
        state.people.push(person.clone());
        Ok(())
    }

    async fn set_external_id(&self, id: Uuid, external_id: &ExternalId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(person) = state.people.iter().find(|p| p.id == id).cloned() else {
            bail!("person {id} not found");
        };
        if let Some(current) = &person.external_id {
            bail!("person {id} already has external id {current}");
        }
        if let Some(conflict) = state.identifier_conflict(external_id, &person) {
            return Err(conflict.into());
        }
        if let Some(person) = state.people.iter_mut().find(|p| p.id == id) {
            person.external_id = Some(external_id.clone());
        }
        Ok(())
    }

    async fn apply_ingest(&self, plan: &PersonIngestPlan) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(person) = &plan.person {
            if state.people.iter().any(|p| p.id == person.id) {
                bail!("person {} already exists", person.id);
            }
            if let Some(conflict) = person
                .external_id
                .as_ref()
                .and_then(|ext| state.identifier_conflict(ext, person))
            {
                return Err(conflict.into());
            }
        }
        let person_known = |state: &State, id: Uuid| {
            plan.person.as_ref().is_some_and(|p| p.id == id)
                || state.people.iter().any(|p| p.id == id)
        };
        let org_known = |state: &State, id: Uuid| {
            plan.organizations.iter().any(|o| o.id == id)
                || state.organizations.iter().any(|o| o.id == id)
        };
        for org in &plan.organizations {
            if state.organizations.iter().any(|o| o.id == org.id) {
                bail!("organization {} already exists", org.id);
            }
        }
        for fact in &plan.affiliations {
            if !person_known(&state, fact.person_id) {
                bail!("person {} not found", fact.person_id);
            }
            if !org_known(&state, fact.organization_id) {
                bail!("organization {} not found", fact.organization_id);
            }
        }
        for item in &plan.content {
            if !person_known(&state, item.person_id) {
                bail!("person {} not found", item.person_id);
            }
            if state.content.iter().any(|c| c.id == item.id) {
                bail!("content item {} already exists", item.id);
            }
        }

        state.people.extend(plan.person.iter().cloned());
        state.organizations.extend(plan.organizations.iter().cloned());
        state.affiliations.extend(plan.affiliations.iter().cloned());
        state.content.extend(plan.content.iter().cloned());
        Ok(())
    }

    async fn add_aliases(&self, id: Uuid, aliases: &[String]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let Some(person) = state.people.iter_mut().find(|p| p.id == id) else {
            bail!("person {id} not found");
        };
        let mut added = 0;
        for alias in aliases {
            if add_alias(&mut person.aliases, &person.name, alias.clone()) {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn set_localized_name(&self, id: Uuid, localized_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(person) = state.people.iter_mut().find(|p| p.id == id) else {
            bail!("person {id} not found");
        };
        person.localized_name = Some(localized_name.to_string());
        Ok(())
    }

    async fn influence_signals(&self, id: Uuid) -> Result<InfluenceSignals> {
        let state = self.state.lock().unwrap();
        let mut signals = state
            .signals
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, s)| *s)
            .unwrap_or_default();
        signals.content_items = state.content.iter().filter(|c| c.person_id == id).count() as u64;
        Ok(signals)
    }

    async fn upsert_signals(&self, id: Uuid, signals: &InfluenceSignals) -> Result<()> {
        self.seed_signals(id, *signals);
        Ok(())
    }

    async fn save_metrics(&self, metrics: &[PersonMetrics]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for m in metrics {
            if !state.people.iter().any(|p| p.id == m.person_id) {
                bail!("person {} not found", m.person_id);
            }
        }
        for m in metrics {
            if let Some(person) = state.people.iter_mut().find(|p| p.id == m.person_id) {
                person.influence_score = m.influence_score;
                person.topic_ranks = m.topic_ranks.clone();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationRepository for MemoryStore {
    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self.organizations())
    }

    async fn create_organization(&self, org: &Organization) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.organizations.iter().any(|o| o.id == org.id) {
            bail!("organization {} already exists", org.id);
        }
        state.organizations.push(org.clone());
        Ok(())
    }

    async fn list_affiliations(&self) -> Result<Vec<AffiliationFact>> {
        Ok(self.affiliations())
    }

    async fn add_affiliation(&self, fact: &AffiliationFact) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.organizations.iter().any(|o| o.id == fact.organization_id) {
            bail!("organization {} not found", fact.organization_id);
        }
        state.affiliations.push(fact.clone());
        Ok(())
    }

    async fn apply_merge(&self, plan: &OrgMergePlan) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.fail_merges.contains(&plan.survivor_id) {
            bail!("simulated failure merging into {}", plan.survivor_id);
        }
        if !state.organizations.iter().any(|o| o.id == plan.survivor_id) {
            bail!("survivor {} not found", plan.survivor_id);
        }
        for id in &plan.loser_ids {
            if !state.organizations.iter().any(|o| o.id == *id) {
                bail!("losing organization {id} not found");
            }
        }
        for id in plan.repoint_affiliations.iter().chain(&plan.drop_affiliations) {
            if !state.affiliations.iter().any(|a| a.id == *id) {
                bail!("affiliation {id} not found");
            }
        }

        for fact in state.affiliations.iter_mut() {
            if plan.repoint_affiliations.contains(&fact.id) {
                fact.organization_id = plan.survivor_id;
            }
        }
        state
            .affiliations
            .retain(|a| !plan.drop_affiliations.contains(&a.id));
        for item in state.content.iter_mut() {
            if plan.repoint_content.contains(&item.id) {
                item.organization_id = Some(plan.survivor_id);
            }
        }
        if let Some(name) = &plan.adopt_localized_name {
            if let Some(survivor) = state
                .organizations
                .iter_mut()
                .find(|o| o.id == plan.survivor_id)
            {
                survivor.localized_name = Some(name.clone());
            }
        }
        state
            .organizations
            .retain(|o| !plan.loser_ids.contains(&o.id));
        Ok(())
    }
}

#[async_trait]
impl RelationRepository for MemoryStore {
    async fn list_relations(&self) -> Result<Vec<RelationEdge>> {
        Ok(self.relations())
    }

    async fn get_relation(&self, id: Uuid) -> Result<Option<RelationEdge>> {
        let state = self.state.lock().unwrap();
        Ok(state.relations.iter().find(|e| e.id == id).cloned())
    }

    async fn find_relation(&self, key: &EdgeKey) -> Result<Option<RelationEdge>> {
        let state = self.state.lock().unwrap();
        Ok(state.relations.iter().find(|e| e.key() == *key).cloned())
    }

    async fn insert_relation(&self, edge: &RelationEdge) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.relations.iter().any(|e| e.id == edge.id) {
            bail!("relation {} already exists", edge.id);
        }
        state.relations.push(edge.clone());
        Ok(())
    }

    async fn apply_changes(&self, changes: &RelationChanges) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for id in changes.reverse.iter().chain(&changes.delete) {
            if !state.relations.iter().any(|e| e.id == *id) {
                bail!("relation {id} not found");
            }
        }
        if let Some(name) = &changes.migration {
            if state.migrations.contains(name) {
                bail!("migration {name} already applied");
            }
        }

        state.relations.retain(|e| !changes.delete.contains(&e.id));
        for edge in state.relations.iter_mut() {
            if changes.reverse.contains(&edge.id) {
                std::mem::swap(&mut edge.source_id, &mut edge.target_id);
            }
        }
        if let Some(name) = &changes.migration {
            state.migrations.insert(name.clone());
        }
        Ok(())
    }

    async fn migration_applied(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().migrations.contains(name))
    }
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn list_content(&self) -> Result<Vec<ContentItem>> {
        Ok(self.content())
    }

    async fn add_content(&self, item: &ContentItem) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.content.iter().any(|c| c.id == item.id) {
            bail!("content item {} already exists", item.id);
        }
        state.content.push(item.clone());
        Ok(())
    }

    async fn delete_content(&self, ids: &[Uuid]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let before = state.content.len();
        state.content.retain(|c| !ids.contains(&c.id));
        Ok(before - state.content.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentgraph_common::types::OrgType;
    use talentgraph_common::LinkType;

    #[tokio::test]
    async fn ingest_plan_with_dangling_affiliation_writes_nothing() {
        let store = MemoryStore::new();
        let person = Person::new("Geoffrey Hinton").with_external_id(ExternalId::new("Q92894"));
        let org = Organization::new("University of Toronto", OrgType::University);
        let plan = PersonIngestPlan {
            affiliations: vec![
                AffiliationFact::new(person.id, org.id, "student"),
                AffiliationFact::new(person.id, Uuid::new_v4(), "researcher"),
            ],
            content: vec![ContentItem::new(
                person.id,
                LinkType::Official {
                    url: "https://www.cs.toronto.edu/~hinton/".to_string(),
                },
            )],
            person: Some(person),
            organizations: vec![org],
        };

        assert!(store.apply_ingest(&plan).await.is_err());
        assert!(store.people().is_empty());
        assert!(store.organizations().is_empty());
        assert!(store.affiliations().is_empty());
        assert!(store.content().is_empty());
    }

    #[tokio::test]
    async fn ingest_plan_with_taken_identifier_is_conflict() {
        let store = MemoryStore::new();
        let qid = ExternalId::new("Q92894");
        let holder = store.seed_person(Person::new("Someone Else").with_external_id(qid.clone()));
        let plan = PersonIngestPlan {
            person: Some(Person::new("Geoffrey Hinton").with_external_id(qid)),
            ..Default::default()
        };

        let err = TalentGraphError::from_store(store.apply_ingest(&plan).await.unwrap_err());

        assert!(matches!(
            err,
            TalentGraphError::IdentifierConflict { existing_id, .. } if existing_id == holder
        ));
        assert_eq!(store.people().len(), 1);
    }

    #[tokio::test]
    async fn external_id_is_set_once_and_never_shared() {
        let store = MemoryStore::new();
        let hinton = store.seed_person(Person::new("Geoffrey Hinton"));
        let other = store.seed_person(Person::new("Yann LeCun"));
        let qid = ExternalId::new("Q92894");

        store.set_external_id(hinton, &qid).await.unwrap();
        assert!(store.set_external_id(hinton, &ExternalId::new("Q3572699")).await.is_err());

        let err = store.set_external_id(other, &qid).await.unwrap_err();
        assert!(matches!(
            TalentGraphError::from_store(err),
            TalentGraphError::IdentifierConflict { existing_id, .. } if existing_id == hinton
        ));
        let people = store.people();
        assert_eq!(people.iter().filter(|p| p.external_id.as_ref() == Some(&qid)).count(), 1);
    }
}
