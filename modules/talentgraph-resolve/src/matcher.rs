//! Entity Matcher: resolves an external candidate record to an existing
//! canonical entity, or says a new one should be created.
//!
//! Rules, first hit wins:
//! 1. external identifier (a name mismatch here is a conflict, never a merge)
//! 2. case-insensitive exact name or alias
//! 3. token overlap: same trailing token plus at least one other shared token
//!
//! Person and organization namespaces never mix. Read-only.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use talentgraph_common::types::{normalize_name, ExternalId, Organization, Person};
use talentgraph_common::TalentGraphError;
use talentgraph_graph::{EntityRepository, OrganizationRepository};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub aliases: Vec<String>,
    pub external_id: Option<ExternalId>,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_external_id(mut self, id: ExternalId) -> Self {
        self.external_id = Some(id);
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    ExternalId,
    ExactName,
    TokenOverlap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Existing { id: Uuid, rule: MatchRule },
    CreateNew,
    /// The identifier belongs to an entity whose names share nothing with
    /// the candidate. Needs a human; the caller must not overwrite.
    Conflict {
        external_id: ExternalId,
        existing_id: Uuid,
        existing_name: String,
    },
}

impl MatchOutcome {
    pub fn existing_id(&self) -> Option<Uuid> {
        match self {
            MatchOutcome::Existing { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Lift a conflict into the typed error callers surface.
    pub fn into_conflict_error(self, candidate_name: &str) -> Option<TalentGraphError> {
        match self {
            MatchOutcome::Conflict {
                external_id,
                existing_id,
                existing_name,
            } => Some(TalentGraphError::IdentifierConflict {
                external_id,
                existing_id,
                existing_name,
                candidate_name: candidate_name.to_string(),
            }),
            _ => None,
        }
    }
}

/// The slice of an entity the matching rules look at.
#[derive(Debug, Clone)]
pub struct EntityView<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub aliases: Vec<&'a str>,
    pub external_id: Option<&'a ExternalId>,
    pub created_at: DateTime<Utc>,
}

impl<'a> EntityView<'a> {
    fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

impl<'a> From<&'a Person> for EntityView<'a> {
    fn from(p: &'a Person) -> Self {
        EntityView {
            id: p.id,
            name: &p.name,
            aliases: p.aliases.iter().map(String::as_str).collect(),
            external_id: p.external_id.as_ref(),
            created_at: p.created_at,
        }
    }
}

impl<'a> From<&'a Organization> for EntityView<'a> {
    fn from(o: &'a Organization) -> Self {
        EntityView {
            id: o.id,
            name: &o.name,
            aliases: o.localized_name.as_deref().into_iter().collect(),
            external_id: o.external_id.as_ref(),
            created_at: o.created_at,
        }
    }
}

/// Apply the matching rules to `candidate` over `entities`.
pub fn resolve(candidate: &Candidate, entities: &[EntityView<'_>]) -> MatchOutcome {
    let candidate_keys: BTreeSet<String> = candidate
        .names()
        .map(normalize_name)
        .filter(|k| !k.is_empty())
        .collect();

    // 1. Identifier
    if let Some(ext) = &candidate.external_id {
        if let Some(found) = entities.iter().find(|e| e.external_id == Some(ext)) {
            let shares_name = found
                .names()
                .any(|n| candidate_keys.contains(&normalize_name(n)));
            if shares_name {
                return MatchOutcome::Existing {
                    id: found.id,
                    rule: MatchRule::ExternalId,
                };
            }
            return MatchOutcome::Conflict {
                external_id: ext.clone(),
                existing_id: found.id,
                existing_name: found.name.to_string(),
            };
        }
    }

    // A different canonical identifier means a different entity, whatever the name.
    let eligible: Vec<&EntityView<'_>> = entities
        .iter()
        .filter(|e| !identifiers_disagree(candidate.external_id.as_ref(), e.external_id))
        .collect();

    // 2. Exact name or alias
    let mut exact: Vec<&EntityView<'_>> = eligible
        .iter()
        .copied()
        .filter(|e| e.names().any(|n| candidate_keys.contains(&normalize_name(n))))
        .collect();
    if !exact.is_empty() {
        exact.sort_by(|a, b| {
            let a_key = (!a.external_id.is_some_and(|x| x.is_well_formed()), a.created_at, a.id);
            let b_key = (!b.external_id.is_some_and(|x| x.is_well_formed()), b.created_at, b.id);
            a_key.cmp(&b_key)
        });
        return MatchOutcome::Existing {
            id: exact[0].id,
            rule: MatchRule::ExactName,
        };
    }

    // 3. Token overlap, only when exactly one entity qualifies
    let matched: BTreeSet<Uuid> = eligible
        .iter()
        .filter(|e| {
            candidate
                .names()
                .any(|c| e.names().any(|n| tokens_match(c, n)))
        })
        .map(|e| e.id)
        .collect();
    match (matched.len(), matched.first()) {
        (1, Some(&id)) => MatchOutcome::Existing {
            id,
            rule: MatchRule::TokenOverlap,
        },
        (0, _) => MatchOutcome::CreateNew,
        (n, _) => {
            debug!(
                candidate = candidate.name.as_str(),
                matches = n,
                "Ambiguous token match, creating new"
            );
            MatchOutcome::CreateNew
        }
    }
}

fn identifiers_disagree(candidate: Option<&ExternalId>, existing: Option<&ExternalId>) -> bool {
    match (candidate, existing) {
        (Some(a), Some(b)) => a.is_well_formed() && b.is_well_formed() && a != b,
        _ => false,
    }
}

/// Trailing tokens equal and at least one other token shared.
pub fn tokens_match(a: &str, b: &str) -> bool {
    let a: Vec<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let b: Vec<String> = b.split_whitespace().map(str::to_lowercase).collect();
    let (Some((a_last, a_rest)), Some((b_last, b_rest))) = (a.split_last(), b.split_last()) else {
        return false;
    };
    if a_last != b_last {
        return false;
    }
    a_rest.iter().any(|t| b_rest.contains(t))
}

// ---------------------------------------------------------------------------
// EntityMatcher
// ---------------------------------------------------------------------------

pub struct EntityMatcher {
    people: Arc<dyn EntityRepository>,
    orgs: Arc<dyn OrganizationRepository>,
}

impl EntityMatcher {
    pub fn new(people: Arc<dyn EntityRepository>, orgs: Arc<dyn OrganizationRepository>) -> Self {
        Self { people, orgs }
    }

    pub async fn match_person(
        &self,
        candidate: &Candidate,
    ) -> Result<MatchOutcome, TalentGraphError> {
        let people = self.people.list_people().await?;
        let views: Vec<EntityView<'_>> = people.iter().map(EntityView::from).collect();
        let outcome = resolve(candidate, &views);
        debug!(candidate = candidate.name.as_str(), ?outcome, "Matched person");
        Ok(outcome)
    }

    pub async fn match_organization(
        &self,
        candidate: &Candidate,
    ) -> Result<MatchOutcome, TalentGraphError> {
        let orgs = self.orgs.list_organizations().await?;
        let views: Vec<EntityView<'_>> = orgs.iter().map(EntityView::from).collect();
        let outcome = resolve(candidate, &views);
        debug!(candidate = candidate.name.as_str(), ?outcome, "Matched organization");
        Ok(outcome)
    }
}
