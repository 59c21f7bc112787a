use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::links::LinkType;

// --- External Identifiers ---

static WELL_FORMED_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Q[1-9][0-9]*$").expect("valid regex"));

/// Prefix used for identifiers minted locally when the knowledge graph had no match.
pub const PLACEHOLDER_PREFIX: &str = "local:";

/// Identifier minted by the external knowledge graph (e.g. `Q95`), or a
/// locally-synthesized placeholder standing in for one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Mint a placeholder for an entity the knowledge graph does not know about.
    pub fn synthesize(name: &str) -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", slugify(name)))
    }

    /// True when the id matches the knowledge graph's canonical pattern.
    pub fn is_well_formed(&self) -> bool {
        WELL_FORMED_ID_RE.is_match(&self.0)
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Trimmed, case-folded form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// --- People ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub localized_name: Option<String>,
    pub aliases: Vec<String>,
    pub external_id: Option<ExternalId>,
    pub topics: BTreeSet<String>,
    pub influence_score: f64,
    pub topic_ranks: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            localized_name: None,
            aliases: Vec::new(),
            external_id: None,
            topics: BTreeSet::new(),
            influence_score: 0.0,
            topic_ranks: BTreeMap::new(),
            created_at: Utc::now(),
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
        for alias in aliases {
            add_alias(&mut self.aliases, &self.name, alias.into());
        }
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Canonical name plus aliases, in that order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Push `alias` unless it already matches the canonical name or an existing alias
/// (case-insensitive). Returns whether it was added.
pub fn add_alias(aliases: &mut Vec<String>, canonical: &str, alias: String) -> bool {
    let key = normalize_name(&alias);
    if key.is_empty() || key == normalize_name(canonical) {
        return false;
    }
    if aliases.iter().any(|a| normalize_name(a) == key) {
        return false;
    }
    aliases.push(alias.trim().to_string());
    true
}

// --- Organizations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    Company,
    University,
    Other,
}

impl std::fmt::Display for OrgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrgType::Company => write!(f, "company"),
            OrgType::University => write!(f, "university"),
            OrgType::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for OrgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(OrgType::Company),
            "university" => Ok(OrgType::University),
            "other" => Ok(OrgType::Other),
            other => Err(format!("unknown organization type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub localized_name: Option<String>,
    pub external_id: Option<ExternalId>,
    pub org_type: OrgType,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, org_type: OrgType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            localized_name: None,
            external_id: None,
            org_type,
            created_at: Utc::now(),
        }
    }

    pub fn with_external_id(mut self, id: ExternalId) -> Self {
        self.external_id = Some(id);
        self
    }

    pub fn with_localized_name(mut self, name: impl Into<String>) -> Self {
        self.localized_name = Some(name.into());
        self
    }
}

// --- Relations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// `(A, B, advisor)`: B is A's advisor.
    Advisor,
    Cofounder,
    Colleague,
    Collaborator,
}

impl RelationType {
    /// `(A,B)` and `(B,A)` cannot both hold.
    pub fn is_antisymmetric(&self) -> bool {
        matches!(self, RelationType::Advisor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Advisor => "advisor",
            RelationType::Cofounder => "cofounder",
            RelationType::Colleague => "colleague",
            RelationType::Collaborator => "collaborator",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advisor" => Ok(RelationType::Advisor),
            "cofounder" => Ok(RelationType::Cofounder),
            "colleague" => Ok(RelationType::Colleague),
            "collaborator" => Ok(RelationType::Collaborator),
            other => Err(format!("unknown relation type: {other}")),
        }
    }
}

/// Directed, typed fact between two people. For `(source, target, relation)`
/// the stored meaning is always "target is the `relation` of source".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation: RelationType,
    pub description: String,
    pub provenance: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl RelationEdge {
    pub fn new(
        source_id: Uuid,
        target_id: Uuid,
        relation: RelationType,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            target_id,
            relation,
            description: String::new(),
            provenance: provenance.into(),
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_id: self.source_id,
            target_id: self.target_id,
            relation: self.relation,
        }
    }
}

/// `(source, target, type)` identity of an edge, ignoring metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation: RelationType,
}

impl EdgeKey {
    pub fn new(source_id: Uuid, target_id: Uuid, relation: RelationType) -> Self {
        Self {
            source_id,
            target_id,
            relation,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            source_id: self.target_id,
            target_id: self.source_id,
            relation: self.relation,
        }
    }
}

// --- Affiliations ---

/// A person's role at an organization, owned by the career-history subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliationFact {
    pub id: Uuid,
    pub person_id: Uuid,
    pub organization_id: Uuid,
    pub role: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AffiliationFact {
    pub fn new(person_id: Uuid, organization_id: Uuid, role: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            person_id,
            organization_id,
            role: role.into(),
            start_date: None,
            end_date: None,
        }
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Same person, same role, same start date. Organization is ignored so the
    /// key can be compared across a merge.
    pub fn identity_key(&self) -> (Uuid, String, Option<NaiveDate>) {
        (self.person_id, normalize_name(&self.role), self.start_date)
    }
}

// --- Content ---

/// A link or piece of content attached to a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub person_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub link: LinkType,
    pub summary: String,
    pub first_party: bool,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(person_id: Uuid, link: LinkType) -> Self {
        Self {
            id: Uuid::new_v4(),
            person_id,
            organization_id: None,
            link,
            summary: String::new(),
            first_party: false,
            created_at: Utc::now(),
        }
    }
}

// --- Metrics ---

/// Raw inputs to the influence score for one person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InfluenceSignals {
    pub content_items: u64,
    pub popularity: u64,
    pub citations: u64,
    pub h_index: u32,
    /// Human/LLM rating on a 0–10 scale.
    pub qualitative_rating: Option<f64>,
}

/// Computed metrics written back for one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonMetrics {
    pub person_id: Uuid,
    pub influence_score: f64,
    pub topic_ranks: BTreeMap<String, u32>,
}
