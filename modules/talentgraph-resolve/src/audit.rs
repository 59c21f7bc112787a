//! Content audit: score every content item for relevance, write low scorers
//! to a CSV report for human review, and apply the reviewed report.
//!
//! The engine never deletes on its own judgement. The `action` column of the
//! reviewed report is the only input to deletion.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use talentgraph_common::config::AuditConfig;
use talentgraph_common::types::{ContentItem, Organization, Person};
use talentgraph_common::TalentGraphError;
use talentgraph_graph::{ContentRepository, EntityRepository, OrganizationRepository};

use crate::csv_io;
use crate::error::Result as ServiceResult;
use crate::jobs::JobSummary;
use crate::pacing::Pacer;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Valid relevance scores.
pub const RELEVANCE_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, PartialEq)]
pub struct Relevance {
    /// 1 (unrelated) to 5 (clearly about this person).
    pub score: u8,
    pub reason: String,
    pub first_party: bool,
}

/// Judges whether a content item is about the person it is attached to.
/// Usually LLM-backed.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(
        &self,
        person: &Person,
        organization: Option<&Organization>,
        item: &ContentItem,
    ) -> ServiceResult<Relevance>;
}

// ---------------------------------------------------------------------------
// Report rows
// ---------------------------------------------------------------------------

const HEADER: [&str; 12] = [
    "person_name",
    "organization",
    "source_type",
    "title",
    "url",
    "relevance",
    "reason",
    "first_party",
    "action",
    "content_id",
    "person_id",
    "organization_id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Keep,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub person_name: String,
    pub organization: String,
    pub source_type: String,
    pub title: String,
    pub url: String,
    pub relevance: u8,
    pub reason: String,
    pub first_party: bool,
    /// Left empty by the engine; filled in by the reviewer.
    pub action: String,
    pub content_id: Uuid,
    pub person_id: Uuid,
    pub organization_id: Option<Uuid>,
}

impl AuditRow {
    pub fn new(
        person: &Person,
        organization: Option<&Organization>,
        item: &ContentItem,
        relevance: &Relevance,
    ) -> Self {
        let title = if item.summary.trim().is_empty() {
            item.link.title().to_string()
        } else {
            format!("{}: {}", item.link.title(), item.summary.trim())
        };
        Self {
            person_name: person.name.clone(),
            organization: organization.map(|o| o.name.clone()).unwrap_or_default(),
            source_type: item.link.source_type().to_string(),
            title,
            url: item.link.url().to_string(),
            relevance: relevance.score,
            reason: relevance.reason.clone(),
            first_party: relevance.first_party,
            action: String::new(),
            content_id: item.id,
            person_id: person.id,
            organization_id: organization.map(|o| o.id),
        }
    }

    /// `None` for an empty action, an error for anything unrecognized.
    pub fn parsed_action(&self) -> Result<Option<AuditAction>, String> {
        match self.action.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "keep" => Ok(Some(AuditAction::Keep)),
            "delete" => Ok(Some(AuditAction::Delete)),
            other => Err(other.to_string()),
        }
    }

    fn fields(&self) -> [String; 12] {
        [
            self.person_name.clone(),
            self.organization.clone(),
            self.source_type.clone(),
            self.title.clone(),
            self.url.clone(),
            self.relevance.to_string(),
            self.reason.clone(),
            self.first_party.to_string(),
            self.action.clone(),
            self.content_id.to_string(),
            self.person_id.to_string(),
            self.organization_id.map(|id| id.to_string()).unwrap_or_default(),
        ]
    }
}

pub fn render_report(rows: &[AuditRow]) -> String {
    let mut out = String::new();
    csv_io::write_record(&mut out, &HEADER);
    for row in rows {
        csv_io::write_record(&mut out, &row.fields());
    }
    out
}

/// Parse a reviewed report. Columns are located by header name, so a
/// reviewer reordering or adding columns does not break the apply step.
pub fn parse_report(input: &str) -> anyhow::Result<Vec<AuditRow>> {
    let mut records = csv_io::parse(input)?.into_iter();
    let header = records.next().ok_or_else(|| anyhow!("audit report is empty"))?;
    let index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();
    for column in HEADER {
        if !index.contains_key(column) {
            return Err(anyhow!("audit report is missing column {column}"));
        }
    }

    let mut rows = Vec::new();
    for (n, record) in records.enumerate() {
        let line = n + 2;
        let get = |column: &str| -> String {
            index
                .get(column)
                .and_then(|&i| record.get(i))
                .cloned()
                .unwrap_or_default()
        };
        let parse_uuid = |column: &str| {
            Uuid::parse_str(get(column).trim())
                .with_context(|| format!("row {line}: invalid {column}"))
        };
        let organization_id = match get("organization_id").trim() {
            "" => None,
            _ => Some(parse_uuid("organization_id")?),
        };
        let relevance: u8 = get("relevance")
            .trim()
            .parse()
            .with_context(|| format!("row {line}: invalid relevance"))?;
        if !RELEVANCE_RANGE.contains(&relevance) {
            return Err(anyhow!("row {line}: relevance {relevance} outside 1-5"));
        }
        rows.push(AuditRow {
            person_name: get("person_name"),
            organization: get("organization"),
            source_type: get("source_type"),
            title: get("title"),
            url: get("url"),
            relevance,
            reason: get("reason"),
            first_party: get("first_party").trim().eq_ignore_ascii_case("true"),
            action: get("action"),
            content_id: parse_uuid("content_id")?,
            person_id: parse_uuid("person_id")?,
            organization_id,
        });
    }
    Ok(rows)
}

pub fn write_report(path: &Path, rows: &[AuditRow]) -> anyhow::Result<()> {
    std::fs::write(path, render_report(rows))
        .with_context(|| format!("Failed to write audit report: {}", path.display()))
}

pub fn read_report(path: &Path) -> anyhow::Result<Vec<AuditRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read audit report: {}", path.display()))?;
    parse_report(&content)
        .with_context(|| format!("Failed to parse audit report: {}", path.display()))
}

// ---------------------------------------------------------------------------
// Audit job
// ---------------------------------------------------------------------------

pub struct ContentAuditor {
    people: Arc<dyn EntityRepository>,
    orgs: Arc<dyn OrganizationRepository>,
    content: Arc<dyn ContentRepository>,
    scorer: Arc<dyn RelevanceScorer>,
    pacer: Arc<Pacer>,
    config: AuditConfig,
}

impl ContentAuditor {
    pub fn new(
        people: Arc<dyn EntityRepository>,
        orgs: Arc<dyn OrganizationRepository>,
        content: Arc<dyn ContentRepository>,
        scorer: Arc<dyn RelevanceScorer>,
        pacer: Arc<Pacer>,
        config: AuditConfig,
    ) -> Self {
        Self {
            people,
            orgs,
            content,
            scorer,
            pacer,
            config,
        }
    }

    /// Score every content item and return rows for those at or below the
    /// flag threshold. Nothing is deleted.
    pub async fn run(&self) -> Result<(Vec<AuditRow>, JobSummary), TalentGraphError> {
        let people: HashMap<Uuid, Person> = self
            .people
            .list_people()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let orgs: HashMap<Uuid, Organization> = self
            .orgs
            .list_organizations()
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        let items = self.content.list_content().await?;

        let mut summary = JobSummary::new("audit-content", items.len());
        let mut rows = Vec::new();

        for item in &items {
            let Some(person) = people.get(&item.person_id) else {
                summary.skip(item.id.to_string(), "person not found");
                continue;
            };
            let org = item.organization_id.and_then(|id| orgs.get(&id));

            let relevance = match self
                .pacer
                .call("relevance", || self.scorer.score(person, org, item))
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    summary.skip(item.id.to_string(), e);
                    continue;
                }
            };

            if !RELEVANCE_RANGE.contains(&relevance.score) {
                summary.skip(
                    item.id.to_string(),
                    format!("relevance {} outside 1-5", relevance.score),
                );
                continue;
            }

            summary.processed();
            if relevance.score <= self.config.flag_threshold {
                summary.flag(item.link.url(), &relevance.reason);
                rows.push(AuditRow::new(person, org, item, &relevance));
            }
        }

        summary.log();
        Ok((rows, summary))
    }
}

// ---------------------------------------------------------------------------
// Apply step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidAction {
    pub content_id: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplySummary {
    pub deleted: usize,
    /// Rows marked delete whose item no longer exists.
    pub already_gone: usize,
    pub kept: usize,
    pub unannotated: usize,
    pub invalid: Vec<InvalidAction>,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deleted, {} already gone, {} kept, {} unannotated, {} invalid",
            self.deleted,
            self.already_gone,
            self.kept,
            self.unannotated,
            self.invalid.len()
        )
    }
}

/// Delete exactly the rows marked `delete`, in one unit. `keep` and empty
/// actions change nothing; unrecognized actions are reported, not applied.
pub async fn apply_report(
    content: &dyn ContentRepository,
    rows: &[AuditRow],
) -> Result<ApplySummary, TalentGraphError> {
    let mut summary = ApplySummary::default();
    let mut to_delete = Vec::new();

    for row in rows {
        match row.parsed_action() {
            Ok(Some(AuditAction::Delete)) => {
                if !to_delete.contains(&row.content_id) {
                    to_delete.push(row.content_id);
                }
            }
            Ok(Some(AuditAction::Keep)) => summary.kept += 1,
            Ok(None) => summary.unannotated += 1,
            Err(value) => {
                warn!(
                    content_id = %row.content_id,
                    value = value.as_str(),
                    "Invalid audit action, not applied"
                );
                summary.invalid.push(InvalidAction {
                    content_id: row.content_id,
                    value,
                });
            }
        }
    }

    if !to_delete.is_empty() {
        summary.deleted = content.delete_content(&to_delete).await?;
        summary.already_gone = to_delete.len() - summary.deleted;
    }

    info!("Audit report applied: {summary}");
    Ok(summary)
}
