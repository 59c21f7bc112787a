//! Relation consistency repair.
//!
//! Pass 1 collapses exact duplicates, keeping the earliest-created edge.
//! Pass 2 resolves antisymmetric contradictions, but only when a curated
//! ground-truth entry says which direction is correct. Everything else is
//! left in place and reported as unresolved.
//!
//! `reverse_source` is the one-time bulk migration for a source that stored
//! its edges with the opposite direction convention.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use talentgraph_common::types::{EdgeKey, RelationEdge, RelationType};
use talentgraph_common::TalentGraphError;

use crate::relations::{find_contradictions, Contradiction, RelationGraph};
use crate::store::RelationChanges;

// ---------------------------------------------------------------------------
// Ground truth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GroundTruthEntry {
    source: Uuid,
    target: Uuid,
    #[serde(default = "default_relation")]
    relation: RelationType,
}

fn default_relation() -> RelationType {
    RelationType::Advisor
}

/// Human-curated edges known to be correct, in canonical direction.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    known: HashSet<EdgeKey>,
}

impl GroundTruth {
    pub fn new(known: impl IntoIterator<Item = EdgeKey>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// Load a JSON array of `{"source", "target", "relation"?}` entries.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ground truth: {}", path.display()))?;
        let entries: Vec<GroundTruthEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ground truth: {}", path.display()))?;
        Ok(Self::new(
            entries
                .into_iter()
                .map(|e| EdgeKey::new(e.source, e.target, e.relation)),
        ))
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// The correct direction for this pair, if the table knows it unambiguously.
    fn direction_for(&self, c: &Contradiction) -> Option<EdgeKey> {
        let forward = EdgeKey::new(c.a, c.b, c.relation);
        let backward = forward.reversed();
        match (self.known.contains(&forward), self.known.contains(&backward)) {
            (true, false) => Some(forward),
            (false, true) => Some(backward),
            _ => None,
        }
    }

    fn is_contradictory(&self, c: &Contradiction) -> bool {
        let forward = EdgeKey::new(c.a, c.b, c.relation);
        self.known.contains(&forward) && self.known.contains(&forward.reversed())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContradiction {
    pub kept: EdgeKey,
    pub deleted: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub duplicates_removed: usize,
    pub contradictions_found: usize,
    pub resolved: Vec<ResolvedContradiction>,
    /// Pairs left in place for manual review.
    pub unresolved: Vec<Contradiction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReversalReport {
    pub provenance: String,
    pub reversed: usize,
    /// Edges deleted because their reversed form already existed.
    pub collapsed: usize,
    /// The migration had already been applied; nothing changed.
    pub already_applied: bool,
}

// ---------------------------------------------------------------------------
// Repairer
// ---------------------------------------------------------------------------

pub struct RelationRepairer {
    graph: RelationGraph,
    ground_truth: GroundTruth,
}

impl RelationRepairer {
    pub fn new(graph: RelationGraph, ground_truth: GroundTruth) -> Self {
        Self {
            graph,
            ground_truth,
        }
    }

    /// Run both passes. Each pass is applied as one unit.
    pub async fn run(&self) -> Result<RepairReport, TalentGraphError> {
        let repo = self.graph.repository();
        let mut report = RepairReport::default();

        // --- Pass 1: exact duplicates ---
        let edges = repo.list_relations().await?;
        let duplicates = duplicate_edges(&edges);
        if !duplicates.is_empty() {
            repo.apply_changes(&RelationChanges {
                delete: duplicates.clone(),
                ..Default::default()
            })
            .await?;
        }
        report.duplicates_removed = duplicates.len();
        info!(removed = duplicates.len(), "Duplicate relation pass complete");

        // --- Pass 2: antisymmetric contradictions ---
        let removed: HashSet<Uuid> = duplicates.into_iter().collect();
        let remaining: Vec<RelationEdge> = edges
            .into_iter()
            .filter(|e| !removed.contains(&e.id))
            .collect();
        let contradictions = find_contradictions(&remaining);
        report.contradictions_found = contradictions.len();

        let mut to_delete = Vec::new();
        for c in contradictions {
            if self.ground_truth.is_contradictory(&c) {
                warn!(
                    a = %c.a,
                    b = %c.b,
                    "Ground truth lists both directions, leaving pair for review"
                );
                report.unresolved.push(c);
                continue;
            }
            match self.ground_truth.direction_for(&c) {
                Some(kept) => {
                    let deleted = if kept.source_id == c.a {
                        c.backward.clone()
                    } else {
                        c.forward.clone()
                    };
                    info!(
                        source = %kept.source_id,
                        target = %kept.target_id,
                        relation = %kept.relation,
                        deleted = deleted.len(),
                        "Resolved contradiction from ground truth"
                    );
                    to_delete.extend(deleted.iter().copied());
                    report.resolved.push(ResolvedContradiction { kept, deleted });
                }
                None => {
                    warn!(
                        a = %c.a,
                        b = %c.b,
                        relation = %c.relation,
                        "Unresolved contradiction flagged for review"
                    );
                    report.unresolved.push(c);
                }
            }
        }

        if !to_delete.is_empty() {
            repo.apply_changes(&RelationChanges {
                delete: to_delete,
                ..Default::default()
            })
            .await?;
        }

        info!(
            duplicates_removed = report.duplicates_removed,
            contradictions = report.contradictions_found,
            resolved = report.resolved.len(),
            unresolved = report.unresolved.len(),
            "Relation repair complete"
        );
        Ok(report)
    }

    /// Reverse every edge produced by `provenance`. Edges whose reversed form
    /// already exists are deleted instead. Runs once per provenance.
    pub async fn reverse_source(
        &self,
        provenance: &str,
    ) -> Result<ReversalReport, TalentGraphError> {
        let repo = self.graph.repository();
        let migration = format!("reverse-source:{provenance}");
        let mut report = ReversalReport {
            provenance: provenance.to_string(),
            ..Default::default()
        };

        if repo.migration_applied(&migration).await? {
            info!(provenance, "Direction migration already applied, skipping");
            report.already_applied = true;
            return Ok(report);
        }

        let edges = repo.list_relations().await?;
        let changes = plan_reversal(&edges, provenance, migration);
        report.reversed = changes.reverse.len();
        report.collapsed = changes.delete.len();

        repo.apply_changes(&changes).await?;
        info!(
            provenance,
            reversed = report.reversed,
            collapsed = report.collapsed,
            "Direction migration applied"
        );
        Ok(report)
    }
}

/// Ids of every edge that duplicates an earlier-created edge with the same key.
pub fn duplicate_edges(edges: &[RelationEdge]) -> Vec<Uuid> {
    let mut groups: HashMap<EdgeKey, Vec<&RelationEdge>> = HashMap::new();
    for edge in edges {
        groups.entry(edge.key()).or_default().push(edge);
    }

    let mut doomed = Vec::new();
    for group in groups.values_mut().filter(|g| g.len() > 1) {
        group.sort_by(|x, y| x.created_at.cmp(&y.created_at).then(x.id.cmp(&y.id)));
        doomed.extend(group.iter().skip(1).map(|e| e.id));
    }
    doomed.sort();
    doomed
}

fn plan_reversal(edges: &[RelationEdge], provenance: &str, migration: String) -> RelationChanges {
    let mut occupied: HashSet<EdgeKey> = edges
        .iter()
        .filter(|e| e.provenance != provenance)
        .map(RelationEdge::key)
        .collect();

    let mut ours: Vec<&RelationEdge> = edges
        .iter()
        .filter(|e| e.provenance == provenance)
        .collect();
    ours.sort_by(|x, y| x.created_at.cmp(&y.created_at).then(x.id.cmp(&y.id)));

    let mut changes = RelationChanges {
        migration: Some(migration),
        ..Default::default()
    };
    for edge in ours {
        let target = edge.key().reversed();
        if occupied.insert(target) {
            changes.reverse.push(edge.id);
        } else {
            changes.delete.push(edge.id);
        }
    }
    changes
}
