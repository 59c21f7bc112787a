use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use talentgraph_common::types::{EdgeKey, RelationEdge, RelationType};
use talentgraph_common::TalentGraphError;

use crate::store::{RelationChanges, RelationRepository};

/// Both directions of an antisymmetric edge exist between `a` and `b`
/// (`a < b` by id, so each pair is reported once).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contradiction {
    pub a: Uuid,
    pub b: Uuid,
    pub relation: RelationType,
    /// Edge ids stored as `(a, b)`.
    pub forward: Vec<Uuid>,
    /// Edge ids stored as `(b, a)`.
    pub backward: Vec<Uuid>,
}

/// Directed, typed edges between people under the fixed convention
/// "`(A, B, type)` means B is A's `type`".
///
/// `insert` only rejects exact duplicates; antisymmetric violations are left
/// for the repair pass so batch imports stay linear.
#[derive(Clone)]
pub struct RelationGraph {
    repo: Arc<dyn RelationRepository>,
}

impl RelationGraph {
    pub fn new(repo: Arc<dyn RelationRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn RelationRepository> {
        &self.repo
    }

    /// Insert an edge. Fails with `DuplicateEdge` if `(source, target, type)`
    /// is already present.
    pub async fn insert(&self, edge: &RelationEdge) -> Result<Uuid, TalentGraphError> {
        if edge.source_id == edge.target_id {
            return Err(TalentGraphError::Validation(format!(
                "self-referencing {} edge on {}",
                edge.relation, edge.source_id
            )));
        }
        if self.exists(edge.source_id, edge.target_id, edge.relation).await? {
            return Err(TalentGraphError::DuplicateEdge {
                source_id: edge.source_id,
                target_id: edge.target_id,
                relation: edge.relation,
            });
        }
        self.repo.insert_relation(edge).await?;
        debug!(
            edge_id = %edge.id,
            source = %edge.source_id,
            target = %edge.target_id,
            relation = %edge.relation,
            provenance = edge.provenance.as_str(),
            "Inserted relation"
        );
        Ok(edge.id)
    }

    pub async fn exists(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation: RelationType,
    ) -> Result<bool, TalentGraphError> {
        let key = EdgeKey::new(source_id, target_id, relation);
        Ok(self.repo.find_relation(&key).await?.is_some())
    }

    /// All `{A, B}` pairs holding both `(A,B,advisor)` and `(B,A,advisor)`.
    pub async fn find_contradictions(&self) -> Result<Vec<Contradiction>, TalentGraphError> {
        let edges = self.repo.list_relations().await?;
        Ok(find_contradictions(&edges))
    }

    pub async fn delete(&self, edge_id: Uuid) -> Result<(), TalentGraphError> {
        if self.repo.get_relation(edge_id).await?.is_none() {
            return Err(TalentGraphError::EdgeNotFound(edge_id));
        }
        self.repo
            .apply_changes(&RelationChanges {
                delete: vec![edge_id],
                ..Default::default()
            })
            .await?;
        info!(edge_id = %edge_id, "Deleted relation");
        Ok(())
    }

    /// Swap an edge's endpoints. Fails with `DuplicateEdge` when the reversed
    /// edge already exists; the caller decides whether to delete instead.
    pub async fn reverse(&self, edge_id: Uuid) -> Result<(), TalentGraphError> {
        let edge = self
            .repo
            .get_relation(edge_id)
            .await?
            .ok_or(TalentGraphError::EdgeNotFound(edge_id))?;
        let reversed = edge.key().reversed();
        if self.repo.find_relation(&reversed).await?.is_some() {
            return Err(TalentGraphError::DuplicateEdge {
                source_id: reversed.source_id,
                target_id: reversed.target_id,
                relation: reversed.relation,
            });
        }
        self.repo
            .apply_changes(&RelationChanges {
                reverse: vec![edge_id],
                ..Default::default()
            })
            .await?;
        info!(edge_id = %edge_id, relation = %edge.relation, "Reversed relation");
        Ok(())
    }
}

/// Pure contradiction scan over a set of edges. Only antisymmetric types are
/// considered. Output is ordered by `(a, b)` for determinism.
pub fn find_contradictions(edges: &[RelationEdge]) -> Vec<Contradiction> {
    let mut by_key: HashMap<EdgeKey, Vec<Uuid>> = HashMap::new();
    for edge in edges.iter().filter(|e| e.relation.is_antisymmetric()) {
        if edge.source_id == edge.target_id {
            continue;
        }
        by_key.entry(edge.key()).or_default().push(edge.id);
    }

    let mut found: BTreeMap<(Uuid, Uuid, RelationType), Contradiction> = BTreeMap::new();
    for (key, ids) in &by_key {
        if key.source_id > key.target_id {
            continue;
        }
        if let Some(back) = by_key.get(&key.reversed()) {
            let mut forward = ids.clone();
            let mut backward = back.clone();
            forward.sort();
            backward.sort();
            found.insert(
                (key.source_id, key.target_id, key.relation),
                Contradiction {
                    a: key.source_id,
                    b: key.target_id,
                    relation: key.relation,
                    forward,
                    backward,
                },
            );
        }
    }
    found.into_values().collect()
}
