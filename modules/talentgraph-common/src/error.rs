use thiserror::Error;
use uuid::Uuid;

use crate::types::{ExternalId, RelationType};

#[derive(Error, Debug)]
pub enum TalentGraphError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External id {external_id} already belongs to {existing_name} ({existing_id}), candidate was {candidate_name}")]
    IdentifierConflict {
        external_id: ExternalId,
        existing_id: Uuid,
        existing_name: String,
        candidate_name: String,
    },

    #[error("Duplicate edge: {source_id} -[{relation}]-> {target_id}")]
    DuplicateEdge {
        source_id: Uuid,
        target_id: Uuid,
        relation: RelationType,
    },

    #[error("Relation edge not found: {0}")]
    EdgeNotFound(Uuid),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TalentGraphError {
    /// Recover a typed error that crossed a repository boundary as `anyhow::Error`.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<TalentGraphError>() {
            Ok(typed) => typed,
            Err(other) => TalentGraphError::Anyhow(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_survive_anyhow_round_trip() {
        let id = Uuid::new_v4();
        let wrapped: anyhow::Error = TalentGraphError::EdgeNotFound(id).into();
        assert!(matches!(
            TalentGraphError::from_store(wrapped),
            TalentGraphError::EdgeNotFound(found) if found == id
        ));

        let plain = anyhow::anyhow!("connection reset");
        assert!(matches!(
            TalentGraphError::from_store(plain),
            TalentGraphError::Anyhow(_)
        ));
    }
}
