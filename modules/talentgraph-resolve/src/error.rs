use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failure talking to an external collaborator (knowledge graph, translator,
/// relevance scorer).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Network failures, rate limiting and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) => true,
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Parse(_) | ServiceError::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Parse(err.to_string())
    }
}

impl From<ServiceError> for talentgraph_common::TalentGraphError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => talentgraph_common::TalentGraphError::NotFound(what),
            other => talentgraph_common::TalentGraphError::ExternalService(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::Network("reset".into()).is_retryable());
        assert!(ServiceError::Api { status: 429, message: String::new() }.is_retryable());
        assert!(ServiceError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(!ServiceError::Api { status: 403, message: String::new() }.is_retryable());
        assert!(!ServiceError::Parse("bad json".into()).is_retryable());
        assert!(!ServiceError::NotFound("Q0".into()).is_retryable());
    }
}
