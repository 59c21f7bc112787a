pub mod audit;
pub mod csv_io;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod jobs;
pub mod knowledge;
pub mod matcher;
pub mod pacing;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod translate;

pub use audit::{
    apply_report, read_report, write_report, ApplySummary, AuditRow, ContentAuditor, Relevance,
    RelevanceScorer,
};
pub use error::ServiceError;
pub use inference::RelationInference;
pub use ingest::{IngestDeps, PersonIngestor, RelationIngestor, RelationSource, SourceDirection};
pub use jobs::JobSummary;
pub use knowledge::{KnowledgeSource, WikidataClient};
pub use matcher::{EntityMatcher, MatchOutcome};
pub use pacing::Pacer;
pub use translate::{DeeplTranslator, IdentityTranslator, Translator};
