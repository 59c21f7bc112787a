// Test doubles for the external collaborators:
// - MockKnowledge (KnowledgeSource): records keyed by id, searched by label or alias
// - MockTranslator (Translator): deterministic suffixing, optional rejections
// - MockScorer (RelevanceScorer): substring rules over link titles

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use talentgraph_common::types::{normalize_name, ContentItem, ExternalId, Organization, Person};

use crate::audit::{Relevance, RelevanceScorer};
use crate::error::{Result, ServiceError};
use crate::knowledge::{EntityRecord, KnowledgeSource, SearchHit};
use crate::translate::Translator;

// ---------------------------------------------------------------------------
// MockKnowledge
// ---------------------------------------------------------------------------

/// In-memory knowledge base. Search matches when the normalized query equals
/// a record's label or one of its aliases; unknown queries return no hits.
#[derive(Default)]
pub struct MockKnowledge {
    records: Vec<EntityRecord>,
    failing: HashSet<String>,
    lookups: AtomicUsize,
}

impl MockKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: EntityRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Searches for `query` fail with a network error.
    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(normalize_name(query));
        self
    }

    /// Number of `get_entity` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeSource for MockKnowledge {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        let query = normalize_name(query);
        if self.failing.contains(&query) {
            return Err(ServiceError::Network(format!("connection reset searching {query}")));
        }
        let hits = self
            .records
            .iter()
            .filter(|r| {
                normalize_name(&r.label) == query
                    || r.aliases.iter().any(|a| normalize_name(a) == query)
            })
            .filter_map(|r| {
                Some(SearchHit {
                    external_id: r.external_id.clone()?,
                    label: r.label.clone(),
                    description: r.description.clone(),
                })
            })
            .take(limit as usize)
            .collect();
        Ok(hits)
    }

    async fn get_entity(&self, external_id: &ExternalId) -> Result<EntityRecord> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.records
            .iter()
            .find(|r| r.external_id.as_ref() == Some(external_id))
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(external_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockTranslator
// ---------------------------------------------------------------------------

pub struct MockTranslator {
    suffix: String,
    failing: Vec<String>,
}

impl MockTranslator {
    /// "Google" becomes "Google{suffix}".
    pub fn suffix(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            failing: Vec::new(),
        }
    }

    /// Batches containing `text` are rejected.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>> {
        if texts.iter().any(|t| self.failing.contains(t)) {
            return Err(ServiceError::Api {
                status: 400,
                message: "unsupported text".to_string(),
            });
        }
        Ok(texts.iter().map(|t| format!("{t}{}", self.suffix)).collect())
    }
}

// ---------------------------------------------------------------------------
// MockScorer
// ---------------------------------------------------------------------------

/// Scores by case-insensitive substring match on the link title. The first
/// matching rule wins; everything else gets the default score.
pub struct MockScorer {
    default_score: u8,
    rules: Vec<(String, u8, String)>,
    failing: Vec<String>,
}

impl MockScorer {
    pub fn new(default_score: u8) -> Self {
        Self {
            default_score,
            rules: Vec::new(),
            failing: Vec::new(),
        }
    }

    pub fn with_score(mut self, title_contains: &str, score: u8, reason: &str) -> Self {
        self.rules
            .push((title_contains.to_lowercase(), score, reason.to_string()));
        self
    }

    pub fn failing_on(mut self, title_contains: &str) -> Self {
        self.failing.push(title_contains.to_lowercase());
        self
    }
}

#[async_trait]
impl RelevanceScorer for MockScorer {
    async fn score(
        &self,
        _person: &Person,
        _organization: Option<&Organization>,
        item: &ContentItem,
    ) -> Result<Relevance> {
        let title = item.link.title().to_lowercase();
        if self.failing.iter().any(|f| title.contains(f.as_str())) {
            return Err(ServiceError::Api {
                status: 400,
                message: "content policy".to_string(),
            });
        }
        let (score, reason) = self
            .rules
            .iter()
            .find(|(needle, _, _)| title.contains(needle.as_str()))
            .map(|(_, score, reason)| (*score, reason.clone()))
            .unwrap_or((self.default_score, "on topic".to_string()));
        Ok(Relevance {
            score,
            reason,
            first_party: item.first_party,
        })
    }
}
