use std::fmt;

use tracing::{info, warn};

/// One item a batch job did not finish, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

/// Outcome of one batch run: "processed N of M, plus what was skipped or
/// flagged". Jobs never abort on a single bad item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSummary {
    pub job: String,
    pub total: usize,
    pub processed: usize,
    /// Failed items (not found, external service exhausted, store error).
    pub skipped: Vec<SkippedItem>,
    /// Items left for a human (identifier conflicts, unresolved contradictions).
    pub flagged: Vec<SkippedItem>,
}

impl JobSummary {
    pub fn new(job: impl Into<String>, total: usize) -> Self {
        Self {
            job: job.into(),
            total,
            ..Default::default()
        }
    }

    pub fn processed(&mut self) {
        self.processed += 1;
    }

    pub fn skip(&mut self, item: impl Into<String>, reason: impl fmt::Display) {
        let item = item.into();
        let reason = reason.to_string();
        warn!(
            job = self.job.as_str(),
            item = item.as_str(),
            reason = reason.as_str(),
            "Skipped item"
        );
        self.skipped.push(SkippedItem { item, reason });
    }

    pub fn flag(&mut self, item: impl Into<String>, reason: impl fmt::Display) {
        let item = item.into();
        let reason = reason.to_string();
        warn!(
            job = self.job.as_str(),
            item = item.as_str(),
            reason = reason.as_str(),
            "Flagged for review"
        );
        self.flagged.push(SkippedItem { item, reason });
    }

    pub fn log(&self) {
        info!(
            job = self.job.as_str(),
            processed = self.processed,
            total = self.total,
            skipped = self.skipped.len(),
            flagged = self.flagged.len(),
            "{}",
            self
        );
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: processed {} of {}, {} skipped, {} flagged",
            self.job,
            self.processed,
            self.total,
            self.skipped.len(),
            self.flagged.len()
        )
    }
}
