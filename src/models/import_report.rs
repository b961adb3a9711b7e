//! Import report models: per-row outcomes and batch totals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::book_author::AssociationDiff;
use crate::error::ErrorCode;
use crate::matching::TitleCandidate;

/// Where a row got to before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    Pending,
    TitleMatched,
    TitleUnmatched,
    TitleAmbiguous,
    AuthorsResolved,
    Associated,
    Committed,
}

/// Final status of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Matched and resolved but rolled back (dry run)
    Matched,
    Unmatched,
    Ambiguous,
    Committed,
    Failed,
}

/// Outcome of one import row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowOutcome {
    pub index: usize,
    pub title: String,
    pub status: RowStatus,
    /// Last stage reached; for failed rows, the stage the failure happened after
    pub stage: RowStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_ids: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<AssociationDiff>,
    /// Closest or tied books, for manual review of unmatched and ambiguous rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateSummary>,
    /// Created the book because no title matched
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub book_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RowOutcome {
    pub fn new(index: usize, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            status: RowStatus::Failed,
            stage: RowStage::Pending,
            book_id: None,
            author_ids: Vec::new(),
            diff: None,
            candidates: Vec::new(),
            book_created: false,
            error_code: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub book_id: i32,
    pub title: String,
    pub score: f64,
}

impl From<&TitleCandidate> for CandidateSummary {
    fn from(c: &TitleCandidate) -> Self {
        Self {
            book_id: c.book_id,
            title: c.title.clone(),
            score: c.score,
        }
    }
}

/// Aggregated result of one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub total: usize,
    /// Rows whose title resolved to a book (committed, dry-run or failed later)
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub committed: usize,
    pub failed: usize,
    /// Rows never attempted because the batch was cancelled or aborted
    pub skipped: usize,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub rows: Vec<RowOutcome>,
}

impl BatchReport {
    pub fn new(batch_id: Uuid, total: usize) -> Self {
        Self {
            batch_id,
            total,
            matched: 0,
            unmatched: 0,
            ambiguous: 0,
            committed: 0,
            failed: 0,
            skipped: 0,
            cancelled: false,
            aborted: None,
            rows: Vec::with_capacity(total),
        }
    }

    /// Record an outcome and update the totals.
    pub fn push(&mut self, outcome: RowOutcome) {
        if outcome.book_id.is_some() && !outcome.book_created {
            self.matched += 1;
        }
        match outcome.status {
            RowStatus::Matched => {}
            RowStatus::Unmatched => self.unmatched += 1,
            RowStatus::Ambiguous => self.ambiguous += 1,
            RowStatus::Committed => self.committed += 1,
            RowStatus::Failed => self.failed += 1,
        }
        self.rows.push(outcome);
    }

    /// Close the report: order rows and count the ones never attempted.
    pub fn finish(mut self) -> Self {
        self.rows.sort_by_key(|r| r.index);
        self.skipped = self.total.saturating_sub(self.rows.len());
        self
    }

    /// Rows worth re-running after correction (failed, unmatched, ambiguous).
    pub fn retryable_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    RowStatus::Failed | RowStatus::Unmatched | RowStatus::Ambiguous
                )
            })
            .map(|r| r.index)
            .collect()
    }
}
