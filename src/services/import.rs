//! Import pipeline: per-row match, resolve and reconcile with row isolation.
//!
//! Every row runs in its own transaction. A row that fails is rolled back and
//! reported; the batch moves on. Only a lost connection stops the batch early,
//! and a cancelled batch keeps whatever rows already committed.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::ImportConfig,
    error::{AppError, AppResult},
    matching::{TitleCandidate, TitleIndex, TitleMatch, TitleMatcher},
    models::{
        import_row::raw_title, BatchReport, Book, BookTitle, CandidateSummary, ImportRow,
        RowOutcome, RowStage, RowStatus,
    },
    repository::{CatalogTx, Repository},
    services::{associations::AssociationService, authors::AuthorRegistry},
};

type SharedIndex = Arc<RwLock<TitleIndex>>;

/// A row waiting to be processed, already converted at the boundary
struct PendingRow {
    index: usize,
    title: String,
    row: AppResult<ImportRow>,
}

/// Outcome of a row plus the detail of a batch-stopping error, if any
type Processed = (RowOutcome, Option<String>);

#[derive(Clone)]
pub struct ImportService {
    repository: Repository,
    matcher: TitleMatcher,
    authors: AuthorRegistry,
    associations: AssociationService,
    config: ImportConfig,
}

impl ImportService {
    pub fn new(
        repository: Repository,
        matcher: TitleMatcher,
        authors: AuthorRegistry,
        associations: AssociationService,
        config: ImportConfig,
    ) -> Self {
        Self {
            repository,
            matcher,
            authors,
            associations,
            config,
        }
    }

    /// Reconcile a batch of typed rows.
    pub async fn import_batch(&self, rows: Vec<ImportRow>) -> BatchReport {
        self.import_batch_with_cancel(rows, CancellationToken::new())
            .await
    }

    /// Reconcile a batch of typed rows, stopping between rows once `cancel` fires.
    pub async fn import_batch_with_cancel(
        &self,
        rows: Vec<ImportRow>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let pending = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| PendingRow {
                index,
                title: row.title.clone(),
                row: Ok(row),
            })
            .collect();
        self.run(pending, cancel).await
    }

    /// Reconcile rows as produced by a document parser.
    ///
    /// Values that cannot be turned into an [`ImportRow`] fail individually
    /// as malformed rows.
    pub async fn import_values(&self, values: &[Value], cancel: CancellationToken) -> BatchReport {
        let pending = values
            .iter()
            .enumerate()
            .map(|(index, value)| PendingRow {
                index,
                title: raw_title(value),
                row: ImportRow::try_from(value),
            })
            .collect();
        self.run(pending, cancel).await
    }

    async fn run(&self, rows: Vec<PendingRow>, cancel: CancellationToken) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let mut report = BatchReport::new(batch_id, rows.len());

        tracing::info!(
            batch_id = %batch_id,
            rows = rows.len(),
            workers = self.config.workers,
            dry_run = self.config.dry_run,
            "Starting import batch"
        );

        let titles: SharedIndex = match self.repository.list_books().await {
            Ok(books) => {
                let index = TitleIndex::new(&books);
                if index.is_empty() && !self.config.create_missing_books {
                    tracing::warn!(batch_id = %batch_id, "Catalog has no books; every row will be unmatched");
                } else {
                    tracing::debug!(batch_id = %batch_id, titles = index.len(), "Loaded catalog titles");
                }
                Arc::new(RwLock::new(index))
            }
            Err(e) => {
                tracing::error!(batch_id = %batch_id, "Could not load catalog titles: {}", e);
                report.aborted = Some(e.to_string());
                return report.finish();
            }
        };

        if self.config.workers > 1 {
            self.run_concurrent(rows, titles, cancel, &mut report).await;
        } else {
            self.run_sequential(rows, titles, cancel, &mut report).await;
        }

        let report = report.finish();
        tracing::info!(
            batch_id = %batch_id,
            committed = report.committed,
            matched = report.matched,
            unmatched = report.unmatched,
            ambiguous = report.ambiguous,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Import batch finished"
        );
        report
    }

    async fn run_sequential(
        &self,
        rows: Vec<PendingRow>,
        titles: SharedIndex,
        cancel: CancellationToken,
        report: &mut BatchReport,
    ) {
        for pending in rows {
            if cancel.is_cancelled() {
                tracing::warn!(batch_id = %report.batch_id, row = pending.index, "Import cancelled");
                report.cancelled = true;
                break;
            }

            let (outcome, fatal) = self.process_row(pending, &titles).await;
            report.push(outcome);

            if let Some(detail) = fatal {
                tracing::error!(batch_id = %report.batch_id, "Aborting batch: {}", detail);
                report.aborted = Some(detail);
                break;
            }
        }
    }

    async fn run_concurrent(
        &self,
        rows: Vec<PendingRow>,
        titles: SharedIndex,
        cancel: CancellationToken,
        report: &mut BatchReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let stop = cancel.child_token();
        let mut tasks: JoinSet<Processed> = JoinSet::new();
        let mut stopped_early = false;

        for pending in rows {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = stop.cancelled() => {
                    stopped_early = true;
                    break;
                }
            };
            if stop.is_cancelled() {
                stopped_early = true;
                break;
            }

            let service = self.clone();
            let titles = titles.clone();
            let stop = stop.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let processed = service.process_row(pending, &titles).await;
                if processed.1.is_some() {
                    stop.cancel();
                }
                processed
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((outcome, fatal)) => {
                    report.push(outcome);
                    if let Some(detail) = fatal {
                        if report.aborted.is_none() {
                            tracing::error!(batch_id = %report.batch_id, "Aborting batch: {}", detail);
                            report.aborted = Some(detail);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(batch_id = %report.batch_id, "Import worker failed: {}", e);
                }
            }
        }

        if stopped_early && cancel.is_cancelled() {
            tracing::warn!(batch_id = %report.batch_id, "Import cancelled");
            report.cancelled = true;
        }
    }

    async fn process_row(&self, pending: PendingRow, titles: &RwLock<TitleIndex>) -> Processed {
        let mut outcome = RowOutcome::new(pending.index, pending.title);

        let row = match pending.row.and_then(|row| row.check().map(|_| row)) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(row = pending.index, "Skipping malformed row: {}", e);
                fail(&mut outcome, &e);
                return (outcome, None);
            }
        };

        let decision = self.matcher.decide(&*titles.read().await, &row.title);
        let mut creation_lock = None;

        let book_id = match decision {
            TitleMatch::Matched(candidate) => {
                outcome.stage = RowStage::TitleMatched;
                Some(candidate.book_id)
            }
            TitleMatch::Ambiguous(tied) => {
                self.report_ambiguous(&mut outcome, &row.title, &tied);
                return (outcome, None);
            }
            TitleMatch::NoMatch { best } if !self.config.create_missing_books => {
                self.report_unmatched(&mut outcome, &row.title, best.as_ref());
                return (outcome, None);
            }
            TitleMatch::NoMatch { .. } => {
                // Creations are serialized so concurrent rows never add the same title twice.
                let guard = titles.write().await;
                match self.matcher.decide(&guard, &row.title) {
                    TitleMatch::Matched(candidate) => {
                        outcome.stage = RowStage::TitleMatched;
                        Some(candidate.book_id)
                    }
                    TitleMatch::Ambiguous(tied) => {
                        self.report_ambiguous(&mut outcome, &row.title, &tied);
                        return (outcome, None);
                    }
                    TitleMatch::NoMatch { .. } => {
                        outcome.stage = RowStage::TitleUnmatched;
                        creation_lock = Some(guard);
                        None
                    }
                }
            }
        };

        let mut tx = match self.repository.begin().await {
            Ok(tx) => tx,
            Err(e) => return self.fail_row(outcome, e),
        };

        let applied = self.apply_row(&mut *tx, &mut outcome, &row, book_id).await;

        match applied {
            Ok(created) if self.config.dry_run => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(row = outcome.index, "Dry-run rollback failed: {}", e);
                }
                if created.is_some() {
                    outcome.book_id = None;
                }
                outcome.status = RowStatus::Matched;
                (outcome, None)
            }
            Ok(created) => {
                if let Err(e) = tx.commit().await {
                    return self.fail_row(outcome, e);
                }
                if let (Some(book), Some(mut index)) = (created, creation_lock) {
                    index.insert(&book);
                }
                outcome.stage = RowStage::Committed;
                outcome.status = RowStatus::Committed;
                tracing::debug!(
                    row = outcome.index,
                    book_id = ?outcome.book_id,
                    authors = outcome.author_ids.len(),
                    "Row committed"
                );
                (outcome, None)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(row = outcome.index, "Rollback failed: {}", rollback_err);
                }
                drop(creation_lock);
                self.fail_row(outcome, e)
            }
        }
    }

    /// Resolve authors and reconcile inside the row transaction.
    ///
    /// Returns the book created for an unmatched title, if any.
    async fn apply_row(
        &self,
        tx: &mut dyn CatalogTx,
        outcome: &mut RowOutcome,
        row: &ImportRow,
        book_id: Option<i32>,
    ) -> AppResult<Option<Book>> {
        let mut created = None;
        let book_id = match book_id {
            Some(id) => id,
            None => {
                let book = tx.insert_book(&BookTitle::from_raw(&row.title, None)).await?;
                tracing::info!(row = outcome.index, book_id = book.id, "Created book '{}'", book.title);
                outcome.book_created = true;
                let id = book.id;
                created = Some(book);
                id
            }
        };
        outcome.book_id = Some(book_id);

        let authors = self.authors.resolve_all(&mut *tx, &row.authors).await?;
        outcome.author_ids = authors.iter().map(|a| a.id).collect();
        outcome.stage = RowStage::AuthorsResolved;

        let diff = self
            .associations
            .reconcile(&mut *tx, book_id, &outcome.author_ids)
            .await?;
        outcome.diff = Some(diff);
        outcome.stage = RowStage::Associated;

        Ok(created)
    }

    fn report_ambiguous(&self, outcome: &mut RowOutcome, title: &str, tied: &[TitleCandidate]) {
        let err = AppError::AmbiguousTitleMatch {
            title: title.to_string(),
            candidates: tied.iter().map(|c| c.book_id).collect(),
        };
        tracing::info!(row = outcome.index, "{}", err);
        outcome.stage = RowStage::TitleAmbiguous;
        outcome.status = RowStatus::Ambiguous;
        outcome.candidates = tied.iter().map(CandidateSummary::from).collect();
        outcome.error_code = Some(err.code());
        outcome.detail = Some(err.to_string());
    }

    fn report_unmatched(&self, outcome: &mut RowOutcome, title: &str, best: Option<&TitleCandidate>) {
        let err = AppError::NoTitleMatch(match best {
            Some(c) => format!("'{}' (closest: '{}' at {:.3})", title, c.title, c.score),
            None => format!("'{}'", title),
        });
        tracing::info!(row = outcome.index, "{}", err);
        outcome.stage = RowStage::TitleUnmatched;
        outcome.status = RowStatus::Unmatched;
        outcome.candidates = best.map(CandidateSummary::from).into_iter().collect();
        outcome.error_code = Some(err.code());
        outcome.detail = Some(err.to_string());
    }

    fn fail_row(&self, mut outcome: RowOutcome, e: AppError) -> Processed {
        let e = e.into_transaction_failure();
        tracing::warn!(
            row = outcome.index,
            stage = ?outcome.stage,
            "Row failed: {}",
            e
        );
        fail(&mut outcome, &e);
        let fatal = e.is_fatal().then(|| e.to_string());
        (outcome, fatal)
    }
}

fn fail(outcome: &mut RowOutcome, e: &AppError) {
    outcome.status = RowStatus::Failed;
    outcome.error_code = Some(e.code());
    outcome.detail = Some(e.to_string());
}
