//! Fuzzy matching of import titles against a catalog snapshot.
//!
//! The matcher holds no state besides its tunables; every call works on the
//! [`TitleIndex`] it is handed, so matching is safe to run from many rows at once.

use std::cmp::Ordering;

use serde::Serialize;

use super::normalize::title_forms;
use super::similarity::{best_of, Similarity};
use crate::config::MatchConfig;
use crate::models::book::Book;

/// Scores closer than this are treated as a tie.
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct IndexedTitle {
    book_id: i32,
    title: String,
    normalized_title: String,
    forms: Vec<String>,
}

/// Read-only snapshot of catalog titles prepared for matching
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    entries: Vec<IndexedTitle>,
}

impl TitleIndex {
    pub fn new(books: &[Book]) -> Self {
        let mut index = Self::default();
        for book in books {
            index.insert(book);
        }
        index
    }

    /// Add a book to the snapshot (used when a batch catalogs new books).
    pub fn insert(&mut self, book: &Book) {
        let mut forms = title_forms(&book.title);
        if !forms.contains(&book.normalized_title) {
            forms.insert(0, book.normalized_title.clone());
        }

        self.entries.push(IndexedTitle {
            book_id: book.id,
            title: book.title.clone(),
            normalized_title: book.normalized_title.clone(),
            forms,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A ranked catalog book for a query title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleCandidate {
    pub book_id: i32,
    pub title: String,
    pub normalized_title: String,
    pub score: f64,
    pub distance: usize,
}

/// Decision for a single query title
#[derive(Debug, Clone, PartialEq)]
pub enum TitleMatch {
    Matched(TitleCandidate),
    /// Several books share the best score at or above the threshold
    Ambiguous(Vec<TitleCandidate>),
    /// Nothing reached the threshold; `best` is the closest book, if any
    NoMatch { best: Option<TitleCandidate> },
}

#[derive(Debug, Clone)]
pub struct TitleMatcher {
    config: MatchConfig,
}

impl TitleMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Score every book in the index, best first.
    ///
    /// Ordering is score descending, then edit distance, then normalized
    /// title, then book id, so the result never depends on storage order.
    pub fn rank(&self, index: &TitleIndex, query: &str) -> Vec<TitleCandidate> {
        let query_forms: Vec<String> = title_forms(query)
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect();
        if query_forms.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<TitleCandidate> = index
            .entries
            .iter()
            .filter_map(|entry| {
                let Similarity { score, distance } =
                    best_of(&query_forms, &entry.forms, &self.config)?;
                (score > 0.0).then(|| TitleCandidate {
                    book_id: entry.book_id,
                    title: entry.title.clone(),
                    normalized_title: entry.normalized_title.clone(),
                    score,
                    distance,
                })
            })
            .collect();

        candidates.sort_by(compare_candidates);
        candidates
    }

    /// Ranked candidates truncated to the configured limit.
    pub fn top(&self, index: &TitleIndex, query: &str) -> Vec<TitleCandidate> {
        let mut ranked = self.rank(index, query);
        ranked.truncate(self.config.candidate_limit);
        ranked
    }

    /// Apply the acceptance threshold and the tie policy to a query.
    pub fn decide(&self, index: &TitleIndex, query: &str) -> TitleMatch {
        let ranked = self.rank(index, query);

        let Some(best) = ranked.first() else {
            return TitleMatch::NoMatch { best: None };
        };

        if best.score + SCORE_EPSILON < self.config.acceptance_threshold {
            return TitleMatch::NoMatch {
                best: Some(best.clone()),
            };
        }

        let top_score = best.score;
        let tied: Vec<TitleCandidate> = ranked
            .iter()
            .take_while(|c| (top_score - c.score).abs() <= SCORE_EPSILON)
            .cloned()
            .collect();

        if tied.len() > 1 {
            TitleMatch::Ambiguous(tied)
        } else {
            TitleMatch::Matched(best.clone())
        }
    }
}

fn compare_candidates(a: &TitleCandidate, b: &TitleCandidate) -> Ordering {
    if (a.score - b.score).abs() > SCORE_EPSILON {
        return b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal);
    }
    a.distance
        .cmp(&b.distance)
        .then_with(|| a.normalized_title.cmp(&b.normalized_title))
        .then_with(|| a.book_id.cmp(&b.book_id))
}
