//! Data models for the catalog reconciler

pub mod author;
pub mod book;
pub mod book_author;
pub mod import_report;
pub mod import_row;

// Re-export commonly used types
pub use author::{Author, AuthorAttributes, AuthorCandidate, AuthorInput, NewAuthor};
pub use book::{Book, BookTitle};
pub use book_author::{AssociationDiff, BookAuthor, PositionChange};
pub use import_report::{BatchReport, CandidateSummary, RowOutcome, RowStage, RowStatus};
pub use import_row::ImportRow;
