//! Book-Author junction model (N:M relationship)

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Junction row linking a book to an author at a zero-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BookAuthor {
    pub book_id: i32,
    pub author_id: i32,
    pub position: i16,
}

/// An association that kept its row but moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
    pub author_id: i32,
    pub from: i16,
    pub to: i16,
}

/// Changes applied by one reconciliation of a book's author list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDiff {
    pub added: Vec<i32>,
    pub removed: Vec<i32>,
    pub reordered: Vec<PositionChange>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.reordered.is_empty()
    }
}
