//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::matching::{normalize_title, split_subtitle};

/// Canonical catalog book
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub normalized_title: String,
    pub subtitle: Option<String>,
    /// Set once the author list has been reconciled at least once (possibly to empty)
    pub authors_reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written when a book is cataloged or its title corrected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookTitle {
    pub title: String,
    pub normalized_title: String,
    pub subtitle: Option<String>,
}

impl BookTitle {
    /// Derive the stored title fields from a raw title.
    ///
    /// The subtitle is the text after the first colon unless one is given.
    pub fn from_raw(raw: &str, subtitle: Option<&str>) -> Self {
        let title = raw.trim().to_string();
        let subtitle = subtitle
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| split_subtitle(&title).1.map(str::to_string));

        Self {
            normalized_title: normalize_title(&title),
            title,
            subtitle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_title_from_raw() {
        let t = BookTitle::from_raw("  Programming Rust: Fast, Safe Systems ", None);
        assert_eq!(t.title, "Programming Rust: Fast, Safe Systems");
        assert_eq!(t.normalized_title, "programming rust fast safe systems");
        assert_eq!(t.subtitle.as_deref(), Some("Fast, Safe Systems"));

        let t = BookTitle::from_raw("RPG Subfile Guide", Some(" "));
        assert_eq!(t.subtitle, None);
    }
}
