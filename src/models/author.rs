//! Author model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::matching::{normalize::non_blank, normalize_author_name};

/// Full author model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Author {
    pub id: i32,
    pub name: String,
    pub normalized_name: String,
    pub site_url: Option<String>,
    pub bio: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional enrichment fields merged with the merge-if-blank policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorAttributes {
    pub site_url: Option<String>,
    pub bio: Option<String>,
    pub notes: Option<String>,
}

impl AuthorAttributes {
    /// Blank strings collapse to `None`.
    pub fn cleaned(&self) -> Self {
        Self {
            site_url: non_blank(self.site_url.as_deref()),
            bio: non_blank(self.bio.as_deref()),
            notes: non_blank(self.notes.as_deref()),
        }
    }

    /// Fill the blank fields of `existing` from `self`.
    ///
    /// Returns the merged attributes when at least one field changed.
    pub fn merge_into(&self, existing: &Author) -> Option<AuthorAttributes> {
        let incoming = self.cleaned();
        let fill = |current: &Option<String>, new: Option<String>| match non_blank(current.as_deref()) {
            Some(value) => Some(value),
            None => new,
        };

        let merged = AuthorAttributes {
            site_url: fill(&existing.site_url, incoming.site_url),
            bio: fill(&existing.bio, incoming.bio),
            notes: fill(&existing.notes, incoming.notes),
        };

        let current = AuthorAttributes {
            site_url: existing.site_url.clone(),
            bio: existing.bio.clone(),
            notes: existing.notes.clone(),
        };

        (merged != current).then_some(merged)
    }
}

/// One author as listed on an import row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthorInput {
    #[validate(length(min = 1, message = "Author name cannot be empty"))]
    pub name: String,
    #[validate(url(message = "Invalid author site URL"))]
    #[serde(default, alias = "url", alias = "website")]
    pub site_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AuthorInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_url: None,
            bio: None,
            notes: None,
        }
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_author_name(&self.name)
    }

    pub fn attributes(&self) -> AuthorAttributes {
        AuthorAttributes {
            site_url: self.site_url.clone(),
            bio: self.bio.clone(),
            notes: self.notes.clone(),
        }
        .cleaned()
    }
}

/// Insert payload for a new author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthor {
    pub name: String,
    pub normalized_name: String,
    pub attributes: AuthorAttributes,
}

/// Ranked author for a lookup query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorCandidate {
    pub author_id: i32,
    pub name: String,
    pub normalized_name: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn author(site_url: Option<&str>, bio: Option<&str>) -> Author {
        let now = Utc::now();
        Author {
            id: 1,
            name: "Pete Helgren".into(),
            normalized_name: "helgren pete".into(),
            site_url: site_url.map(Into::into),
            bio: bio.map(Into::into),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_merge_keeps_existing_values() {
        let incoming = AuthorAttributes {
            site_url: Some("".into()),
            bio: Some("New bio".into()),
            notes: None,
        };
        let merged = incoming
            .merge_into(&author(Some("https://example.org"), None))
            .expect("bio should be filled");
        assert_eq!(merged.site_url.as_deref(), Some("https://example.org"));
        assert_eq!(merged.bio.as_deref(), Some("New bio"));
    }

    #[test]
    fn test_merge_never_overwrites_non_blank() {
        let incoming = AuthorAttributes {
            site_url: Some("https://other.example".into()),
            ..Default::default()
        };
        assert_eq!(incoming.merge_into(&author(Some("https://example.org"), None)), None);
    }

    #[test]
    fn test_merge_fills_blank_existing() {
        let incoming = AuthorAttributes {
            site_url: Some(" https://example.org ".into()),
            ..Default::default()
        };
        let merged = incoming.merge_into(&author(Some("  "), None)).unwrap();
        assert_eq!(merged.site_url.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn test_author_input_validation() {
        assert!(AuthorInput::new("Jane Doe").validate().is_ok());
        assert!(AuthorInput::new("").validate().is_err());
        assert!(AuthorInput::new("Jane Doe")
            .with_site_url("not a url")
            .validate()
            .is_err());
    }
}
