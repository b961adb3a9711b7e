//! Typed import rows and their conversion from loosely shaped parser output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::author::AuthorInput;
use crate::error::{AppError, AppResult};
use crate::matching::normalize_title;

const TITLE_KEYS: &[&str] = &["title", "book_title", "book"];
const AUTHORS_KEYS: &[&str] = &["authors", "author", "author_names"];
const SITE_URL_KEYS: &[&str] = &["site_url", "url", "website", "author_site_url"];

/// One reconciliation unit: a title and its authors in listed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<AuthorInput>,
}

impl ImportRow {
    pub fn new(title: impl Into<String>, authors: Vec<AuthorInput>) -> Self {
        Self {
            title: title.into(),
            authors,
        }
    }

    /// Reject rows that cannot be matched at all.
    pub fn check(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::MalformedRow("Missing or empty title".to_string()));
        }
        if normalize_title(&self.title).is_empty() {
            return Err(AppError::MalformedRow(format!(
                "Title '{}' has no letters or digits",
                self.title.trim()
            )));
        }
        Ok(())
    }
}

/// Look a key up case-insensitively among several aliases.
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| keys.iter().any(|alias| k.trim().eq_ignore_ascii_case(alias)))
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn author_from_value(value: &Value) -> AppResult<Option<AuthorInput>> {
    match value {
        Value::String(name) if name.trim().is_empty() => Ok(None),
        Value::String(name) => Ok(Some(AuthorInput::new(name.trim()))),
        Value::Object(map) => {
            let name = lookup(map, &["name", "author", "full_name"])
                .and_then(as_text)
                .unwrap_or_default();
            if name.is_empty() {
                return Ok(None);
            }
            Ok(Some(AuthorInput {
                name,
                site_url: lookup(map, SITE_URL_KEYS).and_then(as_text),
                bio: lookup(map, &["bio"]).and_then(as_text),
                notes: lookup(map, &["notes"]).and_then(as_text),
            }))
        }
        Value::Null => Ok(None),
        other => Err(AppError::MalformedRow(format!("Unexpected author entry: {}", other))),
    }
}

/// Best-effort title of a raw row, for reporting rows that fail conversion.
pub fn raw_title(value: &Value) -> String {
    value
        .as_object()
        .and_then(|map| lookup(map, TITLE_KEYS))
        .and_then(as_text)
        .unwrap_or_default()
}

impl TryFrom<&Value> for ImportRow {
    type Error = AppError;

    /// Convert one parser row into a typed record.
    ///
    /// Authors may be an array of objects or strings, or a single string
    /// separated by `;` or `|`. Commas are kept since "Last, First" is a
    /// single name.
    fn try_from(value: &Value) -> AppResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| AppError::MalformedRow("Row is not an object".to_string()))?;

        let title = lookup(map, TITLE_KEYS)
            .and_then(as_text)
            .unwrap_or_default();

        let mut authors = Vec::new();
        match lookup(map, AUTHORS_KEYS) {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    authors.extend(author_from_value(entry)?);
                }
            }
            Some(Value::String(joined)) => {
                let row_url = lookup(map, SITE_URL_KEYS).and_then(as_text);
                let names: Vec<&str> = joined
                    .split([';', '|'])
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .collect();
                // A flat site_url column only makes sense with a single author.
                let single = names.len() == 1;
                for name in names {
                    let mut author = AuthorInput::new(name);
                    if single {
                        author.site_url = row_url.clone();
                    }
                    authors.push(author);
                }
            }
            Some(other) => authors.extend(author_from_value(other)?),
            None => {}
        }

        let row = ImportRow { title, authors };
        row.check()?;
        Ok(row)
    }
}
