//! In-memory catalog backend for tests and dry tooling.
//!
//! A transaction holds the catalog lock for its whole lifetime and works on a
//! private copy of the tables; commit swaps the copy in, rollback drops it.
//! Faults can be injected to exercise failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{AssociationStore, AuthorStore, BookStore, CatalogStore, CatalogTx};
use crate::{
    error::{AppError, AppResult},
    matching::normalize_author_name,
    models::{Author, AuthorAttributes, Book, BookAuthor, BookTitle, NewAuthor},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    last_book_id: i32,
    last_author_id: i32,
    books: BTreeMap<i32, Book>,
    authors: BTreeMap<i32, Author>,
    associations: Vec<BookAuthor>,
}

impl Tables {
    fn insert_book(&mut self, title: &BookTitle) -> Book {
        self.last_book_id += 1;
        let now = Utc::now();
        let book = Book {
            id: self.last_book_id,
            title: title.title.clone(),
            normalized_title: title.normalized_title.clone(),
            subtitle: title.subtitle.clone(),
            authors_reconciled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.books.insert(book.id, book.clone());
        book
    }
}

#[derive(Debug, Default)]
struct Faults {
    failing_author_keys: HashSet<String>,
    commits_before_disconnect: Option<usize>,
    disconnected: bool,
}

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        lock_faults(&self.faults)
    }

    fn check_connected(&self) -> AppResult<()> {
        if self.faults().disconnected {
            return Err(AppError::ConnectionLost("memory catalog disconnected".to_string()));
        }
        Ok(())
    }

    /// Catalog a book outside any import, as the document ingester would.
    pub async fn seed_book(&self, title: &str) -> Book {
        self.tables
            .lock()
            .await
            .insert_book(&BookTitle::from_raw(title, None))
    }

    /// Make every insert of this author fail with a transaction error.
    pub fn fail_author_insert(&self, name: &str) {
        self.faults()
            .failing_author_keys
            .insert(normalize_author_name(name));
    }

    /// Drop the connection once this many further transactions have committed.
    pub fn disconnect_after_commits(&self, commits: usize) {
        let mut faults = self.faults();
        if commits == 0 {
            faults.disconnected = true;
        } else {
            faults.commits_before_disconnect = Some(commits);
        }
    }

    pub async fn author_count(&self) -> usize {
        self.tables.lock().await.authors.len()
    }

    pub async fn book_count(&self) -> usize {
        self.tables.lock().await.books.len()
    }
}

fn lock_faults(faults: &Mutex<Faults>) -> MutexGuard<'_, Faults> {
    faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn begin(&self) -> AppResult<Box<dyn CatalogTx>> {
        self.check_connected()?;
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            faults: self.faults.clone(),
        }))
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.check_connected()?;
        Ok(self.tables.lock().await.books.values().cloned().collect())
    }

    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.check_connected()?;
        Ok(self.tables.lock().await.authors.values().cloned().collect())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        self.check_connected()?;
        Ok(self.tables.lock().await.books.get(&id).cloned())
    }

    async fn book_authors(&self, book_id: i32) -> AppResult<Vec<(BookAuthor, Author)>> {
        self.check_connected()?;
        let tables = self.tables.lock().await;
        let mut rows: Vec<(BookAuthor, Author)> = tables
            .associations
            .iter()
            .filter(|a| a.book_id == book_id)
            .filter_map(|a| tables.authors.get(&a.author_id).map(|author| (a.clone(), author.clone())))
            .collect();
        rows.sort_by_key(|(a, _)| a.position);
        Ok(rows)
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryTx {
    fn check_connected(&self) -> AppResult<()> {
        if lock_faults(&self.faults).disconnected {
            return Err(AppError::ConnectionLost("memory catalog disconnected".to_string()));
        }
        Ok(())
    }

    fn association_mut(&mut self, book_id: i32, author_id: i32) -> AppResult<&mut BookAuthor> {
        self.work
            .associations
            .iter_mut()
            .find(|a| a.book_id == book_id && a.author_id == author_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Association {}/{} not found", book_id, author_id))
            })
    }
}

#[async_trait]
impl BookStore for MemoryTx {
    async fn get_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        self.check_connected()?;
        Ok(self.work.books.get(&id).cloned())
    }

    async fn insert_book(&mut self, title: &BookTitle) -> AppResult<Book> {
        self.check_connected()?;
        Ok(self.work.insert_book(title))
    }

    async fn update_book_title(&mut self, id: i32, title: &BookTitle) -> AppResult<Book> {
        self.check_connected()?;
        let book = self
            .work
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;
        book.title = title.title.clone();
        book.normalized_title = title.normalized_title.clone();
        book.subtitle = title.subtitle.clone();
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn mark_authors_reconciled(&mut self, id: i32) -> AppResult<()> {
        self.check_connected()?;
        if let Some(book) = self.work.books.get_mut(&id) {
            let now = Utc::now();
            book.authors_reconciled_at = Some(now);
            book.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorStore for MemoryTx {
    async fn find_author(&mut self, normalized_name: &str) -> AppResult<Option<Author>> {
        self.check_connected()?;
        Ok(self
            .work
            .authors
            .values()
            .find(|a| a.normalized_name == normalized_name)
            .cloned())
    }

    async fn insert_author(&mut self, author: &NewAuthor) -> AppResult<Option<Author>> {
        self.check_connected()?;
        if lock_faults(&self.faults)
            .failing_author_keys
            .contains(&author.normalized_name)
        {
            return Err(AppError::TransactionFailure(format!(
                "insert of author '{}' rejected",
                author.name
            )));
        }

        if self
            .work
            .authors
            .values()
            .any(|a| a.normalized_name == author.normalized_name)
        {
            return Ok(None);
        }

        self.work.last_author_id += 1;
        let now = Utc::now();
        let created = Author {
            id: self.work.last_author_id,
            name: author.name.clone(),
            normalized_name: author.normalized_name.clone(),
            site_url: author.attributes.site_url.clone(),
            bio: author.attributes.bio.clone(),
            notes: author.attributes.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.work.authors.insert(created.id, created.clone());
        Ok(Some(created))
    }

    async fn update_author(&mut self, id: i32, attributes: &AuthorAttributes) -> AppResult<Author> {
        self.check_connected()?;
        let author = self
            .work
            .authors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Author {} not found", id)))?;
        author.site_url = attributes.site_url.clone();
        author.bio = attributes.bio.clone();
        author.notes = attributes.notes.clone();
        author.updated_at = Utc::now();
        Ok(author.clone())
    }
}

#[async_trait]
impl AssociationStore for MemoryTx {
    async fn lock_associations(&mut self, book_id: i32) -> AppResult<Vec<BookAuthor>> {
        self.check_connected()?;
        let mut rows: Vec<BookAuthor> = self
            .work
            .associations
            .iter()
            .filter(|a| a.book_id == book_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.position, a.author_id));
        Ok(rows)
    }

    async fn insert_association(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()> {
        self.check_connected()?;
        if self.association_mut(book_id, author_id).is_ok() {
            return Err(AppError::StorageConflict(format!(
                "Association {}/{} already exists",
                book_id, author_id
            )));
        }
        self.work.associations.push(BookAuthor {
            book_id,
            author_id,
            position,
        });
        Ok(())
    }

    async fn delete_association(&mut self, book_id: i32, author_id: i32) -> AppResult<()> {
        self.check_connected()?;
        self.work
            .associations
            .retain(|a| !(a.book_id == book_id && a.author_id == author_id));
        Ok(())
    }

    async fn update_position(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()> {
        self.check_connected()?;
        self.association_mut(book_id, author_id)?.position = position;
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.check_connected()?;
        let MemoryTx {
            mut guard,
            work,
            faults,
        } = *self;
        *guard = work;

        let mut faults = lock_faults(&faults);
        if let Some(remaining) = faults.commits_before_disconnect.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.commits_before_disconnect = None;
                faults.disconnected = true;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
