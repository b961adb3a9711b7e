//! Repository layer for catalog storage
//!
//! Services never talk to a database handle directly. They receive a
//! [`Repository`], open a [`CatalogTx`] per unit of work and go through the
//! book, author and association stores it exposes. Postgres backs production;
//! [`memory::MemoryCatalog`] backs tests.

pub mod memory;
pub mod postgres;

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{Author, AuthorAttributes, Book, BookAuthor, BookTitle, NewAuthor},
};

/// Book access inside a transaction
#[async_trait]
pub trait BookStore: Send {
    async fn get_book(&mut self, id: i32) -> AppResult<Option<Book>>;

    async fn insert_book(&mut self, title: &BookTitle) -> AppResult<Book>;

    async fn update_book_title(&mut self, id: i32, title: &BookTitle) -> AppResult<Book>;

    /// Record that the book's author list now reflects a reconciliation.
    async fn mark_authors_reconciled(&mut self, id: i32) -> AppResult<()>;
}

/// Author access inside a transaction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorStore: Send {
    async fn find_author(&mut self, normalized_name: &str) -> AppResult<Option<Author>>;

    /// Insert an author unless its normalized name is already taken.
    ///
    /// Returns `None` when the unique key on `normalized_name` rejected the row,
    /// which happens when another writer created the same author first.
    async fn insert_author(&mut self, author: &NewAuthor) -> AppResult<Option<Author>>;

    async fn update_author(&mut self, id: i32, attributes: &AuthorAttributes) -> AppResult<Author>;
}

/// Book-author junction access inside a transaction
#[async_trait]
pub trait AssociationStore: Send {
    /// Current associations for a book, ordered by position, locking the book
    /// against concurrent reconciliation until the transaction ends.
    async fn lock_associations(&mut self, book_id: i32) -> AppResult<Vec<BookAuthor>>;

    async fn insert_association(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()>;

    async fn delete_association(&mut self, book_id: i32, author_id: i32) -> AppResult<()>;

    async fn update_position(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()>;
}

/// One unit of work over all three tables
#[async_trait]
pub trait CatalogTx: BookStore + AuthorStore + AssociationStore {
    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Entry point to a catalog backend
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn CatalogTx>>;

    /// Snapshot of every book, for building a title index
    async fn list_books(&self) -> AppResult<Vec<Book>>;

    async fn list_authors(&self) -> AppResult<Vec<Author>>;

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    /// Authors of a book in position order
    async fn book_authors(&self, book_id: i32) -> AppResult<Vec<(BookAuthor, Author)>>;
}

/// Shared handle on the catalog backend
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn CatalogStore>,
}

impl Repository {
    pub fn new(store: impl CatalogStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Repository over a Postgres pool
    pub fn postgres(pool: sqlx::PgPool, statement_timeout_ms: u64) -> Self {
        Self::new(postgres::PgCatalog::new(pool, statement_timeout_ms))
    }
}

impl Deref for Repository {
    type Target = dyn CatalogStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}
