//! Postgres catalog backend.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{AssociationStore, AuthorStore, BookStore, CatalogStore, CatalogTx};
use crate::{
    error::{AppError, AppResult},
    models::{Author, AuthorAttributes, Book, BookAuthor, BookTitle, NewAuthor},
};

const BOOK_COLUMNS: &str =
    "id, title, normalized_title, subtitle, authors_reconciled_at, created_at, updated_at";

const AUTHOR_COLUMNS: &str =
    "id, name, normalized_name, site_url, bio, notes, created_at, updated_at";

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgCatalog {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn begin(&self) -> AppResult<Box<dyn CatalogTx>> {
        let mut tx = self.pool.begin().await?;

        if self.statement_timeout_ms > 0 {
            sqlx::query(&format!(
                "SET LOCAL statement_timeout = {}",
                self.statement_timeout_ms
            ))
            .execute(&mut *tx)
            .await?;
        }

        Ok(Box::new(PgCatalogTx { tx }))
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn list_authors(&self) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(&format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn book_authors(&self, book_id: i32) -> AppResult<Vec<(BookAuthor, Author)>> {
        let rows = sqlx::query(
            r#"
            SELECT ba.book_id, ba.author_id, ba.position,
                   a.id, a.name, a.normalized_name, a.site_url, a.bio, a.notes,
                   a.created_at, a.updated_at
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = $1
            ORDER BY ba.position
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    BookAuthor {
                        book_id: r.get("book_id"),
                        author_id: r.get("author_id"),
                        position: r.get("position"),
                    },
                    Author {
                        id: r.get("id"),
                        name: r.get("name"),
                        normalized_name: r.get("normalized_name"),
                        site_url: r.get("site_url"),
                        bio: r.get("bio"),
                        notes: r.get("notes"),
                        created_at: r.get("created_at"),
                        updated_at: r.get("updated_at"),
                    },
                )
            })
            .collect())
    }
}

pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookStore for PgCatalogTx {
    async fn get_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn insert_book(&mut self, title: &BookTitle) -> AppResult<Book> {
        let now = Utc::now();
        let book = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, normalized_title, subtitle, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(&title.title)
        .bind(&title.normalized_title)
        .bind(&title.subtitle)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn update_book_title(&mut self, id: i32, title: &BookTitle) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = $1,
                normalized_title = $2,
                subtitle = $3,
                updated_at = $4
            WHERE id = $5
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(&title.title)
        .bind(&title.normalized_title)
        .bind(&title.subtitle)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    async fn mark_authors_reconciled(&mut self, id: i32) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE books SET authors_reconciled_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthorStore for PgCatalogTx {
    async fn find_author(&mut self, normalized_name: &str) -> AppResult<Option<Author>> {
        let author = sqlx::query_as::<_, Author>(&format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors WHERE normalized_name = $1"
        ))
        .bind(normalized_name)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(author)
    }

    async fn insert_author(&mut self, author: &NewAuthor) -> AppResult<Option<Author>> {
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Author>(&format!(
            r#"
            INSERT INTO authors (name, normalized_name, site_url, bio, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (normalized_name) DO NOTHING
            RETURNING {AUTHOR_COLUMNS}
            "#
        ))
        .bind(&author.name)
        .bind(&author.normalized_name)
        .bind(&author.attributes.site_url)
        .bind(&author.attributes.bio)
        .bind(&author.attributes.notes)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(inserted)
    }

    async fn update_author(&mut self, id: i32, attributes: &AuthorAttributes) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!(
            r#"
            UPDATE authors SET
                site_url = $1,
                bio = $2,
                notes = $3,
                updated_at = $4
            WHERE id = $5
            RETURNING {AUTHOR_COLUMNS}
            "#
        ))
        .bind(&attributes.site_url)
        .bind(&attributes.bio)
        .bind(&attributes.notes)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Author {} not found", id)))
    }
}

#[async_trait]
impl AssociationStore for PgCatalogTx {
    async fn lock_associations(&mut self, book_id: i32) -> AppResult<Vec<BookAuthor>> {
        // Lock the parent row so two reconciliations of one book serialize.
        sqlx::query("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let rows = sqlx::query_as::<_, BookAuthor>(
            "SELECT book_id, author_id, position FROM book_authors WHERE book_id = $1 ORDER BY position, author_id",
        )
        .bind(book_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn insert_association(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()> {
        sqlx::query("INSERT INTO book_authors (book_id, author_id, position) VALUES ($1, $2, $3)")
            .bind(book_id)
            .bind(author_id)
            .bind(position)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_association(&mut self, book_id: i32, author_id: i32) -> AppResult<()> {
        sqlx::query("DELETE FROM book_authors WHERE book_id = $1 AND author_id = $2")
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_position(&mut self, book_id: i32, author_id: i32, position: i16) -> AppResult<()> {
        sqlx::query("UPDATE book_authors SET position = $1 WHERE book_id = $2 AND author_id = $3")
            .bind(position)
            .bind(book_id)
            .bind(author_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
