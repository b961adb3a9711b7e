//! Catalog service: book lookup, cataloging and title correction

use crate::{
    error::{AppError, AppResult},
    matching::{TitleCandidate, TitleIndex, TitleMatch, TitleMatcher},
    models::{Author, Book, BookAuthor, BookTitle},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    matcher: TitleMatcher,
}

impl CatalogService {
    pub fn new(repository: Repository, matcher: TitleMatcher) -> Self {
        Self {
            repository,
            matcher,
        }
    }

    /// Snapshot of the current catalog titles
    pub async fn title_index(&self) -> AppResult<TitleIndex> {
        let books = self.repository.list_books().await?;
        Ok(TitleIndex::new(&books))
    }

    /// Ranked candidates for manual review tooling
    pub async fn find_book_by_title(&self, query: &str) -> AppResult<Vec<TitleCandidate>> {
        let index = self.title_index().await?;
        Ok(self.matcher.top(&index, query))
    }

    /// Apply the match policy to a single title against the live catalog
    pub async fn match_title(&self, query: &str) -> AppResult<TitleMatch> {
        let index = self.title_index().await?;
        Ok(self.matcher.decide(&index, query))
    }

    /// Get a book by ID
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    /// Authors of a book in position order
    pub async fn book_authors(&self, book_id: i32) -> AppResult<Vec<(BookAuthor, Author)>> {
        self.get_book(book_id).await?;
        self.repository.book_authors(book_id).await
    }

    /// Add a book to the catalog
    pub async fn catalog_book(&self, title: &str, subtitle: Option<&str>) -> AppResult<Book> {
        let title = Self::validated_title(title, subtitle)?;

        let mut tx = self.repository.begin().await?;
        let book = match tx.insert_book(&title).await {
            Ok(book) => book,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback failed while cataloging '{}': {}", title.title, rollback_err);
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!("Cataloged book id={} '{}'", book.id, book.title);
        Ok(book)
    }

    /// Correct a book's title; the normalized key follows the new title
    pub async fn correct_title(
        &self,
        book_id: i32,
        title: &str,
        subtitle: Option<&str>,
    ) -> AppResult<Book> {
        let title = Self::validated_title(title, subtitle)?;

        let mut tx = self.repository.begin().await?;
        let book = match tx.update_book_title(book_id, &title).await {
            Ok(book) => book,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback failed for book id={}: {}", book_id, rollback_err);
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!("Corrected title of book id={} to '{}'", book.id, book.title);
        Ok(book)
    }

    fn validated_title(title: &str, subtitle: Option<&str>) -> AppResult<BookTitle> {
        let title = BookTitle::from_raw(title, subtitle);
        if title.normalized_title.is_empty() {
            return Err(AppError::Validation("Book title cannot be empty".to_string()));
        }
        Ok(title)
    }
}
