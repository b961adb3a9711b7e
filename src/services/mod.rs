//! Business logic services

pub mod associations;
pub mod authors;
pub mod catalog;
pub mod import;

use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    error::AppResult,
    matching::{TitleCandidate, TitleMatcher},
    models::{AssociationDiff, AuthorCandidate, AuthorInput, BatchReport, ImportRow},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub authors: authors::AuthorRegistry,
    pub associations: associations::AssociationService,
    pub import: import::ImportService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let matcher = TitleMatcher::new(config.matching.clone());
        let authors = authors::AuthorRegistry::new(
            repository.clone(),
            config.authors.clone(),
            config.matching.clone(),
        );
        let associations = associations::AssociationService::new(repository.clone(), authors.clone());

        Self {
            catalog: catalog::CatalogService::new(repository.clone(), matcher.clone()),
            import: import::ImportService::new(
                repository,
                matcher,
                authors.clone(),
                associations.clone(),
                config.import.clone(),
            ),
            authors,
            associations,
        }
    }

    /// Ranked catalog books for a title
    pub async fn find_book_by_title(&self, query: &str) -> AppResult<Vec<TitleCandidate>> {
        self.catalog.find_book_by_title(query).await
    }

    /// Ranked authors for a name
    pub async fn find_author(&self, query: &str) -> AppResult<Vec<AuthorCandidate>> {
        self.authors.find_author(query).await
    }

    pub async fn import_batch(&self, rows: Vec<ImportRow>, cancel: CancellationToken) -> BatchReport {
        self.import.import_batch_with_cancel(rows, cancel).await
    }

    pub async fn reconcile_book_authors(
        &self,
        book_id: i32,
        authors: &[AuthorInput],
    ) -> AppResult<AssociationDiff> {
        self.associations.reconcile_book_authors(book_id, authors).await
    }
}
