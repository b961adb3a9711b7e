//! Catalog reconciler
//!
//! Reconciles bulk book/author import rows against an existing catalog:
//! fuzzy title matching, author deduplication and book-author association sync.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared by the entry points
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
