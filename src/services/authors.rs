//! Author registry: dedup by normalized name and merge-if-blank upserts

use indexmap::IndexMap;
use rand::Rng;
use validator::Validate;

use crate::{
    config::{MatchConfig, RetryPolicy},
    error::{AppError, AppResult},
    matching::{normalize_author_name, similarity},
    models::{Author, AuthorAttributes, AuthorCandidate, AuthorInput, NewAuthor},
    repository::{AuthorStore, Repository},
};

#[derive(Clone)]
pub struct AuthorRegistry {
    repository: Repository,
    retry: RetryPolicy,
    matching: MatchConfig,
}

impl AuthorRegistry {
    pub fn new(repository: Repository, retry: RetryPolicy, matching: MatchConfig) -> Self {
        Self {
            repository,
            retry,
            matching,
        }
    }

    /// Look an author up by its normalized name
    pub async fn find<S>(&self, store: &mut S, normalized_name: &str) -> AppResult<Option<Author>>
    where
        S: AuthorStore + ?Sized,
    {
        store.find_author(normalized_name).await
    }

    /// Create the author or merge incoming attributes into the existing one.
    ///
    /// Creation relies on the unique key over `normalized_name`. When a
    /// concurrent writer wins the insert, the registry backs off, re-reads and
    /// merges into the winner's row, up to `max_attempts` tries in total.
    pub async fn upsert<S>(&self, store: &mut S, input: &AuthorInput) -> AppResult<Author>
    where
        S: AuthorStore + ?Sized,
    {
        let normalized_name = input.normalized_name();
        if normalized_name.is_empty() {
            return Err(AppError::Validation(format!(
                "Author name '{}' has no usable characters",
                input.name
            )));
        }

        let attributes = input.attributes();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(existing) = self.find(store, &normalized_name).await? {
                return self.merge(store, existing, &attributes).await;
            }

            let new_author = NewAuthor {
                name: input.name.trim().to_string(),
                normalized_name: normalized_name.clone(),
                attributes: attributes.clone(),
            };

            if let Some(created) = store.insert_author(&new_author).await? {
                tracing::debug!("Created author id={} key='{}'", created.id, created.normalized_name);
                return Ok(created);
            }

            tracing::warn!(
                "Author '{}' was created concurrently (attempt {}/{})",
                normalized_name,
                attempt,
                max_attempts
            );

            if attempt >= max_attempts {
                return Err(AppError::StorageConflict(format!(
                    "Author '{}' still conflicting after {} attempts",
                    input.name, attempt
                )));
            }

            let jitter = rand::thread_rng().gen_range(0..=self.retry.base_delay_ms / 2);
            let delay = self.retry.delay_for(attempt) + std::time::Duration::from_millis(jitter);
            tokio::time::sleep(delay).await;
        }
    }

    async fn merge<S>(
        &self,
        store: &mut S,
        existing: Author,
        attributes: &AuthorAttributes,
    ) -> AppResult<Author>
    where
        S: AuthorStore + ?Sized,
    {
        match attributes.merge_into(&existing) {
            Some(merged) => {
                tracing::debug!("Filling blank attributes of author id={}", existing.id);
                store.update_author(existing.id, &merged).await
            }
            None => Ok(existing),
        }
    }

    /// Resolve a row's authors in listed order.
    ///
    /// Blank names are skipped, an invalid site URL is dropped, and names that
    /// resolve to the same author keep only their first position.
    pub async fn resolve_all<S>(&self, store: &mut S, inputs: &[AuthorInput]) -> AppResult<Vec<Author>>
    where
        S: AuthorStore + ?Sized,
    {
        let mut resolved: IndexMap<i32, Author> = IndexMap::new();

        for input in inputs {
            if input.name.trim().is_empty() {
                continue;
            }

            let mut input = input.clone();
            if input.validate().is_err() {
                tracing::warn!(
                    "Dropping invalid site URL {:?} for author '{}'",
                    input.site_url,
                    input.name
                );
                input.site_url = None;
            }

            let author = self.upsert(store, &input).await?;
            resolved.entry(author.id).or_insert(author);
        }

        Ok(resolved.into_values().collect())
    }

    /// Read-only ranked author search
    pub async fn find_author(&self, query: &str) -> AppResult<Vec<AuthorCandidate>> {
        let key = normalize_author_name(query);
        if key.is_empty() {
            return Ok(Vec::new());
        }

        let authors = self.repository.list_authors().await?;

        let mut candidates: Vec<AuthorCandidate> = authors
            .into_iter()
            .filter_map(|author| {
                let sim = similarity::compare(&key, &author.normalized_name, &self.matching);
                (sim.score > 0.0).then(|| AuthorCandidate {
                    author_id: author.id,
                    name: author.name,
                    normalized_name: author.normalized_name,
                    score: sim.score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.normalized_name.cmp(&b.normalized_name))
                .then_with(|| a.author_id.cmp(&b.author_id))
        });
        candidates.truncate(self.matching.candidate_limit);

        Ok(candidates)
    }
}
