//! Association service: set reconciliation of a book's author list

use indexmap::IndexSet;

use crate::{
    error::{AppError, AppResult},
    models::{AssociationDiff, AuthorInput, PositionChange},
    repository::{AssociationStore, BookStore, Repository},
    services::authors::AuthorRegistry,
};

#[derive(Clone)]
pub struct AssociationService {
    repository: Repository,
    authors: AuthorRegistry,
}

impl AssociationService {
    pub fn new(repository: Repository, authors: AuthorRegistry) -> Self {
        Self {
            repository,
            authors,
        }
    }

    /// Make the book's associations exactly `desired`, in that order.
    ///
    /// Runs inside the caller's transaction, so a failure part-way leaves
    /// nothing behind once the caller rolls back. Duplicate ids keep their
    /// first position. An empty list clears the book's authors.
    pub async fn reconcile<S>(
        &self,
        store: &mut S,
        book_id: i32,
        desired: &[i32],
    ) -> AppResult<AssociationDiff>
    where
        S: BookStore + AssociationStore + ?Sized,
    {
        let book = store
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;

        let desired: IndexSet<i32> = desired.iter().copied().collect();
        let current = store.lock_associations(book_id).await?;
        let mut diff = AssociationDiff::default();

        for row in current.iter().filter(|r| !desired.contains(&r.author_id)) {
            store.delete_association(book_id, row.author_id).await?;
            diff.removed.push(row.author_id);
        }

        for (idx, &author_id) in desired.iter().enumerate() {
            let position = i16::try_from(idx).map_err(|_| {
                AppError::Validation(format!("Book {} has too many authors", book_id))
            })?;

            match current.iter().find(|r| r.author_id == author_id) {
                Some(row) if row.position != position => {
                    store.update_position(book_id, author_id, position).await?;
                    diff.reordered.push(PositionChange {
                        author_id,
                        from: row.position,
                        to: position,
                    });
                }
                Some(_) => {}
                None => {
                    store.insert_association(book_id, author_id, position).await?;
                    diff.added.push(author_id);
                }
            }
        }

        if !diff.is_empty() || book.authors_reconciled_at.is_none() {
            store.mark_authors_reconciled(book_id).await?;
        }

        tracing::debug!(
            "Reconciled book id={}: +{} -{} ~{}",
            book_id,
            diff.added.len(),
            diff.removed.len(),
            diff.reordered.len()
        );

        Ok(diff)
    }

    /// Manual correction path for one book: resolve the given authors and
    /// reconcile, all in one transaction.
    pub async fn reconcile_book_authors(
        &self,
        book_id: i32,
        authors: &[AuthorInput],
    ) -> AppResult<AssociationDiff> {
        let mut tx = self.repository.begin().await?;

        let result = async {
            let resolved = self.authors.resolve_all(&mut *tx, authors).await?;
            let ids: Vec<i32> = resolved.iter().map(|a| a.id).collect();
            self.reconcile(&mut *tx, book_id, &ids).await
        }
        .await;

        match result {
            Ok(diff) => {
                tx.commit().await?;
                tracing::info!("Book id={} authors corrected", book_id);
                Ok(diff)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback failed for book id={}: {}", book_id, rollback_err);
                }
                Err(e)
            }
        }
    }
}
