//! Postgres backend tests
//!
//! These need a live database. Run with:
//! `DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored`

use catalog_reconciler::{
    config::{MatchConfig, RetryPolicy},
    matching::TitleMatcher,
    models::{AuthorInput, ImportRow, RowStatus},
    repository::{CatalogStore, CatalogTx, Repository},
    services::{
        associations::AssociationService, authors::AuthorRegistry, catalog::CatalogService,
        import::ImportService,
    },
};
use sqlx::postgres::PgPoolOptions;
use tokio_test::assert_ok;
use uuid::Uuid;

async fn repository() -> Repository {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Repository::postgres(pool, 5_000)
}

fn registry(repository: &Repository) -> AuthorRegistry {
    AuthorRegistry::new(repository.clone(), RetryPolicy::default(), MatchConfig::default())
}

/// Unique suffix so runs against a shared database do not collide
fn tag() -> String {
    Uuid::new_v4().simple().to_string()
}

#[tokio::test]
#[ignore]
async fn test_import_round_trip() {
    let repository = repository().await;
    let authors = registry(&repository);
    let associations = AssociationService::new(repository.clone(), authors.clone());
    let catalog = CatalogService::new(repository.clone(), TitleMatcher::new(MatchConfig::default()));
    let import = ImportService::new(
        repository.clone(),
        TitleMatcher::new(MatchConfig::default()),
        authors,
        associations,
        Default::default(),
    );

    let tag = tag();
    let title = format!("RPG Subfile Guide {}", tag);
    let book = assert_ok!(catalog.catalog_book(&title, None).await);

    let report = import
        .import_batch(vec![ImportRow::new(
            title.to_uppercase(),
            vec![
                AuthorInput::new(format!("Pete Helgren {}", tag)),
                AuthorInput::new(format!("Jane Doe {}", tag)),
            ],
        )])
        .await;

    assert_eq!(report.rows[0].status, RowStatus::Committed);
    assert_eq!(report.rows[0].book_id, Some(book.id));

    let linked = assert_ok!(repository.book_authors(book.id).await);
    assert_eq!(linked.len(), 2);
    assert_eq!(linked[0].0.position, 0);
    assert_eq!(linked[1].0.position, 1);

    let book = assert_ok!(catalog.get_book(book.id).await);
    assert!(book.authors_reconciled_at.is_some());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_author_creation_converges() {
    let repository = repository().await;
    let registry = registry(&repository);
    let input = AuthorInput::new(format!("Race Author {}", tag())).with_site_url("https://race.example");

    let mut first = assert_ok!(repository.begin().await);
    let created = assert_ok!(registry.upsert(&mut *first, &input).await);

    // The second insert blocks on the unique key until the first commits,
    // then loses and merges into the winner.
    let second = {
        let repository = repository.clone();
        let registry = registry.clone();
        let input = input.clone();
        tokio::spawn(async move {
            let mut tx = repository.begin().await?;
            let author = registry.upsert(&mut *tx, &input).await?;
            tx.commit().await?;
            Ok::<_, catalog_reconciler::AppError>(author)
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_ok!(first.commit().await);

    let merged = assert_ok!(second.await.expect("task panicked"));
    assert_eq!(merged.id, created.id);
}
