//! Import pipeline tests against the in-memory catalog

use catalog_reconciler::{
    config::{AppConfig, DatabaseConfig, ImportConfig},
    error::ErrorCode,
    models::{AuthorInput, ImportRow, RowStage, RowStatus},
    repository::{memory::MemoryCatalog, CatalogStore, Repository},
    services::Services,
};
use serde_json::json;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn config(import: ImportConfig) -> AppConfig {
    AppConfig {
        database: DatabaseConfig::default(),
        logging: Default::default(),
        matching: Default::default(),
        authors: Default::default(),
        import,
    }
}

fn services(catalog: &MemoryCatalog) -> Services {
    services_with(catalog, ImportConfig::default())
}

fn services_with(catalog: &MemoryCatalog, import: ImportConfig) -> Services {
    Services::new(Repository::new(catalog.clone()), &config(import))
}

async fn author_names(catalog: &MemoryCatalog, book_id: i32) -> Vec<String> {
    assert_ok!(catalog.book_authors(book_id).await)
        .into_iter()
        .map(|(_, author)| author.name)
        .collect()
}

#[tokio::test]
async fn test_variant_title_and_author_reuse() {
    let catalog = MemoryCatalog::new();
    let book = catalog.seed_book("RPG Subfile Guide").await;
    let services = services(&catalog);

    let first = services
        .import_batch(
            vec![ImportRow::new("RPG Subfile Guide", vec![AuthorInput::new("Pete Helgren")])],
            CancellationToken::new(),
        )
        .await;
    assert_eq!(first.committed, 1);
    let helgren_id = first.rows[0].author_ids[0];

    let second = services
        .import_batch(
            vec![ImportRow::new(
                "rpg   subfile  guide",
                vec![AuthorInput::new("Helgren, Pete"), AuthorInput::new("Jane Doe")],
            )],
            CancellationToken::new(),
        )
        .await;

    let row = &second.rows[0];
    assert_eq!(row.status, RowStatus::Committed);
    assert_eq!(row.book_id, Some(book.id));
    assert_eq!(row.author_ids[0], helgren_id);
    assert_eq!(row.author_ids.len(), 2);

    let diff = row.diff.as_ref().unwrap();
    assert_eq!(diff.added, vec![row.author_ids[1]]);
    assert!(diff.removed.is_empty());
    assert!(diff.reordered.is_empty());

    assert_eq!(catalog.author_count().await, 2);
    assert_eq!(author_names(&catalog, book.id).await, vec!["Pete Helgren", "Jane Doe"]);
    let links = assert_ok!(catalog.book_authors(book.id).await);
    assert_eq!(links[1].0.position, 1);
}

#[tokio::test]
async fn test_malformed_row_is_isolated() {
    let catalog = MemoryCatalog::new();
    catalog.seed_book("Modern RPG IV Language").await;
    catalog.seed_book("Control Language Programming").await;
    let services = services(&catalog);

    let values = vec![
        json!({"title": "Modern RPG IV Language", "authors": [{"name": "Robert Cozzi"}]}),
        json!({"authors": [{"name": "Nobody"}]}),
        json!({"Title": "Control Language Programming", "authors": "Jane Doe; John Roe"}),
    ];
    let report = services.import.import_values(&values, CancellationToken::new()).await;

    assert_eq!(report.total, 3);
    assert_eq!(report.committed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.rows[0].status, RowStatus::Committed);
    assert_eq!(report.rows[1].status, RowStatus::Failed);
    assert_eq!(report.rows[1].error_code, Some(ErrorCode::MalformedRow));
    assert_eq!(report.rows[1].stage, RowStage::Pending);
    assert_eq!(report.rows[2].status, RowStatus::Committed);
    assert_eq!(report.rows[2].author_ids.len(), 2);
    assert_eq!(catalog.author_count().await, 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let catalog = MemoryCatalog::new();
    catalog.seed_book("Subfiles in RPG").await;
    let services = services(&catalog);
    let rows = vec![ImportRow::new(
        "Subfiles in RPG",
        vec![
            AuthorInput::new("Pete Helgren").with_site_url("https://helgren.example"),
            AuthorInput::new("Jane Doe"),
        ],
    )];

    let first = services.import_batch(rows.clone(), CancellationToken::new()).await;
    let second = services.import_batch(rows, CancellationToken::new()).await;

    assert_eq!(first.committed, 1);
    assert_eq!(second.committed, 1);
    assert_eq!(first.rows[0].author_ids, second.rows[0].author_ids);
    assert!(second.rows[0].diff.as_ref().unwrap().is_empty());
    assert_eq!(catalog.author_count().await, 2);
}

#[tokio::test]
async fn test_unmatched_and_ambiguous_rows_are_reported() {
    let catalog = MemoryCatalog::new();
    catalog.seed_book("RPG Subfile Guide").await;
    catalog.seed_book("Java for RPG Programmers").await;
    catalog.seed_book("Java for RPG Programmers").await;
    let services = services(&catalog);

    let report = services
        .import_batch(
            vec![
                ImportRow::new("Gardening for Beginners", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("java for rpg programmers", vec![AuthorInput::new("Phil Coulthard")]),
                ImportRow::new("RPG Subfile Guide", vec![AuthorInput::new("Pete Helgren")]),
            ],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.unmatched, 1);
    assert_eq!(report.ambiguous, 1);
    assert_eq!(report.committed, 1);
    assert_eq!(report.rows[0].status, RowStatus::Unmatched);
    assert_eq!(report.rows[0].error_code, Some(ErrorCode::NoTitleMatch));
    assert_eq!(report.rows[1].status, RowStatus::Ambiguous);
    assert_eq!(report.rows[1].candidates.len(), 2);
    assert_eq!(report.retryable_indices(), vec![0, 1]);

    // Skipped rows never touch the author table
    assert_eq!(catalog.author_count().await, 1);
}

#[tokio::test]
async fn test_failing_row_rolls_back_only_itself() {
    let catalog = MemoryCatalog::new();
    let book = catalog.seed_book("AS/400 Expert").await;
    let services = services(&catalog);
    catalog.fail_author_insert("John Roe");

    let report = services
        .import_batch(
            vec![
                ImportRow::new("AS/400 Expert", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new(
                    "AS/400 Expert",
                    vec![AuthorInput::new("Ann Other"), AuthorInput::new("John Roe")],
                ),
            ],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.committed, 1);
    assert_eq!(report.failed, 1);
    let failed = &report.rows[1];
    assert_eq!(failed.error_code, Some(ErrorCode::TransactionFailure));
    assert_eq!(failed.stage, RowStage::TitleMatched);
    assert!(report.aborted.is_none());

    assert_eq!(catalog.author_count().await, 1);
    assert_eq!(author_names(&catalog, book.id).await, vec!["Jane Doe"]);
}

#[tokio::test]
async fn test_connection_loss_aborts_remaining_rows() {
    let catalog = MemoryCatalog::new();
    catalog.seed_book("Book One").await;
    catalog.seed_book("Book Two").await;
    catalog.seed_book("Book Three").await;
    let services = services(&catalog);
    catalog.disconnect_after_commits(1);

    let report = services
        .import_batch(
            vec![
                ImportRow::new("Book One", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("Book Two", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("Book Three", vec![AuthorInput::new("Jane Doe")]),
            ],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.committed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.rows[1].error_code, Some(ErrorCode::ConnectionLost));
    assert!(report.aborted.is_some());
    assert!(!report.cancelled);
}

#[tokio::test]
async fn test_cancelled_batch_skips_rows() {
    let catalog = MemoryCatalog::new();
    catalog.seed_book("Book One").await;
    let services = services(&catalog);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = services
        .import_batch(
            vec![
                ImportRow::new("Book One", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("Book One", vec![AuthorInput::new("John Roe")]),
            ],
            cancel,
        )
        .await;

    assert!(report.cancelled);
    assert_eq!(report.skipped, 2);
    assert!(report.rows.is_empty());
    assert_eq!(catalog.author_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_workers_report_in_row_order() {
    let catalog = MemoryCatalog::new();
    let titles = ["Book One", "Book Two", "Book Three", "Book Four", "Book Five"];
    for title in titles {
        catalog.seed_book(title).await;
    }
    let services = services_with(
        &catalog,
        ImportConfig {
            workers: 3,
            ..ImportConfig::default()
        },
    );

    let rows = titles
        .iter()
        .map(|title| {
            ImportRow::new(
                *title,
                vec![AuthorInput::new("Jane Doe"), AuthorInput::new("Doe, Jane"), AuthorInput::new("John Roe")],
            )
        })
        .collect();
    let report = services.import_batch(rows, CancellationToken::new()).await;

    assert_eq!(report.committed, 5);
    let indices: Vec<usize> = report.rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert!(report.rows.iter().all(|r| r.author_ids.len() == 2));
    assert_eq!(catalog.author_count().await, 2);
}

#[tokio::test]
async fn test_manual_correction_and_lookup() {
    let catalog = MemoryCatalog::new();
    let services = services(&catalog);

    let book = assert_ok!(services.catalog.catalog_book("Subfile Tehcniques", None).await);
    let book = assert_ok!(
        services
            .catalog
            .correct_title(book.id, "Subfile Techniques: For RPG Programmers", None)
            .await
    );

    let found = assert_ok!(services.find_book_by_title("subfile techniques").await);
    assert_eq!(found[0].book_id, book.id);

    let diff = assert_ok!(
        services
            .reconcile_book_authors(book.id, &[AuthorInput::new("Kevin Vandever")])
            .await
    );
    assert_eq!(diff.added.len(), 1);

    let authors = assert_ok!(services.find_author("vandever kevin").await);
    assert_eq!(authors[0].name, "Kevin Vandever");
}

#[tokio::test]
async fn test_punctuation_variants_reach_catalog_titles() {
    let catalog = MemoryCatalog::new();
    let as400 = catalog.seed_book("AS/400 Expert").await;
    let subfile = catalog.seed_book("RPG Subfile Guide").await;
    let services = services(&catalog);

    let report = services
        .import_batch(
            vec![
                ImportRow::new("AS400 Expert", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("R.P.G. Subfile Guide", vec![AuthorInput::new("Pete Helgren")]),
            ],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.committed, 2);
    assert_eq!(report.unmatched, 0);
    assert_eq!(report.rows[0].book_id, Some(as400.id));
    assert_eq!(report.rows[1].book_id, Some(subfile.id));
}

#[tokio::test]
async fn test_titles_without_text_are_never_cataloged() {
    let catalog = MemoryCatalog::new();
    let services = services_with(
        &catalog,
        ImportConfig {
            create_missing_books: true,
            ..ImportConfig::default()
        },
    );

    let report = services
        .import_batch(
            vec![
                ImportRow::new("!!!", vec![AuthorInput::new("Jane Doe")]),
                ImportRow::new("!!!", vec![AuthorInput::new("Jane Doe")]),
            ],
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.failed, 2);
    assert!(report
        .rows
        .iter()
        .all(|r| r.error_code == Some(ErrorCode::MalformedRow) && !r.book_created));
    assert_eq!(catalog.book_count().await, 0);
    assert_eq!(catalog.author_count().await, 0);
}
