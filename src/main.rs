//! Catalog reconciler - batch import entry point
//!
//! Usage: `catalog-reconciler <rows.json>`
//!
//! Reads a JSON array of import rows, reconciles it against the catalog and
//! prints the batch report as JSON. Ctrl-C stops the batch between rows.

use anyhow::Context;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_reconciler::{config::AppConfig, repository::Repository, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("catalog_reconciler={},sqlx=warn", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let path = std::env::args()
        .nth(1)
        .context("Usage: catalog-reconciler <rows.json>")?;

    tracing::info!("Starting catalog reconciler v{}", env!("CARGO_PKG_VERSION"));

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    let values: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of rows", path))?;

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let repository = Repository::postgres(pool, config.database.statement_timeout_ms);
    let state = AppState::new(config, repository);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current row");
            on_signal.cancel();
        }
    });

    tracing::info!(
        rows = values.len(),
        workers = state.config.import.workers,
        dry_run = state.config.import.dry_run,
        create_missing_books = state.config.import.create_missing_books,
        "Importing {}",
        path
    );

    let report = state.services.import.import_values(&values, cancel).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(reason) = &report.aborted {
        anyhow::bail!("Import aborted: {}", reason);
    }

    Ok(())
}
