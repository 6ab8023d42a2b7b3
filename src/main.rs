//! rowmap-smoke - end-to-end check of rowmap against a live database.
//!
//! Creates a scratch table, runs insert, bulk insert, list, update,
//! delete-where and a rolled-back transaction, then drops the table.

use chrono::{DateTime, Utc};
use clap::Parser;
use rowmap::config::Config;
use rowmap::{Database, DatabaseType, Entity, Field, Hooks, OrmError, Schema, params};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const TABLE: &str = "rowmap_smoke";

#[derive(Debug, Default, Clone)]
struct SmokeRow {
    id: i64,
    name: String,
    quantity: Option<i32>,
    created_at: Option<DateTime<Utc>>,
}

impl Entity for SmokeRow {
    fn schema() -> Schema<Self> {
        Schema::new()
            .table(TABLE)
            .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
            .field(Field::scalar("name", |e: &Self| &e.name, |e: &mut Self| &mut e.name))
            .field(Field::scalar("quantity", |e: &Self| &e.quantity, |e: &mut Self| {
                &mut e.quantity
            }))
            .field(Field::scalar("createdAt", |e: &Self| &e.created_at, |e: &mut Self| {
                &mut e.created_at
            }))
    }
}

/// Counts statements so the bulk insert chunking is visible in the summary.
#[derive(Default)]
struct StatementCounter {
    statements: Arc<AtomicUsize>,
}

impl Hooks for StatementCounter {
    fn on_statement(&self, _sql: &str) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

fn create_table_sql(db_type: DatabaseType) -> String {
    match db_type {
        DatabaseType::SQLite => format!(
            "CREATE TABLE {TABLE} (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             name TEXT NOT NULL, quantity INTEGER, created_at TEXT)"
        ),
        DatabaseType::Postgres => format!(
            "CREATE TABLE {TABLE} (id BIGSERIAL PRIMARY KEY, \
             name TEXT NOT NULL, quantity INTEGER, created_at TIMESTAMPTZ)"
        ),
        DatabaseType::MySql => format!(
            "CREATE TABLE {TABLE} (id BIGINT AUTO_INCREMENT PRIMARY KEY, \
             name VARCHAR(255) NOT NULL, quantity INT, created_at DATETIME(6))"
        ),
    }
}

async fn run(config: &Config) -> Result<(), OrmError> {
    let base = Database::connect(&config.database).await?;
    let counter = StatementCounter::default();
    let statements = Arc::clone(&counter.statements);
    let db = base.with_hooks(counter);
    let db_type = db.pool().database_type();

    db.execute(&format!("DROP TABLE IF EXISTS {TABLE}"), params![])
        .await?;
    db.execute(&create_table_sql(db_type), params![]).await?;
    info!(table = TABLE, db_type = %db_type, "Scratch table created");

    let mut first = SmokeRow {
        name: "John".into(),
        created_at: Some(Utc::now()),
        ..Default::default()
    };
    db.insert(&mut first).await?;
    let loaded = db
        .get_by_id::<SmokeRow>(first.id)
        .await?
        .ok_or_else(|| OrmError::not_found(TABLE, format!("id = {}", first.id)))?;
    info!(id = loaded.id, name = %loaded.name, "Single insert verified");

    let mut rows: Vec<SmokeRow> = (0..config.rows)
        .map(|i| SmokeRow {
            name: format!("row-{i}"),
            quantity: i32::try_from(i % 10).ok(),
            ..Default::default()
        })
        .collect();
    let before = statements.load(Ordering::Relaxed);
    let started = Instant::now();
    db.insert_batch(&mut rows).await?;
    info!(
        rows = rows.len(),
        statements = statements.load(Ordering::Relaxed) - before,
        batch_size = db.batch_size(),
        execution_time_ms = started.elapsed().as_millis() as u64,
        "Bulk insert completed"
    );

    let high = db
        .list_where::<SmokeRow>("quantity>=?", params![7])
        .await?;
    info!(matched = high.len(), "Filtered list completed");

    first.quantity = Some(42);
    db.update(&first).await?;

    let removed = db
        .delete_where::<SmokeRow>("quantity>=? AND id<>?", params![7, first.id])
        .await?;
    info!(rows_affected = removed, "Delete completed");

    let outcome = db
        .transaction(|s| {
            Box::pin(async move {
                let mut doomed = SmokeRow {
                    name: "rolled back".into(),
                    ..Default::default()
                };
                s.insert(&mut doomed).await?;
                Err::<(), _>(OrmError::invalid_input("abort on purpose"))
            })
        })
        .await;
    let leaked = db
        .list_where::<SmokeRow>("name=?", params!["rolled back"])
        .await?;
    info!(
        rolled_back = outcome.is_err(),
        leaked = leaked.len(),
        "Transaction rollback verified"
    );

    if !config.keep_table {
        db.execute(&format!("DROP TABLE {TABLE}"), params![]).await?;
    }
    info!(
        statements = statements.load(Ordering::Relaxed),
        "Smoke run finished"
    );
    db.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        database = %rowmap::DatabaseConfig::parse(&config.database)?.masked_connection_string(),
        "Starting rowmap-smoke v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&config).await {
        error!(error = %e, "Smoke run failed");
        return Err(e.into());
    }

    Ok(())
}
