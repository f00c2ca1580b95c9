use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;

/// `semse init`: create the tables and the document index. Idempotent.
pub async fn run_init(config: &Config) -> Result<()> {
    let store = Arc::new(db::open_store(config).await?);
    let index = db::document_index(config, store.clone());
    let result = index
        .ensure_index(true)
        .await
        .with_context(|| format!("Failed to create index {}", index.name()));
    store.close().await;
    result?;

    println!(
        "Initialized {} (index {} over {}:*)",
        config.store.path.display(),
        index.name(),
        index.prefix()
    );
    Ok(())
}

/// Create the store tables on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per (key, field); exactly one of the value columns is set
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            key TEXT NOT NULL,
            field TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('text', 'integer', 'binary')),
            text_value TEXT,
            int_value INTEGER,
            blob_value BLOB,
            PRIMARY KEY (key, field)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Declared indexes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexes (
            name TEXT PRIMARY KEY,
            prefix TEXT NOT NULL,
            schema_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_field ON entries(field)")
        .execute(pool)
        .await?;

    Ok(())
}
