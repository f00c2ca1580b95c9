use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use semse_core::index::IndexManager;
use semse_core::store::Store;

use crate::config::Config;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.store.path).await
}

pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;

    Ok(pool)
}

/// Connect, run migrations, and wrap the pool as a [`SqliteStore`].
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteStore::new(pool))
}

/// The document index described by `config`, backed by `store`.
pub fn document_index(config: &Config, store: Arc<dyn Store>) -> IndexManager {
    IndexManager::new(
        store,
        &config.index.name,
        &config.index.prefix,
        config.embedding.dims,
    )
}
