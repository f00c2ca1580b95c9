//! SQLite-backed [`Store`] implementation.
//!
//! Entries are stored one row per `(key, field)` in the `entries` table
//! with a typed value column; index declarations are JSON rows in the
//! `indexes` table. KNN is an exact scan over every entry under the
//! index prefix, ranked in process by cosine distance.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use semse_core::error::StoreError;
use semse_core::store::{rank_flat, FieldMap, FieldValue, IndexSchema, KnnHit, Store};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]; the pool is safe to share between concurrent
/// server requests.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Close the underlying pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn decode_value(row: &SqliteRow) -> Result<FieldValue, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let field: String = row.try_get("field").map_err(backend)?;
    let missing = || StoreError::codec(field.clone(), format!("no value for kind '{kind}'"));
    match kind.as_str() {
        "text" => row
            .try_get::<Option<String>, _>("text_value")
            .map_err(backend)?
            .map(FieldValue::Text)
            .ok_or_else(missing),
        "integer" => row
            .try_get::<Option<i64>, _>("int_value")
            .map_err(backend)?
            .map(FieldValue::Integer)
            .ok_or_else(missing),
        "binary" => row
            .try_get::<Option<Vec<u8>>, _>("blob_value")
            .map_err(backend)?
            .map(FieldValue::Binary)
            .ok_or_else(missing),
        other => Err(StoreError::codec(field.clone(), format!("unknown kind '{other}'"))),
    }
}

/// Fold `(key, field, ...)` rows ordered by key into one map per key.
fn group_rows(rows: &[SqliteRow]) -> Result<Vec<(String, FieldMap)>, StoreError> {
    let mut grouped: Vec<(String, FieldMap)> = Vec::new();
    for row in rows {
        let key: String = row.try_get("key").map_err(backend)?;
        let field: String = row.try_get("field").map_err(backend)?;
        let value = decode_value(row)?;
        match grouped.last_mut() {
            Some((last, fields)) if *last == key => {
                fields.insert(field, value);
            }
            _ => {
                let mut fields = FieldMap::new();
                fields.insert(field, value);
                grouped.push((key, fields));
            }
        }
    }
    Ok(grouped)
}

#[async_trait]
impl Store for SqliteStore {
    async fn index_info(&self, name: &str) -> Result<Option<IndexSchema>, StoreError> {
        let row = sqlx::query("SELECT schema_json FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => {
                let json: String = row.try_get("schema_json").map_err(backend)?;
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| StoreError::codec("schema_json", e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
        let json = serde_json::to_string(schema)
            .map_err(|e| StoreError::codec("schema_json", e.to_string()))?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO indexes (name, prefix, schema_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&schema.name)
        .bind(&schema.prefix)
        .bind(&json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::IndexExists(schema.name.clone()));
        }
        Ok(())
    }

    async fn put_entry(&self, key: &str, fields: &FieldMap) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM entries WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for (field, value) in fields {
            let (kind, text, int, blob) = match value {
                FieldValue::Text(s) => ("text", Some(s.as_str()), None, None),
                FieldValue::Integer(i) => ("integer", None, Some(*i), None),
                FieldValue::Binary(b) => ("binary", None, None, Some(b.as_slice())),
            };
            sqlx::query(
                r#"
                INSERT INTO entries (key, field, kind, text_value, int_value, blob_value)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(key)
            .bind(field)
            .bind(kind)
            .bind(text)
            .bind(int)
            .bind(blob)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn get_entry(&self, key: &str) -> Result<Option<FieldMap>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, field, kind, text_value, int_value, blob_value FROM entries WHERE key = ? ORDER BY field",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(group_rows(&rows)?.into_iter().next().map(|(_, fields)| fields))
    }

    async fn entry_exists(&self, key: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT key FROM entries WHERE key GLOB ? ORDER BY key",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn knn(&self, index: &str, query: &[f32], k: usize) -> Result<Vec<KnnHit>, StoreError> {
        let schema = self
            .index_info(index)
            .await?
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;

        let scope = format!("{}:", schema.prefix);
        let rows = sqlx::query(
            r#"
            SELECT key, field, kind, text_value, int_value, blob_value
            FROM entries
            WHERE substr(key, 1, ?) = ?
            ORDER BY key, field
            "#,
        )
        .bind(scope.chars().count() as i64)
        .bind(&scope)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rank_flat(&schema, group_rows(&rows)?, query, k)
    }
}
