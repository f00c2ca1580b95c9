//! Index declaration and record storage.
//!
//! [`IndexManager`] owns the index name, namespace prefix and vector
//! dimensionality, and translates between [`KeyedRecord`] and the flat
//! [`FieldMap`] the store persists:
//!
//! | Field | Stored as |
//! |-------|-----------|
//! | `title`, `body` | text |
//! | `date` | integer, epoch milliseconds |
//! | `embedding` | binary, little-endian f32 |
//! | `image`, `type` | text (JSON for non-string values) |

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::StoreError;
use crate::models::{normalize_prefix, DocumentRecord, KeyedRecord, RecordKey};
use crate::store::{
    DistanceMetric, FieldKind, FieldMap, FieldSchema, FieldValue, IndexSchema, Store,
    VectorAlgorithm,
};

pub const FIELD_TITLE: &str = "title";
pub const FIELD_BODY: &str = "body";
pub const FIELD_DATE: &str = "date";
pub const FIELD_EMBEDDING: &str = "embedding";
pub const FIELD_IMAGE: &str = "image";
pub const FIELD_TYPE: &str = "type";

/// The document index schema: title and body text, sortable numeric
/// date, flat cosine vector over `dims` float32 values.
pub fn document_schema(name: &str, prefix: &str, dims: usize) -> IndexSchema {
    IndexSchema {
        name: name.to_string(),
        prefix: normalize_prefix(prefix).to_string(),
        fields: vec![
            FieldSchema {
                name: FIELD_TITLE.to_string(),
                kind: FieldKind::Text,
            },
            FieldSchema {
                name: FIELD_BODY.to_string(),
                kind: FieldKind::Text,
            },
            FieldSchema {
                name: FIELD_DATE.to_string(),
                kind: FieldKind::Numeric { sortable: true },
            },
            FieldSchema {
                name: FIELD_EMBEDDING.to_string(),
                kind: FieldKind::Vector {
                    algorithm: VectorAlgorithm::Flat,
                    dims,
                    distance: DistanceMetric::Cosine,
                },
            },
        ],
    }
}

/// Handle on one document index in a store.
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn Store>,
    schema: IndexSchema,
}

impl IndexManager {
    pub fn new(store: Arc<dyn Store>, name: &str, prefix: &str, dims: usize) -> Self {
        Self {
            store,
            schema: document_schema(name, prefix, dims),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn prefix(&self) -> &str {
        &self.schema.prefix
    }

    pub fn dims(&self) -> usize {
        self.schema.vector_field().map(|(_, d)| d).unwrap_or(0)
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Make sure the index exists.
    ///
    /// Returns the schema now in effect, or `None` when the index is
    /// absent and `create_if_missing` is false. An existing index with a
    /// different schema is an error; it is never silently replaced.
    pub async fn ensure_index(
        &self,
        create_if_missing: bool,
    ) -> Result<Option<IndexSchema>, StoreError> {
        if let Some(existing) = self.store.index_info(self.name()).await? {
            return self.check_compatible(existing).map(Some);
        }
        if !create_if_missing {
            return Ok(None);
        }
        match self.store.create_index(&self.schema).await {
            Ok(()) => {
                tracing::info!(index = %self.name(), prefix = %self.prefix(), "created index");
                Ok(Some(self.schema.clone()))
            }
            // Lost a race with a concurrent creator.
            Err(StoreError::IndexExists(_)) => match self.store.index_info(self.name()).await? {
                Some(existing) => self.check_compatible(existing).map(Some),
                None => Err(StoreError::UnknownIndex(self.name().to_string())),
            },
            Err(e) => Err(e),
        }
    }

    fn check_compatible(&self, existing: IndexSchema) -> Result<IndexSchema, StoreError> {
        if existing == self.schema {
            return Ok(existing);
        }
        let detail = if existing.prefix != self.schema.prefix {
            format!(
                "prefix '{}' differs from '{}'",
                existing.prefix, self.schema.prefix
            )
        } else if existing.vector_field() != self.schema.vector_field() {
            format!(
                "vector field {:?} differs from {:?}",
                existing.vector_field(),
                self.schema.vector_field()
            )
        } else {
            "field declarations differ".to_string()
        };
        Err(StoreError::IndexMismatch {
            name: existing.name,
            detail,
        })
    }

    /// Write a record, replacing anything stored under its key.
    pub async fn put(&self, record: &KeyedRecord) -> Result<(), StoreError> {
        if let Some(embedding) = &record.value.embedding {
            let dims = self.dims();
            if embedding.len() != dims {
                return Err(StoreError::DimensionMismatch {
                    expected: dims,
                    actual: embedding.len(),
                });
            }
        }
        let fields = encode_record(&record.value)?;
        self.store.put_entry(record.key.as_str(), &fields).await
    }

    /// Read a record back; `None` if nothing is stored under `key`.
    pub async fn get(&self, key: &RecordKey) -> Result<Option<KeyedRecord>, StoreError> {
        match self.store.get_entry(key.as_str()).await? {
            Some(fields) => Ok(Some(KeyedRecord {
                key: key.clone(),
                value: decode_record(&fields)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, key: &RecordKey) -> Result<bool, StoreError> {
        self.store.entry_exists(key.as_str()).await
    }

    /// Keys matching a glob pattern.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<RecordKey>, StoreError> {
        Ok(self
            .store
            .keys(pattern)
            .await?
            .iter()
            .filter_map(|k| RecordKey::parse(k))
            .collect())
    }
}

/// Flatten a record into store fields.
pub fn encode_record(record: &DocumentRecord) -> Result<FieldMap, StoreError> {
    let mut fields = FieldMap::new();
    fields.insert(FIELD_TITLE.into(), FieldValue::Text(record.title.clone()));
    fields.insert(FIELD_BODY.into(), FieldValue::Text(record.body.clone()));
    fields.insert(
        FIELD_DATE.into(),
        FieldValue::Integer(record.date.timestamp_millis()),
    );
    if let Some(embedding) = &record.embedding {
        fields.insert(
            FIELD_EMBEDDING.into(),
            FieldValue::Binary(vec_to_blob(embedding)),
        );
    }
    for (name, value) in [(FIELD_IMAGE, &record.image), (FIELD_TYPE, &record.kind)] {
        if let Some(value) = value {
            fields.insert(name.into(), FieldValue::Text(value_to_text(name, value)?));
        }
    }
    Ok(fields)
}

fn value_to_text(name: &str, value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other).map_err(|e| StoreError::codec(name, e.to_string())),
    }
}

fn text_to_value(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
        _ => Value::String(text.to_string()),
    }
}

/// Rebuild a record from store fields.
pub fn decode_record(fields: &FieldMap) -> Result<DocumentRecord, StoreError> {
    let text = |name: &str| -> Result<String, StoreError> {
        fields
            .get(name)
            .and_then(FieldValue::as_text)
            .map(str::to_string)
            .ok_or_else(|| StoreError::codec(name, "missing text field"))
    };

    let ms = fields
        .get(FIELD_DATE)
        .and_then(FieldValue::as_integer)
        .ok_or_else(|| StoreError::codec(FIELD_DATE, "missing integer field"))?;
    let date = Utc
        .timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::codec(FIELD_DATE, format!("{ms} out of range")))?;

    let embedding = match fields.get(FIELD_EMBEDDING) {
        Some(FieldValue::Binary(blob)) => Some(blob_to_vec(blob)?),
        Some(_) => return Err(StoreError::codec(FIELD_EMBEDDING, "expected binary")),
        None => None,
    };

    let optional = |name: &str| {
        fields
            .get(name)
            .and_then(FieldValue::as_text)
            .map(text_to_value)
    };

    Ok(DocumentRecord {
        title: text(FIELD_TITLE)?,
        body: text(FIELD_BODY)?,
        date,
        embedding,
        image: optional(FIELD_IMAGE),
        kind: optional(FIELD_TYPE),
    })
}
