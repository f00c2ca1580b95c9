//! Storage abstraction for semse.
//!
//! The [`Store`] trait is a small key-value store with field maps per
//! key, plus declared indexes over a key prefix that support flat
//! cosine k-nearest-neighbor queries. Backends: SQLite in the app
//! crate, [`memory::InMemoryStore`] here.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{blob_to_vec, cosine_distance};
use crate::error::StoreError;
use crate::models::{normalize_prefix, KEY_SEPARATOR};

/// One stored field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// All fields stored under one key, ordered by field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorAlgorithm {
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
}

/// How an indexed field is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Numeric {
        sortable: bool,
    },
    Vector {
        algorithm: VectorAlgorithm,
        dims: usize,
        distance: DistanceMetric,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// A named index over every key under `prefix:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    /// Namespace prefix without the trailing separator.
    pub prefix: String,
    pub fields: Vec<FieldSchema>,
}

impl IndexSchema {
    /// The vector field name and its dimensionality, if declared.
    pub fn vector_field(&self) -> Option<(&str, usize)> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::Vector { dims, .. } => Some((f.name.as_str(), dims)),
            _ => None,
        })
    }

    /// True if `key` is covered by this index.
    pub fn covers(&self, key: &str) -> bool {
        key.strip_prefix(normalize_prefix(&self.prefix))
            .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
    }
}

/// A single nearest-neighbor result.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnHit {
    pub key: String,
    /// Cosine distance to the query; lower is closer.
    pub distance: f32,
    pub fields: FieldMap,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`index_info`](Store::index_info) | Look up a declared index |
/// | [`create_index`](Store::create_index) | Declare an index |
/// | [`put_entry`](Store::put_entry) | Replace all fields under a key |
/// | [`get_entry`](Store::get_entry) | Read all fields under a key |
/// | [`entry_exists`](Store::entry_exists) | Key existence check |
/// | [`keys`](Store::keys) | Enumerate keys matching a glob |
/// | [`knn`](Store::knn) | Flat cosine k-nearest-neighbor query |
#[async_trait]
pub trait Store: Send + Sync {
    async fn index_info(&self, name: &str) -> Result<Option<IndexSchema>, StoreError>;

    /// Declare an index. Fails with [`StoreError::IndexExists`] if the name is taken.
    async fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError>;

    /// Atomically replace every field under `key`.
    async fn put_entry(&self, key: &str, fields: &FieldMap) -> Result<(), StoreError>;

    async fn get_entry(&self, key: &str) -> Result<Option<FieldMap>, StoreError>;

    async fn entry_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`), in key order.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// The `k` entries under the index prefix closest to `query`, nearest first.
    async fn knn(&self, index: &str, query: &[f32], k: usize) -> Result<Vec<KnnHit>, StoreError>;
}

/// Rank candidate entries against `query` for the index `schema`.
///
/// Entries outside the index prefix, or without a decodable vector of
/// the declared dimensionality, are not indexed and never returned.
/// Results are ordered by ascending distance, ties by key.
pub fn rank_flat<I>(
    schema: &IndexSchema,
    entries: I,
    query: &[f32],
    k: usize,
) -> Result<Vec<KnnHit>, StoreError>
where
    I: IntoIterator<Item = (String, FieldMap)>,
{
    let (field, dims) = schema.vector_field().ok_or_else(|| StoreError::IndexMismatch {
        name: schema.name.clone(),
        detail: "no vector field declared".to_string(),
    })?;
    if query.len() != dims {
        return Err(StoreError::DimensionMismatch {
            expected: dims,
            actual: query.len(),
        });
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut hits: Vec<KnnHit> = entries
        .into_iter()
        .filter(|(key, _)| schema.covers(key))
        .filter_map(|(key, fields)| {
            let vector = fields
                .get(field)
                .and_then(FieldValue::as_binary)
                .and_then(|blob| blob_to_vec(blob).ok())
                .filter(|v| v.len() == dims)?;
            Some(KnnHit {
                distance: cosine_distance(query, &vector),
                key,
                fields,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    hits.truncate(k);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vec_to_blob;

    fn schema(dims: usize) -> IndexSchema {
        IndexSchema {
            name: "idx:test".into(),
            prefix: "test".into(),
            fields: vec![
                FieldSchema {
                    name: "title".into(),
                    kind: FieldKind::Text,
                },
                FieldSchema {
                    name: "embedding".into(),
                    kind: FieldKind::Vector {
                        algorithm: VectorAlgorithm::Flat,
                        dims,
                        distance: DistanceMetric::Cosine,
                    },
                },
            ],
        }
    }

    fn entry(key: &str, v: &[f32]) -> (String, FieldMap) {
        let mut fields = FieldMap::new();
        fields.insert("embedding".into(), FieldValue::Binary(vec_to_blob(v)));
        (key.to_string(), fields)
    }

    #[test]
    fn test_covers_requires_separator() {
        let s = schema(2);
        assert!(s.covers("test:1"));
        assert!(!s.covers("testing:1"));
        assert!(!s.covers("other:1"));
    }

    #[test]
    fn test_rank_flat_orders_and_filters() {
        let hits = rank_flat(
            &schema(2),
            vec![
                entry("test:far", &[-1.0, 0.0]),
                entry("test:near", &[1.0, 0.0]),
                entry("other:near", &[1.0, 0.0]),
                entry("test:wrong-dims", &[1.0, 0.0, 0.0]),
                entry("test:mid", &[0.0, 1.0]),
            ],
            &[1.0, 0.0],
            10,
        )
        .unwrap();
        let keys: Vec<&str> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["test:near", "test:mid", "test:far"]);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_rank_flat_ties_broken_by_key() {
        let hits = rank_flat(
            &schema(2),
            vec![entry("test:b", &[1.0, 1.0]), entry("test:a", &[2.0, 2.0])],
            &[1.0, 1.0],
            1,
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "test:a");
    }

    #[test]
    fn test_rank_flat_rejects_query_dims() {
        let err = rank_flat(&schema(3), Vec::new(), &[1.0], 5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_schema_serializes_with_kind_tag() {
        let json = serde_json::to_value(schema(512)).unwrap();
        assert_eq!(json["fields"][1]["kind"], "vector");
        assert_eq!(json["fields"][1]["dims"], 512);
        assert_eq!(json["fields"][1]["distance"], "cosine");
        let back: IndexSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema(512));
    }
}
