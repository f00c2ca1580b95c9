//! In-memory [`Store`] implementation for tests.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock`. KNN is brute-force
//! cosine distance over every entry under the index prefix.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use globset::Glob;

use crate::error::StoreError;

use super::{rank_flat, FieldMap, IndexSchema, KnnHit, Store};

/// In-memory store for tests and single-process experiments.
#[derive(Default)]
pub struct InMemoryStore {
    indexes: RwLock<BTreeMap<String, IndexSchema>>,
    entries: RwLock<BTreeMap<String, FieldMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn index_info(&self, name: &str) -> Result<Option<IndexSchema>, StoreError> {
        Ok(read(&self.indexes)?.get(name).cloned())
    }

    async fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
        let mut indexes = write(&self.indexes)?;
        if indexes.contains_key(&schema.name) {
            return Err(StoreError::IndexExists(schema.name.clone()));
        }
        indexes.insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    async fn put_entry(&self, key: &str, fields: &FieldMap) -> Result<(), StoreError> {
        write(&self.entries)?.insert(key.to_string(), fields.clone());
        Ok(())
    }

    async fn get_entry(&self, key: &str) -> Result<Option<FieldMap>, StoreError> {
        Ok(read(&self.entries)?.get(key).cloned())
    }

    async fn entry_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(read(&self.entries)?.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| StoreError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();
        Ok(read(&self.entries)?
            .keys()
            .filter(|k| matcher.is_match(k.as_str()))
            .cloned()
            .collect())
    }

    async fn knn(&self, index: &str, query: &[f32], k: usize) -> Result<Vec<KnnHit>, StoreError> {
        let schema = read(&self.indexes)?
            .get(index)
            .cloned()
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;
        let entries = read(&self.entries)?;
        rank_flat(
            &schema,
            entries.iter().map(|(k, v)| (k.clone(), v.clone())),
            query,
            k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;

    fn text(s: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), FieldValue::Text(s.into()));
        fields
    }

    #[tokio::test]
    async fn test_put_replaces_all_fields() {
        let store = InMemoryStore::new();
        let mut first = text("one");
        first.insert("extra".into(), FieldValue::Integer(1));
        store.put_entry("documents:a", &first).await.unwrap();
        store.put_entry("documents:a", &text("two")).await.unwrap();

        let got = store.get_entry("documents:a").await.unwrap().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["title"].as_text(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_glob() {
        let store = InMemoryStore::new();
        for key in ["documents:1", "documents:2", "other:1"] {
            store.put_entry(key, &text(key)).await.unwrap();
        }
        assert_eq!(
            store.keys("documents:*").await.unwrap(),
            vec!["documents:1", "documents:2"]
        );
        assert_eq!(store.keys("*").await.unwrap().len(), 3);
        assert!(store.keys("nothing:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_knn_unknown_index() {
        let store = InMemoryStore::new();
        let err = store.knn("idx:none", &[1.0], 3).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownIndex(_)));
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let store = InMemoryStore::new();
        assert!(store.get_entry("documents:x").await.unwrap().is_none());
        assert!(!store.entry_exists("documents:x").await.unwrap());
    }
}
