//! Nearest-neighbor retrieval with pagination.
//!
//! The [`Retriever`] embeds the query text, asks the store for the
//! `offset + size` closest vectors under the index prefix, and returns
//! the window `[offset, offset + size)` of that ranking.
//!
//! Scores are cosine distances: lower means more similar. Ties are
//! ordered by key.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::SearchError;
use crate::index::{decode_record, IndexManager};
use crate::models::{RecordKey, SearchHit};

/// Retrieval engine over one document index.
#[derive(Clone)]
pub struct Retriever {
    index: IndexManager,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: IndexManager, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    /// Ranked hits `offset..offset + size` for `query`.
    ///
    /// An empty query or a zero `size` is rejected before the embedding
    /// service is contacted.
    pub async fn search(
        &self,
        query: &str,
        size: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidInput("query must not be empty".into()));
        }
        if size == 0 {
            return Err(SearchError::InvalidInput("size must be at least 1".into()));
        }

        let vector = self.embedder.embed(query).await?;
        let k = offset.saturating_add(size);
        let hits = self.index.store().knn(self.index.name(), &vector, k).await?;
        tracing::debug!(query, k, returned = hits.len(), "knn query");

        let prefix = self.index.prefix();
        hits.into_iter()
            .skip(offset)
            .take(size)
            .map(|hit| {
                let record = decode_record(&hit.fields)?;
                let id = RecordKey::parse(&hit.key)
                    .and_then(|k| k.strip_namespace(prefix).map(str::to_string))
                    .unwrap_or(hit.key);
                Ok(SearchHit {
                    id,
                    title: record.title,
                    body: record.body,
                    date: record.date,
                    score: hit.distance,
                    image: record.image,
                    kind: record.kind,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::{DocumentRecord, KeyedRecord};
    use crate::store::memory::InMemoryStore;
    use crate::store::Store;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always embeds to the unit x-axis and counts calls.
    struct AxisEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    /// A unit vector whose cosine distance from the x-axis is `d`.
    fn at_distance(d: f32) -> Vec<f32> {
        let cos = 1.0 - d;
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    async fn fixture() -> (Retriever, Arc<AxisEmbedder>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index = IndexManager::new(store, "idx:documents", "documents", 2);
        index.ensure_index(true).await.unwrap();
        for (id, d) in [("a", 0.1), ("b", 0.5), ("c", 0.9)] {
            let mut value = DocumentRecord::new(format!("Doc {id}"), "body", Utc::now());
            value.embedding = Some(at_distance(d));
            index
                .put(&KeyedRecord {
                    key: RecordKey::parse(&format!("documents:{id}")).unwrap(),
                    value,
                })
                .await
                .unwrap();
        }
        let embedder = Arc::new(AxisEmbedder {
            calls: AtomicUsize::new(0),
        });
        (Retriever::new(index, embedder.clone()), embedder)
    }

    #[tokio::test]
    async fn test_first_page() {
        let (retriever, _) = fixture().await;
        let hits = retriever.search("anything", 2, 0).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((hits[0].score - 0.1).abs() < 1e-4);
        assert!((hits[1].score - 0.5).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_offset_page() {
        let (retriever, _) = fixture().await;
        let hits = retriever.search("anything", 2, 1).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let (retriever, _) = fixture().await;
        assert!(retriever.search("anything", 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_hits() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let index = IndexManager::new(store, "idx:documents", "documents", 2);
        index.ensure_index(true).await.unwrap();
        let embedder = Arc::new(AxisEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(index, embedder.clone());

        let hits = retriever.search("q", 3, 0).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedding() {
        let (retriever, embedder) = fixture().await;
        let err = retriever.search("   ", 5, 0).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidInput(_)));
        let err = retriever.search("query", 0, 0).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidInput(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hits_never_expose_prefix() {
        let (retriever, _) = fixture().await;
        for hit in retriever.search("anything", 3, 0).await.unwrap() {
            assert!(!hit.id.starts_with("documents"));
        }
    }
}
