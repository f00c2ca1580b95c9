//! Retrieval over the SQLite store and the HTTP query endpoint.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use semse::{db, migrate, server, sqlite_store::SqliteStore};
use semse_core::embedding::Embedder;
use semse_core::error::ServiceError;
use semse_core::index::IndexManager;
use semse_core::models::{DocumentRecord, KeyedRecord, RecordKey};
use semse_core::search::Retriever;

/// Always embeds to the x axis.
struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(vec![1.0, 0.0])
    }
}

/// Unit vector at cosine distance `d` from the x axis.
fn at_distance(d: f32) -> Vec<f32> {
    let cos = 1.0 - d;
    vec![cos, (1.0 - cos * cos).sqrt()]
}

async fn seeded_index(tmp: &TempDir) -> (SqliteStore, IndexManager) {
    let pool = db::connect_path(&tmp.path().join("store.sqlite"))
        .await
        .unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = SqliteStore::new(pool);
    let index = IndexManager::new(Arc::new(store.clone()), "idx:test", "documents", 2);
    index.ensure_index(true).await.unwrap();

    let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    // Inserted out of order so ranking can't come from insertion order.
    for (id, d) in [("far", 0.9), ("near", 0.1), ("mid", 0.5)] {
        let mut value = DocumentRecord::new(id, format!("{} body", id), date);
        value.embedding = Some(at_distance(d));
        let key = RecordKey::parse(&format!("documents:{}", id)).unwrap();
        index.put(&KeyedRecord { key, value }).await.unwrap();
    }

    // Outside the prefix, never returned.
    let mut stray = DocumentRecord::new("stray", "b", date);
    stray.embedding = Some(vec![1.0, 0.0]);
    let key = RecordKey::parse("other:stray").unwrap();
    index.put(&KeyedRecord { key, value: stray }).await.unwrap();

    (store, index)
}

#[tokio::test]
async fn test_ranking_and_pagination() {
    let tmp = TempDir::new().unwrap();
    let (store, index) = seeded_index(&tmp).await;
    let retriever = Retriever::new(index, Arc::new(FixedEmbedder));

    let first = retriever.search("anything", 2, 0).await.unwrap();
    let ids: Vec<&str> = first.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["near", "mid"]);
    assert!((first[0].score - 0.1).abs() < 1e-4);
    assert!((first[1].score - 0.5).abs() < 1e-4);

    let second = retriever.search("anything", 2, 1).await.unwrap();
    let ids: Vec<&str> = second.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["mid", "far"]);

    let past_end = retriever.search("anything", 5, 3).await.unwrap();
    assert!(past_end.is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_ensure_index_rejects_other_dimensions() {
    let tmp = TempDir::new().unwrap();
    let (store, _index) = seeded_index(&tmp).await;

    let wider = IndexManager::new(Arc::new(store.clone()), "idx:test", "documents", 8);
    assert!(wider.ensure_index(true).await.is_err());
    store.close().await;
}

#[tokio::test]
async fn test_empty_index_returns_no_hits() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("store.sqlite"))
        .await
        .unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = SqliteStore::new(pool);
    let index = IndexManager::new(Arc::new(store.clone()), "idx:test", "documents", 2);
    index.ensure_index(true).await.unwrap();

    let retriever = Retriever::new(index, Arc::new(FixedEmbedder));
    let hits = retriever.search("q", 3, 0).await.unwrap();
    assert!(hits.is_empty());
    store.close().await;
}

struct TestServer {
    base: String,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start_server(index: IndexManager) -> TestServer {
    let app = server::router(Retriever::new(index, Arc::new(FixedEmbedder)), 2, 3000);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (stop, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(listener, app, async {
        let _ = rx.await;
    }));
    TestServer { base, stop, handle }
}

#[tokio::test]
async fn test_query_endpoint() {
    let tmp = TempDir::new().unwrap();
    let (store, index) = seeded_index(&tmp).await;
    let srv = start_server(index).await;
    let client = reqwest::Client::new();

    // count falls back to the server default (2)
    let resp = client
        .post(format!("{}/api/query", srv.base))
        .json(&json!({"query": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let hits: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["id"], "near");
    assert_eq!(hits[0]["title"], "near");
    assert_eq!(hits[0]["body"], "near body");
    assert_eq!(hits[0]["date"], "2024-01-01T00:00:00.000Z");
    assert!(hits[0]["score"].is_number());

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .json(&json!({"query": "hello", "start": 2, "count": 5}))
        .send()
        .await
        .unwrap();
    let hits: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "far");

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .json(&json!({"query": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .json(&json!({"query": "x".repeat(5000)}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "payload_too_large");

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .json(&json!({"query": "x", "count": -1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("count"));

    let resp = client
        .post(format!("{}/api/query", srv.base))
        .body(r#"{"query": "x"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .get(format!("{}/health", srv.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    srv.stop.send(()).unwrap();
    srv.handle.await.unwrap().unwrap();
    store.close().await;
}
