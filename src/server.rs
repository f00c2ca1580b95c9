//! HTTP query server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Ranked retrieval: `{query, start?, count?}` → `[SearchHit]` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `payload_too_large` (413), `upstream` (502), `internal` (500). Bodies
//! that are not JSON or do not fit the request shape are `bad_request`.
//! Request bodies above `server.max_body_bytes` are rejected with 413
//! before parsing.
//!
//! Each request is handled independently; the only shared resource is the
//! store's connection pool.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use semse_core::error::{SearchError, ServiceError};
use semse_core::models::SearchHit;
use semse_core::search::Retriever;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;

#[derive(Clone)]
struct AppState {
    retriever: Retriever,
    default_count: usize,
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(retriever: Retriever, default_count: usize, max_body_bytes: usize) -> Router {
    let state = AppState {
        retriever,
        default_count,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .with_state(state)
}

/// Starts the query server on `[server].bind` and runs until Ctrl+C or
/// SIGTERM, then closes the store.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let store = Arc::new(db::open_store(config).await?);
    let index = db::document_index(config, store.clone());
    if index.ensure_index(false).await?.is_none() {
        tracing::warn!(
            index = %index.name(),
            "index does not exist yet; queries will fail until `semse init` or `semse import` runs"
        );
    }

    let app = router(
        Retriever::new(index, embedder),
        config.server.default_count,
        config.server.max_body_bytes,
    );

    let listener = TcpListener::bind(&config.server.bind).await?;
    println!("Query server listening on http://{}", listener.local_addr()?);

    let result = serve(listener, app, shutdown_signal()).await;
    store.close().await;
    tracing::info!("store closed");
    result
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let (status, code) = match &err {
            SearchError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SearchError::Service(ServiceError::Disabled { .. }) => {
                (StatusCode::BAD_REQUEST, "embeddings_disabled")
            }
            SearchError::Service(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            SearchError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "query failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let (status, code) = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            _ => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        AppError {
            status,
            code,
            message: rejection.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/query ============

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    start: usize,
    count: Option<usize>,
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let Json(req) = payload?;
    let count = req.count.unwrap_or(state.default_count);
    let hits = state
        .retriever
        .search(&req.query, count, req.start)
        .await?;
    tracing::debug!(start = req.start, count, returned = hits.len(), "query served");
    Ok(Json(hits))
}
