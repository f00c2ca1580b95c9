//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends:
//! - **[`DisabledEmbedder`]** returns errors; used when `embedding.provider = "disabled"`.
//! - **[`OpenAIEmbedder`]** calls `POST /embeddings` with retry and backoff.
//!
//! Use [`create_embedder`] to pick one from configuration:
//!
//! ```rust
//! # use semse::config::EmbeddingConfig;
//! # use semse::embedding::create_embedder;
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use semse_core::embedding::Embedder;
use semse_core::error::ServiceError;

use crate::config::EmbeddingConfig;
use crate::openai::{self, ApiClient};

const SERVICE: &str = "embedding";

// ============ Disabled Provider ============

/// An embedder that always fails.
pub struct DisabledEmbedder {
    dims: usize,
}

impl DisabledEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::Disabled { service: SERVICE })
    }
}

// ============ OpenAI Provider ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Requests vectors of exactly `dims` entries via the `dimensions`
/// parameter and rejects responses of any other length.
pub struct OpenAIEmbedder {
    client: ApiClient,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ServiceError> {
        let client = ApiClient::new(
            SERVICE,
            &config.base_url,
            openai::api_key()?,
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self {
            client,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "dimensions": self.dims,
            "encoding_format": "float",
        });
        let json = self.client.post_json("embeddings", &body).await?;
        let vector = parse_openai_response(&json)?;
        if vector.len() != self.dims {
            return Err(ServiceError::malformed(
                SERVICE,
                format!("expected {} dimensions, got {}", self.dims, vector.len()),
            ));
        }
        Ok(vector)
    }
}

/// Extract the first `data[].embedding` array from an embeddings response.
pub fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, ServiceError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| ServiceError::malformed(SERVICE, "missing data[0].embedding"))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ServiceError::malformed(SERVICE, "non-numeric embedding value"))
        })
        .collect()
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
