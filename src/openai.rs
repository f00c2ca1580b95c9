//! Shared HTTP plumbing for OpenAI-compatible endpoints.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use semse_core::error::ServiceError;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Read the API key from the environment.
pub fn api_key() -> Result<String, ServiceError> {
    std::env::var(API_KEY_VAR)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ServiceError::Credentials(format!("{API_KEY_VAR} not set")))
}

/// A configured client for one OpenAI-compatible service.
pub struct ApiClient {
    service: &'static str,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport {
                service,
                message: e.to_string(),
            })?;
        Ok(Self {
            service,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
        })
    }

    /// POST `body` to `<base_url>/<path>` and return the parsed JSON response.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(service = self.service, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            ServiceError::malformed(self.service, e.to_string())
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = ServiceError::Status {
                        service: self.service,
                        status: status.as_u16(),
                        body: body_text,
                    };

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(service = self.service, %status, "transient API error");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    tracing::warn!(service = self.service, error = %e, "request failed");
                    last_err = Some(ServiceError::Transport {
                        service: self.service,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ServiceError::Transport {
            service: self.service,
            message: "request failed after retries".to_string(),
        }))
    }
}
