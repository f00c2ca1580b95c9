//! Chat-completion providers used by the structuring stage.
//!
//! [`CompletionProvider`] is the narrow interface the stage depends on:
//! one prompt in, one free-form text reply out. Parsing the reply is the
//! caller's job.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use semse_core::error::ServiceError;

use crate::config::CompletionConfig;
use crate::openai::{self, ApiClient};

const SERVICE: &str = "completion";

/// Instruction placed before the raw article text.
pub const PROMPT: &str = r#"Below is an article. Parse the article into a json object containing:

1) REQUIRED! A title. Find a title in the article, or generate one based on the article.
2) A date, if you can find anything looking like a date in the article. Can be empty Output as ISO 8601.

Here is an example:

{
  "title": "Meaningful title",
  "date": "2024-02-28T08:57:26.009Z"
}

Return ONLY the json, nothing else, no explanations!

Here is the article:"#;

/// Full prompt for one article.
pub fn build_prompt(text: &str) -> String {
    format!("{PROMPT}\n\n{text}")
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// A provider that always fails.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Disabled { service: SERVICE })
    }
}

/// OpenAI chat completions (`POST /chat/completions`), single user message.
pub struct OpenAICompletion {
    client: ApiClient,
    model: String,
}

impl OpenAICompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self, ServiceError> {
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
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = self.client.post_json("chat/completions", &body).await?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content`.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String, ServiceError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::malformed(SERVICE, "missing choices[0].message.content"))
}

pub fn create_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(OpenAICompletion::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_wraps_article() {
        let prompt = build_prompt("Some article.");
        assert!(prompt.starts_with("Below is an article."));
        assert!(prompt.ends_with("Here is the article:\n\nSome article."));
    }

    #[test]
    fn test_parse_chat_response() {
        let json = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"title\":\"T\"}"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "{\"title\":\"T\"}");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let err = parse_chat_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse { .. }));
    }
}
