//! Configuration parsing and validation.
//!
//! semse is configured with a TOML file (default `./config/semse.toml`).
//! Every section is optional; omitted values fall back to the defaults
//! below. A handful of environment variables override the file.
//!
//! ```toml
//! [store]
//! path = "./data/semse.sqlite"
//!
//! [index]
//! name = "idx:documents"
//! prefix = "documents"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 512
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-3.5-turbo-0125"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `SEMSE_DB_PATH` | `store.path` |
//! | `SEMSE_DOCUMENT_PREFIX` | `index.prefix` |
//! | `SEMSE_DOCUMENT_INDEX` | `index.name` |
//! | `SEMSE_BIND` | `server.bind` |
//!
//! The OpenAI API key is read from `OPENAI_API_KEY` and never from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use semse_core::models::normalize_prefix;

/// Config path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/semse.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/semse.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            prefix: default_prefix(),
        }
    }
}

fn default_index_name() -> String {
    "idx:documents".to_string()
}
fn default_prefix() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            base_url: default_base_url(),
            max_retries: default_completion_retries(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_completion_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}
fn default_dims() -> usize {
    512
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_completion_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_completion_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_count")]
    pub default_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            default_count: default_count(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_max_body_bytes() -> usize {
    3000
}
fn default_count() -> usize {
    5
}

/// Load configuration.
///
/// With `path = None` the default location is tried and built-in
/// defaults are used if nothing is there. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_config(default)?
            } else {
                Config::default()
            }
        }
    };
    finish(config, |name| std::env::var(name).ok())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse TOML text without environment overrides or validation.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply environment overrides, normalize, and validate.
pub fn finish<F>(mut config: Config, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env("SEMSE_DB_PATH") {
        config.store.path = PathBuf::from(path);
    }
    if let Some(prefix) = env("SEMSE_DOCUMENT_PREFIX") {
        config.index.prefix = prefix;
    }
    if let Some(name) = env("SEMSE_DOCUMENT_INDEX") {
        config.index.name = name;
    }
    if let Some(bind) = env("SEMSE_BIND") {
        config.server.bind = bind;
    }

    config.index.prefix = normalize_prefix(&config.index.prefix).to_string();

    if config.index.name.trim().is_empty() {
        anyhow::bail!("index.name must not be empty");
    }
    if config.index.prefix.is_empty() {
        anyhow::bail!("index.prefix must not be empty");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.server.default_count < 1 {
        anyhow::bail!("server.default_count must be >= 1");
    }
    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }

    for (section, provider) in [
        ("embedding", &config.embedding.provider),
        ("completion", &config.completion.provider),
    ] {
        match provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    Ok(config)
}
