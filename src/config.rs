//! TOML configuration parsing and validation.
//!
//! ```toml
//! [document]
//! path = "rag/crypto.pdf"
//!
//! [index]
//! cache_path = "rag/cache.json"
//!
//! [model]
//! host = "https://example.cloud.databricks.com"
//! serving_endpoint = "chat-endpoint"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```
//!
//! Only `[document]` is required. Model settings are validated when the
//! model client is constructed, so commands that never talk to the model
//! (`index`, `search`, `tools`) run without them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub document: DocumentConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

fn default_max_pages() -> usize {
    10
}
fn default_max_chunks() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_chunk_words() -> usize {
    900
}
fn default_overlap_words() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    /// Snapshot file. When absent the index is rebuilt on every start.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Workspace host; required unless `serving_endpoint` is a full URL.
    #[serde(default)]
    pub host: Option<String>,
    /// Endpoint name, or a full invocations URL.
    #[serde(default)]
    pub serving_endpoint: Option<String>,
    /// Optional `model` field sent with every request.
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: None,
            serving_endpoint: None,
            model: None,
            api_token_env: default_api_token_env(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

fn default_api_token_env() -> String {
    "DATABRICKS_API_TOKEN".to_string()
}
fn default_model_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_search_api_key_env(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_api_key_env() -> String {
    "SEARCH_API_KEY".to_string()
}
fn default_search_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Messages retained per session (user and assistant turns together).
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

impl WebSearchConfig {
    /// API key read from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl ModelConfig {
    /// Bearer token from `api_token_env`, falling back to `DATABRICKS_TOKEN`.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api_token_env)
            .ok()
            .or_else(|| std::env::var("DATABRICKS_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.document.path.as_os_str().is_empty() {
        anyhow::bail!("document.path must not be empty");
    }
    if config.document.max_pages == 0 {
        anyhow::bail!("document.max_pages must be > 0");
    }
    if config.document.max_chunks == 0 {
        anyhow::bail!("document.max_chunks must be > 0");
    }

    if config.chunking.chunk_words == 0 {
        anyhow::bail!("chunking.chunk_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.chunk_words {
        anyhow::bail!(
            "chunking.overlap_words ({}) must be smaller than chunking.chunk_words ({})",
            config.chunking.overlap_words,
            config.chunking.chunk_words
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.session.max_messages == 0 {
        anyhow::bail!("session.max_messages must be >= 1");
    }

    Ok(config)
}
