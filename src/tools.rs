//! Tools the model may call, and the registry that dispatches them.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌────────────┐ ┌──────────┐ ┌─────────┐ │
//! │  │ web_search │ │summarize │ │ custom  │ │
//! │  │            │ │  _text   │ │ (Rust)  │ │
//! │  └────────────┘ └──────────┘ └─────────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!       Agent::run() → tool round
//! ```
//!
//! Each built-in decodes its raw argument object into a typed struct with
//! `serde`; a decode failure surfaces as [`ToolError::InvalidArguments`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use docent::tools::ToolRegistry;
//! use docent::web_search::WebSearchClient;
//! # fn example(search: WebSearchClient) {
//! let mut tools = ToolRegistry::with_builtins(search);
//! // tools.register(Box::new(MyTool::new()));
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::web_search::WebSearchClient;

/// Argument object passed to a tool.
pub type ToolArgs = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not registered")]
    NotRegistered(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A locally executed function the model can request.
///
/// `name`, `description` and `parameters_schema` are declared to the model
/// on every call; [`execute`](Tool::execute) runs when the model asks for it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"web_search"`).
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the argument object (`type: "object"`).
    fn parameters_schema(&self) -> Value;

    /// Run the tool and return its textual result.
    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError>;
}

/// Function declaration in chat-completions `tools` shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            kind: "function",
            function: FunctionSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            },
        }
    }
}

/// Decode a tool's argument object into its typed form.
pub fn decode_args<T: DeserializeOwned>(tool: &str, args: ToolArgs) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|source| ToolError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct WebSearchTool {
    client: WebSearchClient,
}

impl WebSearchTool {
    pub fn new(client: WebSearchClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    #[serde(default)]
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    3
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for up-to-date information."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Number of results", "default": 3 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let args: WebSearchArgs = decode_args(self.name(), args)?;
        if args.query.is_empty() {
            return Ok("No query provided.".to_string());
        }
        let results = self.client.search(&args.query, args.limit).await?;
        Ok(results
            .iter()
            .map(|r| format!("- {}: {} ({})", r.title, r.url, r.snippet))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

pub struct SummarizeTextTool;

#[derive(Debug, Deserialize)]
struct SummarizeArgs {
    #[serde(default)]
    text: String,
    #[serde(default = "default_max_chars")]
    max_chars: usize,
}

fn default_max_chars() -> usize {
    300
}

#[async_trait]
impl Tool for SummarizeTextTool {
    fn name(&self) -> &str {
        "summarize_text"
    }

    fn description(&self) -> &str {
        "Lightweight local summarizer that truncates text. Use before calling the LLM again."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to compress" },
                "max_chars": { "type": "integer", "description": "Maximum characters to keep", "default": 300 }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let args: SummarizeArgs = decode_args(self.name(), args)?;
        Ok(truncate_chars(&args.text, args.max_chars))
    }
}

/// Keep the first `max_chars` characters, appending `...` when text was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub struct CryptoHelperTool;

#[derive(Debug, Deserialize)]
struct CryptoHelperArgs {
    #[serde(default = "default_term")]
    term: String,
}

fn default_term() -> String {
    "one-time pad".to_string()
}

#[async_trait]
impl Tool for CryptoHelperTool {
    fn name(&self) -> &str {
        "sample_crypto_helper"
    }

    fn description(&self) -> &str {
        "Example domain-specific function that returns a canned cryptography tip."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "term": { "type": "string", "description": "Cryptography topic to comment on" }
            }
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let args: CryptoHelperArgs = decode_args(self.name(), args)?;
        Ok(format!(
            "Quick helper for {}: ensure randomness, avoid key reuse, and verify assumptions.",
            args.term
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Named set of tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with `web_search`, `summarize_text` and `sample_crypto_helper`.
    pub fn with_builtins(search: WebSearchClient) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(WebSearchTool::new(search)));
        registry.register(Box::new(SummarizeTextTool));
        registry.register(Box::new(CryptoHelperTool));
        registry
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| ToolSchema::of(t.as_ref())).collect()
    }

    /// Execute the named tool.
    pub async fn call(&self, name: &str, args: ToolArgs) -> Result<String, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::NotRegistered(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
