//! Chat-completion client for a model serving endpoint.
//!
//! Requests go to `{host}/serving-endpoints/{endpoint}/invocations`, or to
//! `serving_endpoint` itself when it is already a full URL. Responses are
//! normalized into a [`ModelResponse`] by trying the known payload shapes
//! in priority order:
//!
//! 1. chat completion (`choices[0].message`),
//! 2. `output_text`,
//! 3. anything else, passed through as its JSON text.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ModelConfig;
use crate::models::{Message, ModelResponse, ToolInvocation};
use crate::tools::ToolSchema;

/// Sends a conversation to a model and returns its normalized reply.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<ModelResponse>;
}

pub struct ServingEndpointClient {
    url: String,
    token: String,
    model: Option<String>,
    http: reqwest::Client,
}

impl ServingEndpointClient {
    /// Build a client from `[model]`, failing with every missing setting named.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let endpoint = config
            .serving_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty());
        let host = config.host.as_deref().filter(|h| !h.trim().is_empty());
        let token = config.api_token();

        let mut missing = Vec::new();
        if token.is_none() {
            missing.push(config.api_token_env.clone());
        }
        if endpoint.is_none() {
            missing.push("model.serving_endpoint".to_string());
        }
        if host.is_none() && !endpoint.is_some_and(is_full_url) {
            missing.push("model.host".to_string());
        }
        if !missing.is_empty() {
            bail!("Missing model settings: {}", missing.join(", "));
        }

        let (Some(endpoint), Some(token)) = (endpoint, token) else {
            bail!("Missing model settings");
        };
        let url = resolve_invocations_url(host, endpoint)?;
        Self::new(url, token, config.model.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn new(url: String, token: String, model: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build model HTTP client")?;
        Ok(Self {
            url,
            token,
            model: model.filter(|m| !m.is_empty()),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn is_full_url(endpoint: &str) -> bool {
    endpoint.starts_with("http")
}

/// Invocation URL for an endpoint name or full URL.
pub fn resolve_invocations_url(host: Option<&str>, endpoint: &str) -> Result<String> {
    if is_full_url(endpoint) {
        return Ok(endpoint.to_string());
    }
    let Some(host) = host else {
        bail!("model.host is required when serving_endpoint is not a full URL");
    };
    Ok(format!(
        "{}/serving-endpoints/{}/invocations",
        host.trim_end_matches('/'),
        endpoint
    ))
}

#[async_trait]
impl ModelClient for ServingEndpointClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<ModelResponse> {
        let mut body = serde_json::json!({ "messages": messages });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }
        if let Some(model) = &self.model {
            body["model"] = Value::String(model.clone());
        }

        debug!(url = %self.url, messages = messages.len(), tools = tools.len(), "calling model");

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Model request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Model endpoint error {}: {}", status, body_text);
        }

        let raw: Value = response
            .json()
            .await
            .context("Model endpoint returned invalid JSON")?;
        Ok(normalize_response(raw))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Response normalization
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseShape {
    ChatCompletion { choices: Vec<Choice> },
    OutputText { output_text: Value },
    Raw(Value),
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_calls: Option<Vec<Value>>,
}

/// Normalize a raw response body. Never fails: unknown shapes become text.
pub fn normalize_response(raw: Value) -> ModelResponse {
    let shape = serde_json::from_value::<ResponseShape>(raw.clone())
        .unwrap_or_else(|_| ResponseShape::Raw(raw.clone()));

    let (message, tool_calls) = match shape {
        ResponseShape::ChatCompletion { choices } => match choices.into_iter().next() {
            Some(choice) => (
                value_text(&choice.message.content),
                choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .iter()
                    .map(parse_invocation)
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        },
        ResponseShape::OutputText { output_text } => (value_text(&output_text), Vec::new()),
        ResponseShape::Raw(value) => (value.to_string(), Vec::new()),
    };

    ModelResponse {
        message,
        tool_calls,
        raw,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read one tool call in either `{function: {name, arguments}}` or flat
/// `{name, arguments}` form.
fn parse_invocation(item: &Value) -> ToolInvocation {
    let function = item.get("function");
    let name = non_empty_str(function.and_then(|f| f.get("name")))
        .or_else(|| non_empty_str(item.get("name")));
    let arguments = function
        .and_then(|f| f.get("arguments"))
        .or_else(|| item.get("arguments"))
        .filter(|a| !a.is_null())
        .cloned()
        .unwrap_or_else(|| Value::String("{}".to_string()));

    ToolInvocation {
        id: non_empty_str(item.get("id")),
        name,
        arguments,
    }
}
