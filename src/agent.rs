//! Retrieval-grounded answer loop with one optional tool round.
//!
//! # Flow
//!
//! ```text
//! query ─▶ retrieve top-k ─▶ [system, history…, user+context]
//!                                   │
//!                          first model call (with tool schemas)
//!                                   │
//!              ┌──── no tool calls ─┴─ tool calls ────┐
//!              │                                      ▼
//!              │                     run each tool, append assistant+tool pair
//!              │                                      │
//!              │                              second model call
//!              ▼                                      ▼
//!         answer ◀────────── strip "Sources:" lines, append computed one
//! ```
//!
//! The model is called at most twice per run. Tool faults never abort a
//! run; they are fed back to the model as text. Model-call faults do.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::{Corpus, Retriever};
use crate::llm::{ModelClient, ServingEndpointClient};
use crate::models::{Chunk, Message, ToolInvocation};
use crate::tools::{ToolArgs, ToolRegistry};
use crate::web_search::WebSearchClient;

/// Tool gated by `allow_search`.
pub const WEB_SEARCH_TOOL: &str = "web_search";

pub const DEFAULT_TOP_K: usize = 3;

const SYSTEM_PROMPT: &str = "You are a research assistant that can cite provided context, call tools, and stay concise. \
Prefer RAG context over speculation. If tools are provided, decide when to call them. \
Use only the provided [source] tags for citations; never fabricate sources and never use numeric citations like [1]/[2]. \
Include a 'Sources:' line at the end listing the tags you used, or 'Sources: none' if nothing was cited. \
Return final answers as markdown.";

const NO_CONTEXT: &str = "No RAG context available.";

/// One step of a run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    LlmFirstPass {
        data: Value,
    },
    ToolCall {
        name: String,
        arguments: Value,
        result: String,
    },
    ToolSkipped {
        name: Option<String>,
        reason: String,
    },
    LlmFinal {
        data: Value,
    },
}

/// Result of [`Agent::run`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub answer: String,
    pub trace: Vec<TraceEvent>,
    pub tools_available: Vec<String>,
    pub context_used: Vec<Chunk>,
}

/// The raw argument payload of a tool call could not be read as an object.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

pub struct Agent {
    model: Arc<dyn ModelClient>,
    retriever: Arc<dyn Retriever>,
    tools: Arc<ToolRegistry>,
    top_k: usize,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelClient>,
        retriever: Arc<dyn Retriever>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            model,
            retriever,
            tools,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Wire the corpus, tools and model client described by `config`.
    ///
    /// Missing model settings fail here, before any request is served.
    pub fn from_config(config: &Config) -> Result<Self> {
        let corpus = Corpus::from_config(config).context("Failed to open corpus")?;
        let search = WebSearchClient::from_config(&config.web_search)?;
        let model = ServingEndpointClient::from_config(&config.model)?;
        Ok(Self::new(
            Arc::new(model),
            Arc::new(corpus),
            Arc::new(ToolRegistry::with_builtins(search)),
        )
        .with_top_k(config.retrieval.top_k))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `query`, optionally continuing `history`.
    pub async fn run(&self, query: &str, allow_search: bool, history: &[Message]) -> Result<AgentRun> {
        let mut trace = Vec::new();

        let context: Vec<Chunk> = self
            .retriever
            .retrieve(query, self.top_k)
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(Message::user(format_user_message(query, &context)));

        let schemas = self.tools.schemas();

        let first = self.model.chat(&messages, &schemas).await?;
        trace.push(TraceEvent::LlmFirstPass {
            data: first.raw.clone(),
        });

        let (answer, model_calls) = if first.tool_calls.is_empty() {
            (first.message, 1)
        } else {
            for invocation in &first.tool_calls {
                if let Some(event) = self.dispatch(invocation, allow_search, &mut messages).await {
                    trace.push(event);
                }
            }

            let last = self.model.chat(&messages, &schemas).await?;
            trace.push(TraceEvent::LlmFinal {
                data: last.raw.clone(),
            });
            (last.message, 2)
        };

        info!(
            context = context.len(),
            model_calls,
            "agent run complete"
        );

        Ok(AgentRun {
            answer: finalize_answer(&answer, &context),
            trace,
            tools_available: self.tools.names(),
            context_used: context,
        })
    }

    /// Execute one requested invocation, appending its message pair.
    async fn dispatch(
        &self,
        invocation: &ToolInvocation,
        allow_search: bool,
        messages: &mut Vec<Message>,
    ) -> Option<TraceEvent> {
        let Some(name) = invocation.name.as_deref() else {
            return Some(skipped(None, "tool call has no name"));
        };
        if name == WEB_SEARCH_TOOL && !allow_search {
            debug!(tool = name, "web search disabled for this run");
            return Some(skipped(Some(name), "web search disabled"));
        }
        if !self.tools.contains(name) {
            warn!(tool = name, "model requested an unregistered tool");
            return Some(skipped(Some(name), "tool not registered"));
        }

        let args = decode_arguments(&invocation.arguments).unwrap_or_else(|e| {
            warn!(tool = name, error = %e, "tool arguments unreadable, using empty object");
            ToolArgs::new()
        });

        let result = match self.tools.call(name, args.clone()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = name, error = %e, "tool failed");
                format!("Tool {} failed: {}", name, e)
            }
        };

        let call_id = invocation.id.as_deref().unwrap_or(name);
        let arguments = Value::Object(args);
        messages.push(Message::tool_request(call_id, name, arguments.to_string()));
        messages.push(Message::tool_result(call_id, name, result.clone()));

        Some(TraceEvent::ToolCall {
            name: name.to_string(),
            arguments,
            result,
        })
    }
}

fn skipped(name: Option<&str>, reason: &str) -> TraceEvent {
    TraceEvent::ToolSkipped {
        name: name.map(str::to_string),
        reason: reason.to_string(),
    }
}

/// Read a raw argument payload as a key-value object.
///
/// Strings are parsed as JSON; an object is taken as-is.
pub fn decode_arguments(raw: &Value) -> Result<Map<String, Value>, ArgumentError> {
    let parsed = match raw {
        Value::String(s) => serde_json::from_str::<Value>(s)?,
        other => other.clone(),
    };
    match parsed {
        Value::Object(map) => Ok(map),
        Value::Null => Err(ArgumentError::NotAnObject("null")),
        Value::Bool(_) => Err(ArgumentError::NotAnObject("boolean")),
        Value::Number(_) => Err(ArgumentError::NotAnObject("number")),
        Value::String(_) => Err(ArgumentError::NotAnObject("string")),
        Value::Array(_) => Err(ArgumentError::NotAnObject("array")),
    }
}

/// User message: the question, the context block and citation rules.
pub fn format_user_message(query: &str, context: &[Chunk]) -> String {
    let block = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context
            .iter()
            .map(|c| format!("[{}] {}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "User question:\n{query}\n\n\
         Relevant context (use these exact [source] tags in your answer; do not invent new ones):\n\
         {block}\n\n\
         Citing rules: every claim grounded in context must include its [source] tag; \
         do NOT use numeric citations like [1]/[2]. If no context applies, state 'Sources: none'."
    )
}

/// Replace any model-written `Sources:` lines with the computed one.
pub fn finalize_answer(answer: &str, context: &[Chunk]) -> String {
    let sources: BTreeSet<&str> = context.iter().map(|c| c.source.as_str()).collect();
    let sources_line = if sources.is_empty() {
        "Sources: none".to_string()
    } else {
        format!(
            "Sources: {}",
            sources.into_iter().collect::<Vec<_>>().join("; ")
        )
    };

    let cleaned = answer
        .trim()
        .lines()
        .filter(|line| !line.trim().to_lowercase().starts_with("sources:"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\n{}", cleaned.trim(), sources_line)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(source: &str) -> Chunk {
        Chunk {
            id: "doc.pdf#chunk-0".into(),
            text: "text".into(),
            source: source.into(),
        }
    }

    #[test]
    fn test_finalize_replaces_model_sources() {
        let answer = "The pad must be random [b].\nsources: [1], [2]\n  SOURCES: fake";
        let out = finalize_answer(answer, &[chunk("b"), chunk("a"), chunk("b")]);
        assert_eq!(out, "The pad must be random [b].\n\nSources: a; b");
    }

    #[test]
    fn test_finalize_empty_context() {
        assert_eq!(finalize_answer("Hi.", &[]), "Hi.\n\nSources: none");
        assert_eq!(finalize_answer("   ", &[]), "Sources: none");
    }

    #[test]
    fn test_decode_arguments() {
        let map = decode_arguments(&json!("{\"query\":\"otp\"}")).unwrap();
        assert_eq!(map["query"], "otp");
        let map = decode_arguments(&json!({ "text": "x" })).unwrap();
        assert_eq!(map["text"], "x");
        assert!(matches!(
            decode_arguments(&json!("{broken")),
            Err(ArgumentError::Json(_))
        ));
        assert!(matches!(
            decode_arguments(&json!("[1]")),
            Err(ArgumentError::NotAnObject("array"))
        ));
    }

    #[test]
    fn test_user_message_context_block() {
        let msg = format_user_message("what is otp?", &[chunk("crypto (book) - page 1")]);
        assert!(msg.starts_with("User question:\nwhat is otp?\n\n"));
        assert!(msg.contains("[crypto (book) - page 1] text"));

        let msg = format_user_message("q", &[]);
        assert!(msg.contains(NO_CONTEXT));
    }

    #[test]
    fn test_trace_event_shape() {
        let event = TraceEvent::ToolCall {
            name: "summarize_text".into(),
            arguments: json!({}),
            result: "ok".into(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "tool_call");
        assert_eq!(v["name"], "summarize_text");
        let v = serde_json::to_value(TraceEvent::LlmFirstPass { data: json!(1) }).unwrap();
        assert_eq!(v["event"], "llm_first_pass");
    }
}
