//! Core data models used throughout docent.
//!
//! These types represent the chunks that flow through the retrieval
//! pipeline and the conversation messages exchanged with the model.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// A bounded, independently retrievable span of source text.
///
/// Chunks are created in bulk when the corpus is built and are never
/// updated individually afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique within one build (`{file-name}#chunk-{n}`).
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Human-readable citation label (e.g. `"crypto (book) - page 3"`).
    pub source: String,
}

/// Identity of the document an index was built from.
///
/// A persisted snapshot is only reusable when both the path string and
/// the modification time match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub path: String,
    /// Modification time in nanoseconds since the Unix epoch, `None` when
    /// the document does not exist.
    pub modified_ns: Option<u64>,
}

impl SourceIdentity {
    pub fn new(path: impl Into<String>, modified_ns: Option<u64>) -> Self {
        Self {
            path: path.into(),
            modified_ns,
        }
    }

    /// Read the identity of a document on disk.
    pub fn of_file(path: &Path) -> Self {
        let modified_ns = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64);
        Self::new(path.to_string_lossy().to_string(), modified_ns)
    }
}

/// Text of one page as returned by a [`DocumentReader`](crate::extract::DocumentReader).
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call recorded on an assistant message, in chat-completions wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// One message of a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Assistant message recording a single tool call request.
    pub fn tool_request(call_id: &str, name: &str, arguments: String) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCallRecord {
                id: call_id.to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments,
                },
            }]),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool-role message carrying a tool's textual result.
    pub fn tool_result(call_id: &str, name: &str, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
        }
    }
}

/// A tool invocation requested by the model.
///
/// Consumed exactly once per round. `name` is `None` when the model's
/// payload carried no usable name; `arguments` is the raw payload, usually
/// a JSON-encoded string.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: serde_json::Value,
}

/// Normalized model response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: String,
    pub tool_calls: Vec<ToolInvocation>,
    /// Full response body, kept only for tracing.
    pub raw: serde_json::Value,
}
