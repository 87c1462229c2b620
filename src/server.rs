//! HTTP API for asking questions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/agent/query/` | Ask via query string (`query`, `allow_search`, `session_id`) |
//! | `POST` | `/api/agent/query/` | Ask via JSON body with the same fields |
//! | `OPTIONS` | `/api/agent/query/` | Preflight, answered `{"ok": true}` |
//! | `GET`  | `/tools/list` | Tools declared to the model |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The query routes also answer without the trailing slash. Any other
//! method on them is a `405`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Missing 'query'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `method_not_allowed` (405), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::agent::{Agent, AgentRun};
use crate::config::Config;
use crate::session::{record_exchange, InMemorySessionStore, SessionStore, DEFAULT_SESSION};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    agent: Arc<Agent>,
    sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { agent, sessions }
    }
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let query_route = || {
        get(handle_query_get)
            .post(handle_query_post)
            .options(handle_preflight)
            .fallback(handle_method_not_allowed)
    };

    Router::new()
        .route("/api/agent/query/", query_route())
        .route("/api/agent/query", query_route())
        .route("/tools/list", get(handle_list_tools))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Build the agent from `config` and serve until the process exits.
///
/// Configuration faults (missing model settings) fail here, before binding.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let agent_config = config.clone();
    let agent = tokio::task::spawn_blocking(move || Agent::from_config(&agent_config)).await??;

    let state = AppState::new(
        Arc::new(agent),
        Arc::new(InMemorySessionStore::new(config.session.max_messages)),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "docent listening");
    eprintln!("docent listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
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
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ /api/agent/query ============

/// Validated request, independent of how it arrived.
struct AskRequest {
    query: String,
    allow_search: bool,
    session_id: String,
}

#[derive(Serialize)]
struct AskResponse {
    #[serde(flatten)]
    run: AgentRun,
    session_id: String,
}

async fn handle_query_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AskResponse>, AppError> {
    let query = params
        .get("query")
        .filter(|q| !q.is_empty())
        .cloned()
        .ok_or_else(|| bad_request("Missing 'query'"))?;
    let allow_search = params
        .get("allow_search")
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    let session_id = params
        .get("session_id")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    ask(
        &state,
        AskRequest {
            query,
            allow_search,
            session_id,
        },
    )
    .await
}

async fn handle_query_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AskResponse>, AppError> {
    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| bad_request("Invalid JSON"))?;

    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| bad_request("Missing 'query'"))?;
    let allow_search = payload.get("allow_search").map(truthy).unwrap_or(true);
    let session_id = payload
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string();

    ask(
        &state,
        AskRequest {
            query,
            allow_search,
            session_id,
        },
    )
    .await
}

async fn ask(state: &AppState, req: AskRequest) -> Result<Json<AskResponse>, AppError> {
    let history = state.sessions.history(&req.session_id);

    let run = state
        .agent
        .run(&req.query, req.allow_search, &history)
        .await
        .map_err(|e| {
            warn!(session = %req.session_id, error = %e, "agent run failed");
            internal(format!("Agent run failed: {:#}", e))
        })?;

    record_exchange(state.sessions.as_ref(), &req.session_id, &req.query, &run.answer);

    Ok(Json(AskResponse {
        run,
        session_id: req.session_id,
    }))
}

/// JSON truthiness: null, false, 0, "" and empty containers are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

async fn handle_preflight() -> Json<Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn handle_method_not_allowed() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        code: "method_not_allowed",
        message: "Only GET or POST allowed".to_string(),
    }
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .agent
        .tools()
        .schemas()
        .into_iter()
        .map(|s| ToolInfo {
            name: s.function.name,
            description: s.function.description,
            parameters: s.function.parameters,
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("false")));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!([])));
    }
}
