//! HTTP proxy in front of the research backend
//!
//! Exposes a single `/api/chat` resource so browser front ends can talk to one
//! origin:
//! - `POST /api/chat` submits a message in search or research mode
//! - `GET /api/chat?research_id=..` reports research progress or the result
//! - `GET /api/chat?thread_id=..` returns a thread's messages
//!
//! Roles are normalized on every path. Backend failures and unreadable
//! request bodies become `500 {"error": ..}`; an unknown `mode` is treated as
//! search.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};

use crate::backend::{Backend, BackendClient, BackendMessage, JobStatus, ThreadResponse};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::state::{research_progress, MISSING_REPORT_MESSAGE, RESEARCH_ACKNOWLEDGEMENT};
use crate::types::{Mode, ResearchSummary, ToolCall};

/// Shared handler state
pub struct ProxyState {
    backend: Arc<dyn Backend>,
    iteration_limit: u32,
}

/// Request body for `POST /api/chat`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: Mode,
}

/// Anything other than `"research"` (including `null`) means search
fn lenient_mode<'de, D>(deserializer: D) -> std::result::Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    let mode = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match mode.as_ref().and_then(|v| v.as_str()) {
        Some("research") => Mode::Research,
        _ => Mode::Search,
    })
}

/// Query string for `GET /api/chat`
#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub research_id: Option<String>,
    pub thread_id: Option<String>,
}

/// A message as the proxy returns it
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(rename = "isLoading", skip_serializing_if = "std::ops::Not::not")]
    pub is_loading: bool,
}

impl EnvelopeMessage {
    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            is_error: false,
            is_loading: false,
        }
    }
}

impl From<BackendMessage> for EnvelopeMessage {
    fn from(msg: BackendMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content,
            tool_calls: msg.tool_calls,
            is_error: false,
            is_loading: false,
        }
    }
}

/// Response body for every `/api/chat` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub messages: Vec<EnvelopeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_data: Option<ResearchSummary>,
}

impl From<ThreadResponse> for ChatEnvelope {
    fn from(mut thread: ThreadResponse) -> Self {
        thread.normalize_roles();
        Self {
            thread_id: thread.thread_id,
            messages: thread.messages.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Handler failure, rendered as a JSON `{error}` body
#[derive(Debug)]
pub enum ProxyError {
    BadRequest(String),
    /// Request body missing, not JSON, or missing `message`
    Body(JsonRejection),
    Backend(Error),
}

impl From<Error> for ProxyError {
    fn from(e: Error) -> Self {
        ProxyError::Backend(e)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ProxyError::Body(rejection) => {
                tracing::warn!(error = %rejection.body_text(), "Rejected chat request body");
                (StatusCode::INTERNAL_SERVER_ERROR, rejection.body_text())
            }
            ProxyError::Backend(e) => {
                tracing::error!(error = %e, "Proxy request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the proxy router over `backend`
pub fn router(backend: Arc<dyn Backend>, iteration_limit: u32) -> Router {
    let state = Arc::new(ProxyState {
        backend,
        iteration_limit,
    });
    Router::new()
        .route("/api/chat", post(post_chat).get(get_chat))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the proxy on `config.server.bind` until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    let client = BackendClient::new(&config.backend)?;
    let app = router(Arc::new(client), config.research.iteration_limit);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        backend = %config.backend.base_url,
        "Proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Proxy shutting down");
        })
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn post_chat(
    State(state): State<Arc<ProxyState>>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatEnvelope>, ProxyError> {
    let Json(request) = body.map_err(ProxyError::Body)?;
    tracing::info!(mode = %request.mode, "Proxying chat message");

    match request.mode {
        Mode::Research => {
            let started = state
                .backend
                .start_research(&request.message, state.iteration_limit)
                .await?;
            let research_id = started.research_id;

            let mut message = EnvelopeMessage::assistant(RESEARCH_ACKNOWLEDGEMENT);
            message.tool_calls = vec![ToolCall::deep_research(&research_id, &request.message)];

            Ok(Json(ChatEnvelope {
                thread_id: Some(research_id.clone()),
                research_id: Some(research_id),
                status: Some(JobStatus::InProgress),
                progress: Some(0),
                total_iterations: Some(state.iteration_limit),
                messages: vec![message],
                ..Default::default()
            }))
        }
        Mode::Search => {
            let thread_id = request.thread_id.as_deref().filter(|id| !id.is_empty());
            let response = state.backend.query(&request.message, thread_id).await?;
            Ok(Json(response.into()))
        }
    }
}

async fn get_chat(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<ChatQuery>,
) -> std::result::Result<Json<ChatEnvelope>, ProxyError> {
    if let Some(research_id) = query.research_id.filter(|id| !id.is_empty()) {
        return research_envelope(state.backend.as_ref(), research_id)
            .await
            .map(Json);
    }

    if let Some(thread_id) = query.thread_id.filter(|id| !id.is_empty()) {
        let thread = state.backend.thread(&thread_id).await?;
        tracing::debug!(thread_id = %thread_id, messages = thread.messages.len(), "Thread fetched");
        return Ok(Json(thread.into()));
    }

    Err(ProxyError::BadRequest(
        "Missing research_id or thread_id parameter".to_string(),
    ))
}

async fn research_envelope(
    backend: &dyn Backend,
    research_id: String,
) -> std::result::Result<ChatEnvelope, ProxyError> {
    let status = backend.research_status(&research_id).await?;

    match status.status {
        JobStatus::Completed => {
            let result = backend.research_result(&research_id).await?;

            let Some(report) = result.report() else {
                tracing::error!(research_id = %research_id, "Research completed without a report");
                let mut message = EnvelopeMessage::assistant(MISSING_REPORT_MESSAGE);
                message.is_error = true;
                return Ok(ChatEnvelope {
                    thread_id: Some(research_id),
                    status: Some(JobStatus::Error),
                    error: Some("Research completed but no report was generated".to_string()),
                    messages: vec![message],
                    ..Default::default()
                });
            };

            let query = result.query.clone().unwrap_or_default();
            let mut message = EnvelopeMessage::assistant(report);
            message.tool_calls = vec![ToolCall::deep_research(&research_id, &query)];

            Ok(ChatEnvelope {
                thread_id: Some(research_id),
                status: Some(JobStatus::Completed),
                messages: vec![message],
                research_data: Some(result.summary()),
                ..Default::default()
            })
        }
        JobStatus::Error => {
            let mut message =
                EnvelopeMessage::assistant("Sorry, I encountered an error while researching that topic.");
            message.is_error = true;
            Ok(ChatEnvelope {
                thread_id: Some(research_id),
                status: Some(JobStatus::Error),
                error: Some("Research failed to complete".to_string()),
                messages: vec![message],
                ..Default::default()
            })
        }
        JobStatus::Queued | JobStatus::InProgress | JobStatus::Unknown => {
            let progress = status.progress();
            let total = status.total_iterations();
            let mut message = EnvelopeMessage::assistant(research_progress(progress, total));
            message.is_loading = true;
            Ok(ChatEnvelope {
                thread_id: Some(research_id.clone()),
                research_id: Some(research_id),
                status: Some(JobStatus::InProgress),
                progress: Some(progress),
                total_iterations: Some(total),
                messages: vec![message],
                ..Default::default()
            })
        }
    }
}
