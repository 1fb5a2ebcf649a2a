//! HTTP API: health check and the streaming chat endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{OpenApi, ToSchema};

use pharma_core::chat::{self, ChatMessage};
use pharma_stream::trace::{log_summary, TraceContext};
use pharma_stream::translate::stream_agent_response;

use crate::state::AppState;

/// Request body for the chat/stream endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// Conversation history (at least one message).
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<ChatMessage>,
    /// Optional caller identifier (email or phone) for prescription lookups.
    pub user_identifier: Option<String>,
}

/// Response model for the health check endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Error body returned by non-streaming failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint for monitoring and container orchestration.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "pharma-agent".to_string(),
    })
}

/// Streaming chat endpoint for conversational interactions.
///
/// Accepts a conversation history and returns a stream of Server-Sent
/// Events: `token` (incremental text), `tool_call` (agent invoked a tool),
/// `tool_result` (tool output), `error`, and a final `done`. The
/// `X-Request-ID` response header carries the correlation id also found in
/// the server-side trace log.
#[utoipa::path(
    post,
    path = "/chat/stream",
    tag = "Chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "SSE stream of protocol events", content_type = "text/event-stream"),
        (status = 400, description = "Empty conversation history", body = ErrorResponse),
        (status = 503, description = "Reasoning engine not configured", body = ErrorResponse)
    )
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if req.messages.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "messages must contain at least one entry".to_string(),
            }),
        ));
    }

    let engine = state.engine.clone().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Reasoning engine not configured. Check agent settings.".to_string(),
            }),
        )
    })?;

    let trace = TraceContext::new(req.user_identifier.clone());
    let request_id = trace.request_id().to_string();

    info!(
        request_id = %request_id,
        messages = req.messages.len(),
        has_user_identifier = req.user_identifier.is_some(),
        engine = %engine.engine_name(),
        "chat stream request"
    );

    let messages = chat::with_user_context(req.messages, req.user_identifier.as_deref());

    let upstream = engine.stream_events(messages).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let events = stream_agent_response(upstream, Some(trace), |summary| log_summary(&summary));
    let sse_stream =
        events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    let headers = AppendHeaders([
        (HeaderName::from_static("x-request-id"), request_id),
        (
            HeaderName::from_static("cache-control"),
            "no-cache".to_string(),
        ),
    ]);

    Ok((headers, Sse::new(sse_stream)))
}

/// OpenAPI doc aggregator, served via Scalar UI at `/docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pharmacy Agent API",
        version = "0.1.0",
        description = "Real-time AI pharmacy agent for medication info, inventory, and prescriptions",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "Chat", description = "Streaming conversational endpoint"),
    ),
    paths(health, chat_stream),
    components(schemas(ChatRequest, HealthResponse, ErrorResponse))
)]
pub struct ApiDoc;
