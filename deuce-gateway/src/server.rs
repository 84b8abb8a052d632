use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::orchestrator::TurnError;
use crate::state::AppState;

/// Message request from HTTP API
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub models: Vec<String>,
    pub index_generation: u64,
    pub index_chunks: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionReset {
    pub session_id: String,
    pub reset: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let status = match self {
            TurnError::EmptyMessage => StatusCode::BAD_REQUEST,
            TurnError::GenerationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TurnError::TurnTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        error_response(status, self.user_message())
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(session_handler).delete(reset_session_handler),
        )
        .route("/sessions/{id}/messages", post(message_handler))
        .route("/tools", get(tools_handler))
        .route("/knowledge/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.index().snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models: state.model_chain(),
        index_generation: snapshot.generation,
        index_chunks: snapshot.len(),
        sessions: state.sessions().len(),
    })
}

/// POST /sessions - hand out a fresh session id
async fn create_session_handler() -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

/// POST /sessions/{id}/messages
async fn message_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Response {
    match state
        .orchestrator()
        .send_message(&session_id, &request.text)
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            if !matches!(err, TurnError::EmptyMessage) {
                error!("[session:{}] turn failed: {}", session_id, err);
            }
            err.into_response()
        }
    }
}

/// GET /sessions/{id}
async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    match state.orchestrator().history(&session_id).await {
        Some(view) => Json(view).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("unknown session: {session_id}"),
        ),
    }
}

/// DELETE /sessions/{id}
async fn reset_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let reset = state.orchestrator().reset_session(&session_id);
    Json(SessionReset { session_id, reset })
}

async fn tools_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tools: Vec<ToolInfo> = state
        .orchestrator()
        .registry()
        .tools()
        .map(|tool| ToolInfo {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema().to_json_schema(),
            output_schema: tool.output_schema().to_json_schema(),
        })
        .collect();
    Json(tools)
}

/// POST /knowledge/rebuild
async fn rebuild_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.rebuild_knowledge().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!("Knowledge rebuild failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
