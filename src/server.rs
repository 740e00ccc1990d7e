//! HTTP front end for the agent service.
//!
//! | Route                     | Purpose                                   |
//! |---------------------------|-------------------------------------------|
//! | `POST /agent/task`        | Single task, JSON answer                  |
//! | `POST /agent/message`     | Single task, plain-text answer            |
//! | `POST /agent/repository`  | Repository migration pipeline             |
//! | `GET /agent/log`          | Task log snapshot                         |
//! | `GET /health`             | Channel state and registry counters       |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::errors::{RelayError, ServiceError};
use crate::pipeline::{PipelineOutcome, RunStatus};
use crate::service::{AgentService, ServiceHealth, TaskAnswer};
use crate::task_log::LogEntry;

pub type SharedService = Arc<AgentService>;

/// Listener settings for `serve`.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Permissive CORS and bind on all interfaces
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            dev_mode: false,
        }
    }
}

// ── Request / response bodies ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRequest {
    pub repo_path: PathBuf,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryResponse {
    pub task_id: String,
    pub status: RunStatus,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub round_trips: usize,
}

impl From<PipelineOutcome> for RepositoryResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            failed_stage: outcome.failure.as_ref().map(|f| f.stage.label()),
            error: outcome.failure.as_ref().map(|f| f.error.to_string()),
            task_id: outcome.task_id,
            status: outcome.status,
            plan: outcome.text,
            round_trips: outcome.round_trips,
        }
    }
}

// ── Error mapping ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unprocessable(String),
    Relay(RelayError),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::EmptyTask | ServiceError::RepositoryNotFound { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            ServiceError::NoSourceFiles { .. } => ApiError::Unprocessable(err.to_string()),
            ServiceError::SourceRead { .. } | ServiceError::CollectTask(_) => {
                ApiError::Internal(err.to_string())
            }
            ServiceError::Relay(e) => ApiError::Relay(e),
        }
    }
}

fn relay_status(err: &RelayError) -> StatusCode {
    match err {
        RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RelayError::ChannelClosed | RelayError::SendFailure(_) | RelayError::Connection { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RelayError::DuplicateId { .. } => StatusCode::CONFLICT,
        RelayError::Backend(_) | RelayError::Cancelled { .. } | RelayError::Encode(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": msg}),
            ),
            ApiError::Relay(e) => (
                relay_status(&e),
                serde_json::json!({"error": e.to_string(), "kind": e.kind()}),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────

pub fn build_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/task", post(submit_task))
        .route("/agent/message", post(submit_message))
        .route("/agent/repository", post(submit_repository))
        .route("/agent/log", get(task_log))
        .with_state(service)
}

async fn health(State(service): State<SharedService>) -> Json<ServiceHealth> {
    Json(service.health())
}

async fn submit_task(
    State(service): State<SharedService>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskAnswer>, ApiError> {
    let answer = service.submit(&req.task, req.task_id.as_deref()).await?;
    Ok(Json(answer))
}

async fn submit_message(
    State(service): State<SharedService>,
    Json(req): Json<MessageRequest>,
) -> Result<String, ApiError> {
    let answer = service.submit(&req.message, None).await?;
    Ok(answer.render())
}

async fn submit_repository(
    State(service): State<SharedService>,
    Json(req): Json<RepositoryRequest>,
) -> Result<Json<RepositoryResponse>, ApiError> {
    let outcome = service
        .submit_repository(
            &req.repo_path,
            req.task_id.as_deref(),
            req.custom_prompt.as_deref(),
        )
        .await?;
    Ok(Json(outcome.into()))
}

async fn task_log(State(service): State<SharedService>) -> Json<Vec<LogEntry>> {
    Json(service.log().entries())
}

// ── Serving ──────────────────────────────────────────────────────────

/// Serve until Ctrl+C, then close the backend channel.
pub async fn serve(service: SharedService, config: ServerConfig) -> Result<()> {
    let mut app = build_router(service.clone());

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { config.host.as_str() };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    service.shutdown();
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
