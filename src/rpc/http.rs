//! HTTP server adapter for the foreman protocol.
//!
//! One POST route per [`ForemanApi`] operation, plus a small admin surface
//! for submitting and inspecting tasks. All bodies are JSON.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::error;
use uuid::Uuid;

use crate::foreman::Foreman;
use crate::rpc::ForemanApi;
use crate::rpc::types::{
    HeartbeatRequest, PullTaskRequest, RegisterWorkerRequest, ReportFailureRequest,
    ReportResultRequest,
};
use crate::tasks::model::NewTask;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ForemanState {
    pub foreman: Arc<Foreman>,
}

/// Build the Axum router with the worker protocol and admin routes.
pub fn colony_routes(foreman: Arc<Foreman>) -> Router {
    let state = ForemanState { foreman };

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/tasks", post(submit_task))
        .route("/api/v1/tasks/pull", post(pull_task))
        .route("/api/v1/tasks/result", post(report_result))
        .route("/api/v1/tasks/failure", post(report_failure))
        .route("/api/v1/tasks/{id}", get(get_task))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(heartbeat))
        .with_state(state)
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    error!("Request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "colony-foreman"
    }))
}

// ── Worker protocol ─────────────────────────────────────────────────

async fn pull_task(
    State(state): State<ForemanState>,
    Json(req): Json<PullTaskRequest>,
) -> impl IntoResponse {
    match state.foreman.pull_task(req).await {
        Ok(resp) => (StatusCode::OK, Json(serde_json::json!(resp))),
        Err(e) => internal_error(e),
    }
}

async fn report_result(
    State(state): State<ForemanState>,
    Json(req): Json<ReportResultRequest>,
) -> impl IntoResponse {
    match state.foreman.report_result(req).await {
        Ok(resp) => (StatusCode::OK, Json(serde_json::json!(resp))),
        Err(e) => internal_error(e),
    }
}

async fn report_failure(
    State(state): State<ForemanState>,
    Json(req): Json<ReportFailureRequest>,
) -> impl IntoResponse {
    match state.foreman.report_failure(req).await {
        Ok(resp) => (StatusCode::OK, Json(serde_json::json!(resp))),
        Err(e) => internal_error(e),
    }
}

async fn register_worker(
    State(state): State<ForemanState>,
    Json(req): Json<RegisterWorkerRequest>,
) -> impl IntoResponse {
    match state.foreman.register_worker(req).await {
        Ok(resp) => (StatusCode::OK, Json(serde_json::json!(resp))),
        Err(e) => internal_error(e),
    }
}

async fn heartbeat(
    State(state): State<ForemanState>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    match state.foreman.heartbeat(req).await {
        Ok(resp) => (StatusCode::OK, Json(serde_json::json!(resp))),
        Err(e) => internal_error(e),
    }
}

// ── Admin ───────────────────────────────────────────────────────────

async fn submit_task(
    State(state): State<ForemanState>,
    Json(new): Json<NewTask>,
) -> impl IntoResponse {
    match state.foreman.submit_task(new).await {
        Ok(task) => (StatusCode::CREATED, Json(serde_json::json!(task))),
        Err(e) => internal_error(e),
    }
}

async fn get_task(State(state): State<ForemanState>, Path(id): Path<String>) -> impl IntoResponse {
    let task_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid task ID"})),
            );
        }
    };

    match state.foreman.get_task(task_id).await {
        Ok(Some(task)) => (StatusCode::OK, Json(serde_json::json!(task))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Task not found"})),
        ),
        Err(e) => internal_error(e),
    }
}

async fn list_workers(State(state): State<ForemanState>) -> impl IntoResponse {
    match state.foreman.list_workers().await {
        Ok(workers) => (StatusCode::OK, Json(serde_json::json!({"workers": workers}))),
        Err(e) => internal_error(e),
    }
}
