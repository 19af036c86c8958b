//! REST endpoints for onboarding cases.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::model::OnboardingRequest;
use super::orchestrator::Orchestrator;
use crate::error::{Error, OnboardingError, StoreError};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Build the router with permissive CORS so browser dashboards can call it.
pub fn onboarding_routes(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/employees", get(list_employees))
        .route("/api/employees/{id}", get(get_employee))
        .route("/api/onboard", post(onboard))
        .route(
            "/api/employees/{id}/tasks/{task_id}/complete",
            post(complete_task),
        )
        .route("/api/employees/{id}/tasks/{task_id}/retry", post(retry_task))
        .route("/api/checklist/{role}", get(checklist))
        .layer(CorsLayer::permissive())
        .with_state(AppState { orchestrator })
}

type Reply = (StatusCode, Json<Value>);

fn error_reply(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({ "error": message.into() })))
}

/// Map an engine error onto an HTTP status.
fn error_response(err: Error) -> Reply {
    let status = match &err {
        Error::Onboarding(OnboardingError::InvalidRequest { .. }) => StatusCode::BAD_REQUEST,
        Error::Onboarding(OnboardingError::InvalidTransition { .. })
        | Error::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    error_reply(status, err.to_string())
}

fn parse_id(id: &str) -> Result<Uuid, Reply> {
    Uuid::parse_str(id).map_err(|_| error_reply(StatusCode::BAD_REQUEST, "Invalid employee ID"))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "onboard-agent",
        "employees": state.orchestrator.store().len().await,
        "integrations": state.orchestrator.dispatcher().modes(),
    }))
}

async fn list_employees(State(state): State<AppState>) -> impl IntoResponse {
    let employees = state.orchestrator.list().await;
    Json(json!({ "total": employees.len(), "employees": employees }))
}

async fn get_employee(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    match state.orchestrator.status(id).await {
        Ok(status) => (StatusCode::OK, Json(json!(status))),
        Err(e) => error_response(e),
    }
}

async fn onboard(
    State(state): State<AppState>,
    body: Result<Json<OnboardingRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.orchestrator.onboard(request).await {
        Ok(status) => (StatusCode::CREATED, Json(json!(status))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CompleteBody {
    details: Option<String>,
}

async fn complete_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    body: Bytes,
) -> Reply {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    // The body is optional; an empty one means no details.
    let details = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<CompleteBody>(&body) {
            Ok(b) => b.details,
            Err(e) => return error_reply(StatusCode::BAD_REQUEST, format!("Invalid body: {e}")),
        }
    };
    match state.orchestrator.complete_task(id, &task_id, details).await {
        Ok(result) => (StatusCode::OK, Json(json!(result))),
        Err(e) => error_response(e),
    }
}

async fn retry_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> Reply {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(reply) => return reply,
    };
    match state.orchestrator.retry_task(id, &task_id).await {
        Ok(task) => (StatusCode::OK, Json(json!({ "employee_id": id, "task": task }))),
        Err(e) => error_response(e),
    }
}

async fn checklist(State(state): State<AppState>, Path(role): Path<String>) -> impl IntoResponse {
    Json(json!(state.orchestrator.checklist(&role)))
}
