// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use rudder_runs::{ErrorCode, RunError};
use rudder_tasks::{TaskRecord, TaskService, TaskSpec};

use crate::sse::events_stream;

pub fn router(service: TaskService) -> Router {
    Router::new()
        .route("/v1/tasks", post(create_task))
        .route("/v1/tasks/:id", get(get_task))
        .route("/v1/tasks/:id/events", get(task_events))
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/:id", axum::routing::delete(close_session))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Client errors surface as 4xx with the error envelope; everything the
/// executor does afterwards flows through the task state and its event
/// stream with a 200.
fn error_response(err: RunError) -> Response {
    let status = match err.code {
        ErrorCode::InvalidParameter
        | ErrorCode::TemplateNotFound
        | ErrorCode::TrustLevelNotAllowed => StatusCode::BAD_REQUEST,
        ErrorCode::RunNotFound | ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorCode::RunBackpressure => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.message, "errorCode": err.code }))).into_response()
}

async fn create_task(
    State(service): State<TaskService>,
    Json(spec): Json<TaskSpec>,
) -> Response {
    match service.submit_task(spec).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({
                "taskId": record.task_id,
                "traceId": record.trace_id,
                "status": "running",
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_task(State(service): State<TaskService>, Path(id): Path<String>) -> Response {
    let Some(record) = service.get_task(&id) else {
        return error_response(RunError::new(
            ErrorCode::RunNotFound,
            format!("no task {id}"),
        ));
    };
    Json(task_view(&record)).into_response()
}

/// The wire view of a task: the record plus, once terminal, the
/// `result{success, traceId}` block clients key on.
fn task_view(record: &TaskRecord) -> Value {
    let mut view = serde_json::to_value(record).unwrap_or(Value::Null);
    if record.last_event == "done" {
        let success = matches!(record.status.as_str(), "succeeded" | "partial_success");
        view["result"] = json!({
            "success": success,
            "traceId": record.trace_id,
            "data": record.result,
        });
        view["lastEvent"] = json!("done");
    }
    view
}

async fn task_events(State(service): State<TaskService>, Path(id): Path<String>) -> Response {
    if service.get_task(&id).is_none() {
        return error_response(RunError::new(
            ErrorCode::RunNotFound,
            format!("no task {id}"),
        ));
    }
    events_stream(service, id).into_response()
}

async fn create_session(State(service): State<TaskService>) -> Response {
    match service.create_browser_session().await {
        Ok(id) => (StatusCode::OK, Json(json!({ "sessionId": id }))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_sessions(State(service): State<TaskService>) -> Response {
    Json(json!({ "sessions": service.list_browser_sessions() })).into_response()
}

async fn close_session(State(service): State<TaskService>, Path(id): Path<String>) -> Response {
    match service.close_browser_session(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
