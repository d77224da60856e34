//! HTTP API of the scheduler.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    FilterRequest, QueueSnapshot, QueueSummary, SchedulerError, SchedulerService, Task, TaskStatus,
};

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Body of `PATCH /tasks/:task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPatch {
    /// Requested status.
    pub status: TaskStatus,
}

/// Error body returned by every failing route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind, e.g. `not_allowed`.
    pub error: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Query of the pop routes.
#[derive(Debug, Default, Deserialize)]
pub struct PopParams {
    /// JSON-encoded [`FilterRequest`].
    pub filters: Option<String>,
    /// Maximum tasks to pop (default 1).
    pub limit: Option<usize>,
}

/// Query of `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    /// Restrict to one queue.
    pub queue_id: Option<String>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
}

/// Pop result: a single task (or null) for `limit=1`, a list otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopResponse {
    /// More than one task requested.
    Many(Vec<Task>),
    /// One task requested.
    One(Option<Task>),
}

/// Scheduler error mapped to an HTTP response.
#[derive(Debug)]
pub struct ApiError(SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            SchedulerError::QueueFull(_)
            | SchedulerError::NotAllowed(_)
            | SchedulerError::InvalidItem(_)
            | SchedulerError::InvalidFilter(_)
            | SchedulerError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            SchedulerError::TaskNotFound(_) | SchedulerError::NoQueuesAvailable(_) => {
                StatusCode::NOT_FOUND
            }
            SchedulerError::QueueEmpty(_) => StatusCode::OK,
            SchedulerError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.kind().to_owned(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bad_json(rejection: &JsonRejection) -> ApiError {
    ApiError(SchedulerError::InvalidItem(rejection.body_text()))
}

fn parse_filters(raw: Option<&str>) -> ApiResult<Option<FilterRequest>> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| {
            serde_json::from_str(s)
                .map_err(|e| ApiError(SchedulerError::InvalidFilter(e.to_string())))
        })
        .transpose()
}

/// Build the router over a scheduler service.
pub fn router(service: Arc<SchedulerService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/queues", get(list_queues))
        .route("/queues/:queue_id", get(get_queue))
        .route("/queues/:queue_id/push", axum::routing::post(push_task))
        .route("/queues/:queue_id/pop", get(pop_tasks).post(pop_tasks_with_body))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id", get(get_task).patch(patch_task))
        .with_state(service)
}

/// GET /health
pub async fn health() -> Json<Health> {
    Json(Health { ok: true })
}

/// GET /queues
async fn list_queues(State(service): State<Arc<SchedulerService>>) -> ApiResult<Json<Vec<QueueSummary>>> {
    Ok(Json(service.list_queues()?))
}

/// GET /queues/:queue_id
async fn get_queue(
    State(service): State<Arc<SchedulerService>>,
    Path(queue_id): Path<String>,
) -> ApiResult<Json<QueueSnapshot>> {
    Ok(Json(service.snapshot(&queue_id)?))
}

/// POST /queues/:queue_id/push
async fn push_task(
    State(service): State<Arc<SchedulerService>>,
    Path(queue_id): Path<String>,
    body: Result<Json<Task>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let Json(task) = body.map_err(|e| bad_json(&e))?;
    let task = service.push(&queue_id, task)?;
    Ok((StatusCode::CREATED, Json(task)))
}

fn pop(
    service: &SchedulerService,
    queue_id: &str,
    filters: Option<&FilterRequest>,
    limit: Option<usize>,
) -> ApiResult<Json<PopResponse>> {
    let limit = limit.unwrap_or(1).max(1);
    let mut tasks = service.pop(queue_id, filters, limit)?;
    if limit == 1 {
        return Ok(Json(PopResponse::One(tasks.pop())));
    }
    Ok(Json(PopResponse::Many(tasks)))
}

/// GET /queues/:queue_id/pop?filters=<json>&limit=N
async fn pop_tasks(
    State(service): State<Arc<SchedulerService>>,
    Path(queue_id): Path<String>,
    params: Result<Query<PopParams>, QueryRejection>,
) -> ApiResult<Json<PopResponse>> {
    let Query(params) =
        params.map_err(|e| ApiError(SchedulerError::InvalidFilter(e.body_text())))?;
    let filters = parse_filters(params.filters.as_deref())?;
    pop(&service, &queue_id, filters.as_ref(), params.limit)
}

/// POST /queues/:queue_id/pop?limit=N with a filter request body
async fn pop_tasks_with_body(
    State(service): State<Arc<SchedulerService>>,
    Path(queue_id): Path<String>,
    Query(params): Query<PopParams>,
    body: Result<Json<FilterRequest>, JsonRejection>,
) -> ApiResult<Json<PopResponse>> {
    let Json(filters) =
        body.map_err(|e| ApiError(SchedulerError::InvalidFilter(e.body_text())))?;
    pop(&service, &queue_id, Some(&filters), params.limit)
}

/// GET /tasks/:task_id
async fn get_task(
    State(service): State<Arc<SchedulerService>>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(service.get_task(task_id)?))
}

/// PATCH /tasks/:task_id
async fn patch_task(
    State(service): State<Arc<SchedulerService>>,
    Path(task_id): Path<Uuid>,
    body: Result<Json<StatusPatch>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let Json(patch) = body.map_err(|e| bad_json(&e))?;
    Ok(Json(service.patch_status(task_id, patch.status)?))
}

/// GET /tasks?queue_id=&status=
async fn list_tasks(
    State(service): State<Arc<SchedulerService>>,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Json<Vec<Task>>> {
    let mut tasks = service.list_tasks(params.queue_id.as_deref(), None)?;
    if let Some(status) = params.status {
        tasks.retain(|t| t.status == status);
    }
    Ok(Json(tasks))
}
