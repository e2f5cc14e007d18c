//! Task table, task commands and scheduler status.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use courier_core::{SchedulerState, StatusCounts, TaskAction, TaskId, TaskSpec, TaskView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AppState;
use super::error::{ApiError, ApiResult, status_for};

#[derive(Debug, Serialize, Deserialize)]
pub struct TasksTable {
    pub data: Vec<TaskView>,
}

/// Body of `POST /manage_tasks`.
#[derive(Debug, Deserialize)]
pub struct ManageTaskRequest {
    pub action: String,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Spec of the task to create; only read by `start`.
    #[serde(default)]
    pub task: Option<TaskSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Body of `POST /task_action`.
#[derive(Debug, Deserialize)]
pub struct TaskActionRequest {
    pub action: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailedAction {
    pub task_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskActionResponse {
    pub message: String,
    pub succeeded: Vec<TaskId>,
    pub failed: Vec<FailedAction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub workers: usize,
    pub active: usize,
    pub counts: StatusCounts,
}

/// GET /get_tasks_table
pub async fn get_tasks_table(State(state): State<AppState>) -> ApiResult<Json<TasksTable>> {
    let data = state.feed.snapshot().await?;
    debug!(rows = data.len(), "task table served");
    Ok(Json(TasksTable { data }))
}

/// GET /get_task/:task_id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskView>> {
    let id: TaskId = task_id.parse()?;
    Ok(Json(state.feed.task(id).await?))
}

/// POST /manage_tasks
pub async fn manage_tasks(
    State(state): State<AppState>,
    payload: Result<Json<ManageTaskRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    info!(action = %request.action, task_id = ?request.task_id, "manage_tasks");

    let response = match request.action.as_str() {
        "start" => {
            let spec = request
                .task
                .ok_or_else(|| ApiError::validation("action 'start' requires a task"))?;
            let task = state.gateway.add_task(spec).await?;
            MessageResponse {
                message: format!("Task {} queued", task.id),
                task_id: Some(task.id),
            }
        }
        "delete_finished" => {
            let removed = state.gateway.delete_finished().await?;
            MessageResponse {
                message: format!("Deleted {removed} finished tasks"),
                task_id: None,
            }
        }
        "delete_failed" => {
            let removed = state.gateway.delete_failed().await?;
            MessageResponse {
                message: format!("Deleted {removed} failed tasks"),
                task_id: None,
            }
        }
        other => {
            let action: TaskAction = other.parse()?;
            let raw = request.task_id.ok_or_else(|| {
                ApiError::validation(format!("action '{action}' requires a task_id"))
            })?;
            let id: TaskId = raw.parse()?;
            let receipt = state.gateway.apply(action, id).await?;
            MessageResponse {
                message: receipt.message,
                task_id: Some(receipt.task_id),
            }
        }
    };
    Ok(Json(response))
}

/// POST /task_action
///
/// Applies one action to many tasks. Every ID is handled on its own; the
/// response is 200 when at least one succeeded (or none were given), otherwise
/// it carries the status of the first failure.
pub async fn task_action(
    State(state): State<AppState>,
    payload: Result<Json<TaskActionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TaskActionResponse>)> {
    let Json(request) = payload?;
    let action: TaskAction = request.action.parse()?;

    let mut ids = Vec::with_capacity(request.ids.len());
    let mut failed = Vec::new();
    let mut first_failure = None;
    for raw in &request.ids {
        match raw.parse::<TaskId>() {
            Ok(id) => ids.push(id),
            Err(e) => {
                let err = ApiError::from(e);
                first_failure.get_or_insert(err.status_code());
                failed.push(FailedAction {
                    task_id: raw.clone(),
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    let report = state.gateway.apply_bulk(action, &ids).await;
    for (id, e) in &report.failed {
        first_failure.get_or_insert(status_for(e.kind()));
        failed.push(FailedAction {
            task_id: id.to_string(),
            code: e.kind().code().to_string(),
            message: e.to_string(),
        });
    }
    let succeeded: Vec<TaskId> = report.succeeded.iter().map(|r| r.task_id).collect();

    let status = match first_failure {
        Some(status) if succeeded.is_empty() => status,
        _ => StatusCode::OK,
    };
    info!(
        action = %action,
        succeeded = succeeded.len(),
        failed = failed.len(),
        "task_action"
    );
    let response = TaskActionResponse {
        message: format!("{action}: {} succeeded, {} failed", succeeded.len(), failed.len()),
        succeeded,
        failed,
    };
    Ok((status, Json(response)))
}

/// GET /scheduler_status
pub async fn scheduler_status(State(state): State<AppState>) -> ApiResult<Json<SchedulerStatus>> {
    let counts = state.feed.counts().await?;
    Ok(Json(SchedulerStatus {
        state: state.scheduler.state(),
        workers: state.scheduler.workers(),
        active: state.scheduler.active_count(),
        counts,
    }))
}
