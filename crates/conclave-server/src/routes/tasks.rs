//! Task management endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use conclave_core::types::{Task, TaskPriority, TaskStatus};
use conclave_core::Error;
use conclave_scheduler::{AssignOutcome, TaskSpec};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ─────────────────────────────────────────────
// Request bodies & filters
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub assigned_agent: Option<Uuid>,
    pub priority: Option<String>,
    /// RFC 3339 timestamp.
    pub due_date: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    pub parent_task: Option<Uuid>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub assigned_agent: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteParams {
    pub result: Option<String>,
}

fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ApiError(Error::Validation(format!(
                "invalid due_date '{raw}': use RFC 3339"
            )))
        })
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let mut spec = TaskSpec::new(req.title, req.description, "admin")
        .dependencies(req.dependencies);
    if let Some(priority) = req.priority.as_deref() {
        spec = spec.priority(TaskPriority::parse(priority)?);
    }
    if let Some(due) = req.due_date.as_deref() {
        spec = spec.due_date(parse_due_date(due)?);
    }
    if let Some(agent) = req.assigned_agent {
        spec = spec.assigned_agent(agent);
    }
    if let Some(parent) = req.parent_task {
        spec = spec.parent_task(parent);
    }
    if let Some(metadata) = req.metadata {
        spec = spec.metadata(metadata);
    }

    let task = state.scheduler.create(spec).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Json<Vec<Task>>> {
    let status = filter
        .status
        .as_deref()
        .map(TaskStatus::parse)
        .transpose()?;
    Ok(Json(state.scheduler.list(status, filter.assigned_agent).await))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.scheduler.get(id).await?))
}

pub async fn assign_task(
    State(state): State<AppState>,
    Path((task_id, agent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.scheduler.assign(task_id, agent_id).await? {
        AssignOutcome::Assigned(task) => Ok(Json(json!({
            "message": format!("Task {task_id} assigned to agent {agent_id}"),
            "task": task,
        }))),
        AssignOutcome::Blocked(task) => Ok(Json(json!({
            "message": format!("Task {task_id} is blocked on unsatisfied dependencies"),
            "task": task,
        }))),
    }
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<CompleteParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state.scheduler.complete(id, params.result).await?;
    Ok(Json(json!({
        "message": format!("Task {id} marked as completed"),
        "task": task,
    })))
}
