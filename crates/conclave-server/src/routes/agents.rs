//! Agent management and interaction endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use conclave_agent::AgentStatus;
use conclave_core::types::{
    AgentConfig, AutonomyLevel, CommunicationRight, MemoryScope, TaskPriority,
};
use conclave_core::Error;
use conclave_scheduler::TaskSpec;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ─────────────────────────────────────────────
// Request/response bodies
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub role: String,
    pub model_id: String,
    #[serde(default)]
    pub allowed_tool_names: Vec<String>,
    pub autonomy_level: Option<String>,
    pub communication_rights: Option<Vec<String>>,
    pub memory_scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentListEntry {
    #[serde(flatten)]
    pub config: AgentConfig,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ThinkRequest {
    pub prompt: String,
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ThinkResponse {
    pub agent_id: Uuid,
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub agent_ids: Vec<Uuid>,
    pub leader: Option<Uuid>,
    /// When present, a high-priority kickoff task is created for the team
    /// leader (or left unassigned without one).
    pub description: Option<String>,
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

pub async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<AgentConfig>)> {
    let mut config = AgentConfig::new(req.name, req.role, req.model_id);
    config.allowed_tools = req.allowed_tool_names;
    if let Some(level) = req.autonomy_level.as_deref() {
        config.autonomy_level = AutonomyLevel::parse(level)?;
    }
    if let Some(rights) = &req.communication_rights {
        config.communication_rights = rights
            .iter()
            .map(|r| CommunicationRight::parse(r))
            .collect::<Result<_, _>>()?;
    }
    if let Some(scope) = req.memory_scope.as_deref() {
        config.memory_scope = MemoryScope::parse(scope)?;
    }

    let created = state.manager.create(config)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_agents(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AgentListEntry>>> {
    let mut entries = Vec::new();
    for config in state.manager.list()? {
        let status = if state.manager.is_active(config.agent_id).await {
            "active"
        } else {
            "inactive"
        };
        entries.push(AgentListEntry { config, status });
    }
    Ok(Json(entries))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AgentConfig>> {
    Ok(Json(state.manager.get(id)?))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.manager.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.manager.start(id).await?;
    Ok(Json(json!({ "message": format!("Agent {id} started") })))
}

pub async fn stop_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    // Stopping an unknown agent is a 404, not a silent no-op.
    state.manager.get(id)?;
    state.manager.stop(id).await?;
    Ok(Json(json!({ "message": format!("Agent {id} stopped") })))
}

pub async fn agent_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AgentStatus>> {
    Ok(Json(state.manager.status(id).await?))
}

pub async fn think(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ThinkRequest>,
) -> ApiResult<Json<ThinkResponse>> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError(Error::Validation("prompt must not be empty".into())));
    }
    let response = state.manager.think(id, &req.prompt, req.max_iterations).await?;
    Ok(Json(ThinkResponse {
        agent_id: id,
        response,
    }))
}

pub async fn create_team(
    State(state): State<AppState>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let team = state
        .manager
        .create_team(&req.name, req.agent_ids, req.leader)?;

    let kickoff_task = match &req.description {
        Some(description) => {
            let mut spec = TaskSpec::new(
                format!("Team kickoff: {}", team.name),
                description.clone(),
                "admin",
            )
            .priority(TaskPriority::High);
            if let Some(leader) = team.leader {
                spec = spec.assigned_agent(leader);
            }
            Some(state.scheduler.create(spec).await?.task_id)
        }
        None => None,
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "team": team,
            "kickoff_task": kickoff_task,
        })),
    ))
}
