//! Liveness, tool listing, stats, and health endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use conclave_agent::tools::ToolInfo;
use conclave_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "conclave",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    Json(state.tools.describe())
}

#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub total_agents: usize,
    pub active_agents: usize,
    pub available_models: usize,
    pub available_tools: usize,
    pub total_tasks: usize,
    pub total_queued_messages: usize,
    pub active_conversations: usize,
}

pub async fn system_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<SystemStatsResponse>> {
    let broker = state.broker.stats();
    Ok(Json(SystemStatsResponse {
        total_agents: state.manager.list()?.len(),
        active_agents: state.manager.active_count().await,
        available_models: state.models.model_count(),
        available_tools: state.tools.len(),
        total_tasks: state.scheduler.task_count().await,
        total_queued_messages: broker.total_queued_messages,
        active_conversations: broker.active_conversations,
    }))
}

pub async fn system_health(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .health_check()
        .map_err(|e| ApiError(Error::BackendUnavailable(format!("database: {e}"))))?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected",
        "message_broker": "running",
        "task_scheduler": "running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
