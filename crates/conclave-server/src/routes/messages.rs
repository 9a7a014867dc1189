//! Communication endpoints — direct messages, broadcast, and the per-agent
//! audit tail.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use conclave_core::types::{Message, MessageType};
use conclave_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Sender recorded for messages entering through the HTTP surface.
const HTTP_SENDER: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Wire name of the message type; defaults to `request`. Unknown
    /// values are rejected, never coerced.
    pub message_type: Option<String>,
    #[serde(default)]
    pub requires_response: bool,
    pub priority: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub content: String,
    pub message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TailParams {
    pub limit: Option<usize>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    // 404 for unknown agents before touching the broker.
    state.manager.get(id)?;

    let message_type = match req.message_type.as_deref() {
        Some(raw) => MessageType::parse(raw)?,
        None => MessageType::Request,
    };
    let mut msg = Message::new(HTTP_SENDER, id.to_string(), message_type, req.content)
        .with_requires_response(req.requires_response);
    if let Some(priority) = req.priority {
        msg = msg.with_priority(priority);
    }
    let message_id = msg.id;

    if !state.broker.send(msg) {
        return Err(ApiError(Error::Conflict(format!(
            "agent {id} has no active inbox; start the agent first"
        ))));
    }
    Ok(Json(json!({
        "message": "Message sent",
        "message_id": message_id,
    })))
}

pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let message_type = match req.message_type.as_deref() {
        Some(raw) => MessageType::parse(raw)?,
        None => MessageType::Notification,
    };
    if !state.manager.broadcast(HTTP_SENDER, &req.content, message_type) {
        return Err(ApiError(Error::Conflict(
            "no active agents to broadcast to".into(),
        )));
    }
    Ok(Json(json!({ "message": "Broadcast sent" })))
}

pub async fn agent_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<TailParams>,
) -> ApiResult<Json<Vec<Message>>> {
    state.manager.get(id)?;
    let limit = params.limit.unwrap_or(50).min(500);
    let messages = state.store.recipient_history(&id.to_string(), limit)?;
    Ok(Json(messages))
}
