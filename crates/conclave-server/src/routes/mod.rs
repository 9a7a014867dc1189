//! HTTP surface — route table for `/api/v1` plus the liveness probe.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub mod agents;
pub mod messages;
pub mod system;
pub mod tasks;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tools", get(system::list_tools))
        .route("/agents", post(agents::create_agent).get(agents::list_agents))
        .route(
            "/agents/{id}",
            get(agents::get_agent).delete(agents::delete_agent),
        )
        .route("/agents/{id}/start", post(agents::start_agent))
        .route("/agents/{id}/stop", post(agents::stop_agent))
        .route("/agents/{id}/status", get(agents::agent_status))
        .route("/agents/{id}/think", post(agents::think))
        .route("/agents/{id}/message", post(messages::send_message))
        .route("/agents/{id}/messages", get(messages::agent_messages))
        .route("/broadcast", post(messages::broadcast))
        .route("/teams", post(agents::create_team))
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}/assign/{agent_id}", post(tasks::assign_task))
        .route("/tasks/{id}/complete", post(tasks::complete_task))
        .route("/system/stats", get(system::system_stats))
        .route("/system/health", get(system::system_health));

    Router::new()
        .route("/", get(system::root))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
