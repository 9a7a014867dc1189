//! Shared handler state — every service built once at startup, no process
//! globals.

use std::sync::Arc;

use conclave_agent::tools::ToolRegistry;
use conclave_agent::AgentManager;
use conclave_core::broker::MessageBroker;
use conclave_core::store::Store;
use conclave_models::ModelRouter;
use conclave_scheduler::TaskScheduler;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub broker: Arc<MessageBroker>,
    pub scheduler: Arc<TaskScheduler>,
    pub manager: Arc<AgentManager>,
    pub models: Arc<ModelRouter>,
    pub tools: Arc<ToolRegistry>,
}
