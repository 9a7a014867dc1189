//! Agent lifecycle manager — create/start/stop/delete, plus broadcast and
//! team coordination.
//!
//! The store holds persistent agent configuration; a transient
//! [`AgentRuntime`] is spawned when the agent is started and discarded on
//! stop. Starting registers the broker inbox and the scheduler worker
//! entry; stopping signals the runtime, waits for it to drain under a
//! deadline, and unregisters both.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use conclave_core::broker::MessageBroker;
use conclave_core::store::Store;
use conclave_core::types::{AgentConfig, AutonomyLevel, Message, MessageType, BROADCAST_RECIPIENT};
use conclave_core::{Error, Result};
use conclave_models::Generator;
use conclave_scheduler::TaskScheduler;

use crate::runtime::{AgentRuntime, DEFAULT_MAX_ITERATIONS};
use crate::tools::ToolRegistry;

struct ActiveAgent {
    runtime: Arc<AgentRuntime>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A named group of agents sharing a broadcast channel.
#[derive(Clone, Debug, Serialize)]
pub struct Team {
    pub name: String,
    pub members: Vec<Uuid>,
    pub leader: Option<Uuid>,
}

impl Team {
    /// The broadcast channel backing this team.
    pub fn channel(&self) -> String {
        format!("team_{}", self.name)
    }
}

/// Runtime status of one agent, for the status endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct AgentStatus {
    pub agent_id: Uuid,
    pub name: String,
    pub model_id: String,
    pub autonomy_level: AutonomyLevel,
    pub active: bool,
    pub queue_size: usize,
    pub current_tasks: usize,
}

/// Owns the `{agent_id → runtime}` lifecycle table.
pub struct AgentManager {
    store: Arc<Store>,
    broker: Arc<MessageBroker>,
    scheduler: Arc<TaskScheduler>,
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    drain_timeout: Duration,
    max_iterations: usize,
    active: tokio::sync::Mutex<HashMap<Uuid, ActiveAgent>>,
    teams: std::sync::RwLock<HashMap<String, Team>>,
}

impl AgentManager {
    pub fn new(
        store: Arc<Store>,
        broker: Arc<MessageBroker>,
        scheduler: Arc<TaskScheduler>,
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        drain_timeout: Duration,
    ) -> Self {
        AgentManager {
            store,
            broker,
            scheduler,
            generator,
            tools,
            drain_timeout,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            active: tokio::sync::Mutex::new(HashMap::new()),
            teams: std::sync::RwLock::new(HashMap::new()),
        }
    }

    // ─────────────────────────────────────────
    // CRUD
    // ─────────────────────────────────────────

    /// Persist a new agent configuration. The agent is not started.
    pub fn create(&self, config: AgentConfig) -> Result<AgentConfig> {
        if config.name.trim().is_empty() {
            return Err(Error::Validation("agent name must not be empty".into()));
        }
        self.store.insert_agent(&config)?;
        info!(agent_id = %config.agent_id, name = %config.name, "created agent");
        Ok(config)
    }

    pub fn get(&self, agent_id: Uuid) -> Result<AgentConfig> {
        self.store
            .get_agent(agent_id)?
            .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))
    }

    pub fn list(&self) -> Result<Vec<AgentConfig>> {
        self.store.list_agents()
    }

    /// Stop the agent if active, delete its row, and clear its persistent
    /// memory.
    pub async fn delete(&self, agent_id: Uuid) -> Result<()> {
        self.stop(agent_id).await?;
        if !self.store.delete_agent(agent_id)? {
            return Err(Error::NotFound(format!("agent {agent_id}")));
        }
        let cleared = self.store.clear_agent_memory(agent_id)?;
        info!(agent_id = %agent_id, memory_rows = cleared, "deleted agent");
        Ok(())
    }

    // ─────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────

    /// Spawn the agent's runtime and wire it to the broker and scheduler.
    /// Idempotent: starting a running agent is a no-op.
    pub async fn start(&self, agent_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.contains_key(&agent_id) {
            info!(agent_id = %agent_id, "agent already active");
            return Ok(());
        }

        let config = self.get(agent_id)?;
        let inbox = self.broker.register_agent(&agent_id.to_string());
        let (stop_tx, stop_rx) = watch::channel(false);

        let runtime = Arc::new(AgentRuntime::new(
            config.clone(),
            self.generator.clone(),
            self.tools.clone(),
            self.broker.clone(),
            self.scheduler.clone(),
            self.max_iterations,
            stop_rx,
        ));
        let handle = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run(inbox).await })
        };

        self.scheduler
            .register_worker(agent_id, config.autonomy_level)
            .await;
        active.insert(
            agent_id,
            ActiveAgent {
                runtime,
                stop_tx,
                handle,
            },
        );
        info!(agent_id = %agent_id, name = %config.name, "started agent");
        Ok(())
    }

    /// Signal the runtime, wait for it to drain (bounded), and unregister.
    /// Idempotent: stopping an inactive agent is a no-op.
    pub async fn stop(&self, agent_id: Uuid) -> Result<()> {
        let entry = self.active.lock().await.remove(&agent_id);
        let Some(mut entry) = entry else {
            return Ok(());
        };

        let _ = entry.stop_tx.send(true);
        match tokio::time::timeout(self.drain_timeout, &mut entry.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(agent_id = %agent_id, error = %e, "runtime task panicked"),
            Err(_) => {
                warn!(agent_id = %agent_id, "runtime did not drain in time, aborting");
                entry.handle.abort();
            }
        }

        self.broker.unregister_agent(&agent_id.to_string());
        self.scheduler.unregister_worker(agent_id).await;
        info!(agent_id = %agent_id, "stopped agent");
        Ok(())
    }

    pub async fn is_active(&self, agent_id: Uuid) -> bool {
        self.active.lock().await.contains_key(&agent_id)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    // ─────────────────────────────────────────
    // Interaction
    // ─────────────────────────────────────────

    /// Synchronous reason–act invocation. Uses the live runtime when the
    /// agent is started, otherwise a transient one.
    pub async fn think(
        &self,
        agent_id: Uuid,
        prompt: &str,
        max_iterations: Option<usize>,
    ) -> Result<String> {
        let iterations = max_iterations.unwrap_or(self.max_iterations);

        let runtime = {
            let active = self.active.lock().await;
            active.get(&agent_id).map(|a| a.runtime.clone())
        };
        if let Some(runtime) = runtime {
            return Ok(runtime.think(prompt, iterations, None).await);
        }

        let config = self.get(agent_id)?;
        let (_stop_tx, stop_rx) = watch::channel(false);
        let runtime = AgentRuntime::new(
            config,
            self.generator.clone(),
            self.tools.clone(),
            self.broker.clone(),
            self.scheduler.clone(),
            iterations,
            stop_rx,
        );
        Ok(runtime.think(prompt, iterations, None).await)
    }

    /// Post a broadcast to every active agent. Returns `true` iff at least
    /// one recipient was enqueued.
    pub fn broadcast(&self, sender: &str, content: &str, message_type: MessageType) -> bool {
        self.broker.send(Message::new(
            sender,
            BROADCAST_RECIPIENT,
            message_type,
            content,
        ))
    }

    // ─────────────────────────────────────────
    // Teams
    // ─────────────────────────────────────────

    /// Subscribe the given agents to the `team_<name>` broadcast channel.
    pub fn create_team(
        &self,
        name: &str,
        agent_ids: Vec<Uuid>,
        leader: Option<Uuid>,
    ) -> Result<Team> {
        if name.trim().is_empty() {
            return Err(Error::Validation("team name must not be empty".into()));
        }
        if agent_ids.is_empty() {
            return Err(Error::Validation("a team needs at least one agent".into()));
        }
        if let Some(leader_id) = leader {
            if !agent_ids.contains(&leader_id) {
                return Err(Error::Validation(
                    "the team leader must be one of its members".into(),
                ));
            }
        }
        for agent_id in &agent_ids {
            if self.store.get_agent(*agent_id)?.is_none() {
                return Err(Error::NotFound(format!("agent {agent_id}")));
            }
        }

        let team = Team {
            name: name.to_string(),
            members: agent_ids,
            leader,
        };
        for agent_id in &team.members {
            self.broker.join_channel(&agent_id.to_string(), &team.channel());
        }
        info!(team = %team.name, members = team.members.len(), "created team");
        self.teams
            .write()
            .unwrap()
            .insert(team.name.clone(), team.clone());
        Ok(team)
    }

    pub fn get_team(&self, name: &str) -> Option<Team> {
        self.teams.read().unwrap().get(name).cloned()
    }

    // ─────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────

    /// Runtime status for one agent.
    pub async fn status(&self, agent_id: Uuid) -> Result<AgentStatus> {
        let config = self.get(agent_id)?;
        Ok(AgentStatus {
            agent_id,
            name: config.name,
            model_id: config.model_id,
            autonomy_level: config.autonomy_level,
            active: self.is_active(agent_id).await,
            queue_size: self.broker.queue_size(&agent_id.to_string()),
            current_tasks: self.scheduler.agent_workload(agent_id).await.len(),
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conclave_core::config::SchedulerConfig;
    use conclave_models::ModelError;

    struct SilentGenerator;

    #[async_trait]
    impl Generator for SilentGenerator {
        async fn complete(&self, _model_id: &str, _prompt: &str) -> std::result::Result<String, ModelError> {
            Ok("silent answer".to_string())
        }
    }

    struct Fixture {
        store: Arc<Store>,
        broker: Arc<MessageBroker>,
        manager: AgentManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let broker = Arc::new(MessageBroker::with_store(store.clone()));
        let scheduler = Arc::new(
            TaskScheduler::new(store.clone(), broker.clone(), SchedulerConfig::default())
                .unwrap(),
        );
        let manager = AgentManager::new(
            store.clone(),
            broker.clone(),
            scheduler,
            Arc::new(SilentGenerator),
            Arc::new(ToolRegistry::new()),
            Duration::from_secs(2),
        );
        Fixture {
            store,
            broker,
            manager,
        }
    }

    fn agent() -> AgentConfig {
        AgentConfig::new("Worker", "Does work", "mock-model")
    }

    #[tokio::test]
    async fn test_create_get_delete_round_trip() {
        let fx = fixture();
        let created = fx.manager.create(agent()).unwrap();
        let fetched = fx.manager.get(created.agent_id).unwrap();
        assert_eq!(fetched.name, "Worker");

        fx.manager.delete(created.agent_id).await.unwrap();
        let err = fx.manager.get(created.agent_id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Deleting again is NotFound too.
        let err = fx.manager.delete(created.agent_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let fx = fixture();
        let mut config = agent();
        config.name = "  ".into();
        assert!(matches!(
            fx.manager.create(config).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let fx = fixture();
        let created = fx.manager.create(agent()).unwrap();
        let id = created.agent_id;

        fx.manager.start(id).await.unwrap();
        assert!(fx.manager.is_active(id).await);
        assert!(fx.broker.is_registered(&id.to_string()));
        assert_eq!(fx.manager.active_count().await, 1);

        // Idempotent start.
        fx.manager.start(id).await.unwrap();
        assert_eq!(fx.manager.active_count().await, 1);

        fx.manager.stop(id).await.unwrap();
        assert!(!fx.manager.is_active(id).await);
        assert!(!fx.broker.is_registered(&id.to_string()));

        // Idempotent stop.
        fx.manager.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_unknown_agent() {
        let fx = fixture();
        let err = fx.manager.start(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_active_agent_stops_it_first() {
        let fx = fixture();
        let created = fx.manager.create(agent()).unwrap();
        fx.manager.start(created.agent_id).await.unwrap();

        fx.manager.delete(created.agent_id).await.unwrap();
        assert!(!fx.manager.is_active(created.agent_id).await);
        assert!(fx.store.get_agent(created.agent_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_think_on_inactive_agent() {
        let fx = fixture();
        let created = fx.manager.create(agent()).unwrap();
        let answer = fx
            .manager
            .think(created.agent_id, "hello", Some(3))
            .await
            .unwrap();
        assert_eq!(answer, "silent answer");
    }

    #[tokio::test]
    async fn test_think_unknown_agent() {
        let fx = fixture();
        let err = fx
            .manager
            .think(Uuid::new_v4(), "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_broadcast_needs_a_recipient() {
        let fx = fixture();
        assert!(!fx.manager.broadcast("u", "anyone?", MessageType::Notification));

        let created = fx.manager.create(agent()).unwrap();
        fx.manager.start(created.agent_id).await.unwrap();
        assert!(fx.manager.broadcast("u", "hello fleet", MessageType::Notification));
        fx.manager.stop(created.agent_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_team_subscribes_channel() {
        let fx = fixture();
        let a1 = fx.manager.create(agent()).unwrap();
        let a2 = fx.manager.create(agent()).unwrap();

        let team = fx
            .manager
            .create_team("alpha", vec![a1.agent_id, a2.agent_id], Some(a1.agent_id))
            .unwrap();
        assert_eq!(team.channel(), "team_alpha");
        assert_eq!(team.leader, Some(a1.agent_id));

        let members = fx.broker.channel_members("team_alpha");
        assert_eq!(members.len(), 2);
        assert!(fx.manager.get_team("alpha").is_some());
    }

    #[tokio::test]
    async fn test_create_team_validation() {
        let fx = fixture();
        let a1 = fx.manager.create(agent()).unwrap();

        // Leader outside the member list.
        let err = fx
            .manager
            .create_team("beta", vec![a1.agent_id], Some(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Unknown member.
        let err = fx
            .manager
            .create_team("beta", vec![Uuid::new_v4()], None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Empty member list.
        let err = fx.manager.create_team("beta", vec![], None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_reports_runtime_state() {
        let fx = fixture();
        let created = fx.manager.create(agent()).unwrap();
        let id = created.agent_id;

        let status = fx.manager.status(id).await.unwrap();
        assert!(!status.active);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.current_tasks, 0);
        assert_eq!(status.name, "Worker");

        fx.manager.start(id).await.unwrap();
        let status = fx.manager.status(id).await.unwrap();
        assert!(status.active);
        fx.manager.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_unknown_agent() {
        let fx = fixture();
        assert!(matches!(
            fx.manager.status(Uuid::new_v4()).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
