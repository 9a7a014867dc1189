//! The task scheduler — CRUD, dependency DAG, workload accounting, and the
//! per-cycle automation body.
//!
//! All mutations go through one async mutex over the task table, so no two
//! state transitions for the same task can interleave. Every transition is
//! written to the store before the in-memory table is touched; a failed
//! write leaves the table unchanged and surfaces as `Transient`.
//!
//! Messages (assignment, completion, overdue notifications) are posted
//! after a successful transition and are best-effort: a broker failure is
//! logged, never rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conclave_core::broker::MessageBroker;
use conclave_core::config::SchedulerConfig;
use conclave_core::store::Store;
use conclave_core::types::{
    AutonomyLevel, Message, MessageType, Task, TaskPriority, TaskStatus,
};
use conclave_core::{Error, Result};

/// Sender name used on every message the scheduler posts.
pub const SCHEDULER_SENDER: &str = "TaskScheduler";

// ─────────────────────────────────────────────
// TaskSpec
// ─────────────────────────────────────────────

/// Parameters for creating a task.
#[derive(Clone, Debug)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub assigned_agent: Option<Uuid>,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub dependencies: Vec<Uuid>,
    pub parent_task: Option<Uuid>,
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        TaskSpec {
            title: title.into(),
            description: description.into(),
            created_by: created_by.into(),
            assigned_agent: None,
            priority: TaskPriority::Medium,
            due_date: None,
            dependencies: Vec::new(),
            parent_task: None,
            metadata: Map::new(),
        }
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assigned_agent(mut self, agent_id: Uuid) -> Self {
        self.assigned_agent = Some(agent_id);
        self
    }

    pub fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn parent_task(mut self, parent: Uuid) -> Self {
        self.parent_task = Some(parent);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of an assignment attempt. `Blocked` means the dependencies were
/// not yet satisfied; the intended agent is recorded and the task will be
/// re-assigned by the unblock sweep.
#[derive(Clone, Debug)]
pub enum AssignOutcome {
    Assigned(Task),
    Blocked(Task),
}

impl AssignOutcome {
    pub fn task(&self) -> &Task {
        match self {
            AssignOutcome::Assigned(t) | AssignOutcome::Blocked(t) => t,
        }
    }
}

// ─────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────

struct SchedulerState {
    /// Open tasks plus any terminal tasks finished during this process
    /// lifetime. Terminal tasks not in memory are resolved via the store.
    tasks: HashMap<Uuid, Task>,
    /// agent id → task ids currently counted toward its workload
    /// (status assigned or in_progress only).
    workloads: HashMap<Uuid, Vec<Uuid>>,
    /// Agents eligible for auto-assignment, registered by the manager.
    workers: HashMap<Uuid, AutonomyLevel>,
}

impl SchedulerState {
    fn workload_len(&self, agent_id: Uuid) -> usize {
        self.workloads.get(&agent_id).map_or(0, |v| v.len())
    }

    fn add_to_workload(&mut self, agent_id: Uuid, task_id: Uuid) {
        let tasks = self.workloads.entry(agent_id).or_default();
        if !tasks.contains(&task_id) {
            tasks.push(task_id);
        }
    }

    fn remove_from_workload(&mut self, agent_id: Uuid, task_id: Uuid) {
        if let Some(tasks) = self.workloads.get_mut(&agent_id) {
            tasks.retain(|id| *id != task_id);
        }
    }
}

// ─────────────────────────────────────────────
// TaskScheduler
// ─────────────────────────────────────────────

/// The single authority over task state.
pub struct TaskScheduler {
    store: Arc<Store>,
    broker: Arc<MessageBroker>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl TaskScheduler {
    /// Build the scheduler, rebuilding in-memory state from the store's
    /// open tasks (workloads included).
    pub fn new(
        store: Arc<Store>,
        broker: Arc<MessageBroker>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let open = store.load_open_tasks()?;
        let mut tasks = HashMap::new();
        let mut workloads: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in open {
            if let Some(agent) = task.assigned_agent {
                if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                    workloads.entry(agent).or_default().push(task.task_id);
                }
            }
            tasks.insert(task.task_id, task);
        }
        info!(tasks = tasks.len(), "task scheduler initialized from store");

        Ok(TaskScheduler {
            store,
            broker,
            config,
            state: Mutex::new(SchedulerState {
                tasks,
                workloads,
                workers: HashMap::new(),
            }),
        })
    }

    // ─────────────────────────────────────────
    // Worker roster (maintained by the agent manager)
    // ─────────────────────────────────────────

    /// Make an agent eligible for auto-assignment.
    pub async fn register_worker(&self, agent_id: Uuid, autonomy: AutonomyLevel) {
        let mut state = self.state.lock().await;
        state.workers.insert(agent_id, autonomy);
        debug!(agent_id = %agent_id, autonomy = autonomy.as_str(), "worker registered");
    }

    pub async fn unregister_worker(&self, agent_id: Uuid) {
        let mut state = self.state.lock().await;
        if state.workers.remove(&agent_id).is_some() {
            debug!(agent_id = %agent_id, "worker unregistered");
        }
    }

    // ─────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────

    /// Create a new task in `pending`. Validates that dependencies exist
    /// and the resulting graph stays acyclic; appends to the parent's
    /// subtasks; eagerly assigns when an agent was named.
    pub async fn create(&self, spec: TaskSpec) -> Result<Task> {
        if spec.title.trim().is_empty() {
            return Err(Error::Validation("task title must not be empty".into()));
        }

        let mut state = self.state.lock().await;

        let mut deps: Vec<Uuid> = Vec::new();
        for dep in &spec.dependencies {
            if !deps.contains(dep) {
                deps.push(*dep);
            }
        }
        for dep in &deps {
            if self.resolve(&state, *dep)?.is_none() {
                return Err(Error::Validation(format!("unknown dependency: {dep}")));
            }
        }

        let mut task = Task::new(spec.title, spec.description, spec.created_by);
        task.priority = spec.priority;
        task.due_date = spec.due_date;
        task.dependencies = deps;
        task.metadata = spec.metadata;

        // A fresh UUID cannot be reachable from its own dependencies, but
        // the graph invariant is cheap to enforce uniformly.
        if self.would_cycle(&state, task.task_id, &task.dependencies)? {
            return Err(Error::Conflict(format!(
                "dependencies of task '{}' would form a cycle",
                task.title
            )));
        }

        let parent = match spec.parent_task {
            Some(parent_id) => {
                let parent = state.tasks.get(&parent_id).cloned().ok_or_else(|| {
                    Error::Validation(format!("unknown parent task: {parent_id}"))
                })?;
                task.parent_task = Some(parent_id);
                Some(parent)
            }
            None => None,
        };

        // Persist child first, then the parent's updated subtask list.
        self.store.save_task(&task)?;
        if let Some(mut parent) = parent {
            parent.subtasks.push(task.task_id);
            parent.updated_at = Utc::now();
            self.store.save_task(&parent)?;
            state.tasks.insert(parent.task_id, parent);
        }
        state.tasks.insert(task.task_id, task.clone());
        info!(task_id = %task.task_id, title = %task.title, "created task");

        if let Some(agent_id) = spec.assigned_agent {
            match self.do_assign(&mut state, task.task_id, agent_id) {
                Ok(outcome) => return Ok(outcome.task().clone()),
                Err(e) => {
                    // The task exists either way; the eager assignment is
                    // an attempt, not a precondition.
                    warn!(task_id = %task.task_id, agent_id = %agent_id, error = %e, "eager assignment failed");
                }
            }
        }
        Ok(task)
    }

    /// Break a task down into subtasks inheriting its priority.
    pub async fn break_down(
        &self,
        task_id: Uuid,
        subtask_descriptions: &[String],
        created_by: &str,
    ) -> Result<Vec<Task>> {
        let (title, priority) = {
            let state = self.state.lock().await;
            let parent = state
                .tasks
                .get(&task_id)
                .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
            (parent.title.clone(), parent.priority)
        };

        let mut subtasks = Vec::with_capacity(subtask_descriptions.len());
        for (i, description) in subtask_descriptions.iter().enumerate() {
            let mut metadata = Map::new();
            metadata.insert("subtask_index".into(), json!(i));
            let spec = TaskSpec::new(
                format!("{} - Subtask {}", title, i + 1),
                description.clone(),
                created_by,
            )
            .priority(priority)
            .parent_task(task_id)
            .metadata(metadata);
            subtasks.push(self.create(spec).await?);
        }
        info!(task_id = %task_id, count = subtasks.len(), "broke task into subtasks");
        Ok(subtasks)
    }

    // ─────────────────────────────────────────
    // Assignment
    // ─────────────────────────────────────────

    /// Assign a task to an agent. With unsatisfied dependencies the task
    /// transitions to `blocked` instead and the outcome says so.
    pub async fn assign(&self, task_id: Uuid, agent_id: Uuid) -> Result<AssignOutcome> {
        let mut state = self.state.lock().await;
        self.do_assign(&mut state, task_id, agent_id)
    }

    fn do_assign(
        &self,
        state: &mut SchedulerState,
        task_id: Uuid,
        agent_id: Uuid,
    ) -> Result<AssignOutcome> {
        let current = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?
            .clone();
        if current.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "task {task_id} is {} and cannot be assigned",
                current.status.as_str()
            )));
        }
        if self.store.get_agent(agent_id)?.is_none() {
            return Err(Error::NotFound(format!("agent {agent_id}")));
        }

        let mut task = current;
        task.updated_at = Utc::now();

        if !self.deps_satisfied(state, &task)? {
            // Record the intended assignee so the unblock sweep can hand
            // the task over the moment its dependencies complete.
            task.assigned_agent = Some(agent_id);
            task.status = TaskStatus::Blocked;
            self.store.save_task(&task)?;
            state.tasks.insert(task_id, task.clone());
            warn!(task_id = %task_id, agent_id = %agent_id, "dependencies unsatisfied, task blocked");
            return Ok(AssignOutcome::Blocked(task));
        }

        // Re-assignment hands the task over cleanly.
        if let Some(previous) = task.assigned_agent {
            if previous != agent_id {
                state.remove_from_workload(previous, task_id);
            }
        }

        task.assigned_agent = Some(agent_id);
        task.status = TaskStatus::Assigned;
        // A new assignment starts a fresh progress session.
        task.progress = 0.0;
        self.store.save_task(&task)?;
        state.tasks.insert(task_id, task.clone());
        state.add_to_workload(agent_id, task_id);
        info!(task_id = %task_id, agent_id = %agent_id, "assigned task");

        let mut metadata = Map::new();
        metadata.insert("task_id".into(), json!(task_id.to_string()));
        metadata.insert("priority".into(), json!(task.priority.as_i64()));
        metadata.insert(
            "due_date".into(),
            task.due_date.map_or(Value::Null, |d| json!(d.to_rfc3339())),
        );
        self.post(
            Message::new(
                SCHEDULER_SENDER,
                agent_id.to_string(),
                MessageType::TaskAssignment,
                format!(
                    "New task assigned: {}\n\nDescription: {}",
                    task.title, task.description
                ),
            )
            .with_metadata(metadata),
        );

        Ok(AssignOutcome::Assigned(task))
    }

    // ─────────────────────────────────────────
    // Progress & completion
    // ─────────────────────────────────────────

    /// Update a task's progress (clamped to [0, 1], never decreasing within
    /// an assignment). Without an explicit status, `>= 1.0` completes the
    /// task and `> 0` moves it to `in_progress`.
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        progress: f64,
        status: Option<TaskStatus>,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        let current = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?
            .clone();
        if current.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "task {task_id} is {} and cannot be updated",
                current.status.as_str()
            )));
        }

        let progress = progress.clamp(0.0, 1.0).max(current.progress);
        let status = match status {
            Some(s) => s,
            None if progress >= 1.0 => TaskStatus::Completed,
            // Only an assigned task can move to in_progress on its own.
            None if progress > 0.0 && current.assigned_agent.is_some() => TaskStatus::InProgress,
            None => current.status,
        };
        if matches!(status, TaskStatus::Assigned | TaskStatus::InProgress)
            && current.assigned_agent.is_none()
        {
            return Err(Error::Conflict(format!(
                "task {task_id} has no assigned agent and cannot be {}",
                status.as_str()
            )));
        }

        if status == TaskStatus::Completed {
            return self.finish(&mut state, task_id, None);
        }
        if status == TaskStatus::Failed {
            return self.do_fail(&mut state, task_id, "reported failed via progress update");
        }
        if status == TaskStatus::Cancelled {
            return self.do_cancel(&mut state, task_id);
        }

        let mut task = current;
        task.progress = progress;
        task.status = status;
        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        // Workload membership tracks the assigned/in_progress window.
        if let Some(agent) = task.assigned_agent {
            match task.status {
                TaskStatus::Assigned | TaskStatus::InProgress => {
                    state.add_to_workload(agent, task_id)
                }
                _ => state.remove_from_workload(agent, task_id),
            }
        }
        state.tasks.insert(task_id, task.clone());
        debug!(task_id = %task_id, progress = progress, status = status.as_str(), "updated progress");
        Ok(task)
    }

    /// Complete a task, fan the completion out to its creator, and run the
    /// unblock sweep over its dependents.
    pub async fn complete(&self, task_id: Uuid, result: Option<String>) -> Result<Task> {
        let mut state = self.state.lock().await;
        {
            let current = state
                .tasks
                .get(&task_id)
                .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
            if current.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "task {task_id} is already {}",
                    current.status.as_str()
                )));
            }
        }
        self.finish(&mut state, task_id, result)
    }

    /// Shared completion routine. Caller has verified the task exists and
    /// is not terminal.
    fn finish(
        &self,
        state: &mut SchedulerState,
        task_id: Uuid,
        result: Option<String>,
    ) -> Result<Task> {
        let mut task = state.tasks.get(&task_id).expect("checked by caller").clone();
        task.status = TaskStatus::Completed;
        task.progress = 1.0;
        if result.is_some() {
            task.result = result.clone();
        }
        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        if let Some(agent) = task.assigned_agent {
            state.remove_from_workload(agent, task_id);
        }
        state.tasks.insert(task_id, task.clone());
        info!(task_id = %task_id, "completed task");

        // Notify the creator unless they are also the assignee.
        let assignee = task.assigned_agent.map(|id| id.to_string());
        if assignee.as_deref() != Some(task.created_by.as_str()) {
            let mut metadata = Map::new();
            metadata.insert("task_id".into(), json!(task_id.to_string()));
            metadata.insert(
                "result".into(),
                task.result.clone().map_or(Value::Null, Value::String),
            );
            self.post(
                Message::new(
                    SCHEDULER_SENDER,
                    task.created_by.clone(),
                    MessageType::TaskCompletion,
                    format!("Task completed: {}", task.title),
                )
                .with_metadata(metadata),
            );
        }

        self.unblock_sweep(state, task_id)?;
        Ok(task)
    }

    /// Unblock tasks whose dependency set became fully completed, and
    /// immediately re-assign those with a recorded assignee.
    fn unblock_sweep(&self, state: &mut SchedulerState, completed_id: Uuid) -> Result<()> {
        let candidates: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked && t.dependencies.contains(&completed_id))
            .map(|t| t.task_id)
            .collect();

        for id in candidates {
            let task = state.tasks.get(&id).expect("candidate exists").clone();
            if !self.deps_satisfied(state, &task)? {
                continue;
            }
            let mut unblocked = task;
            unblocked.status = TaskStatus::Pending;
            unblocked.updated_at = Utc::now();
            self.store.save_task(&unblocked)?;
            let assignee = unblocked.assigned_agent;
            state.tasks.insert(id, unblocked);
            info!(task_id = %id, "unblocked task");

            if let Some(agent_id) = assignee {
                if let Err(e) = self.do_assign(state, id, agent_id) {
                    warn!(task_id = %id, agent_id = %agent_id, error = %e, "re-assign after unblock failed");
                }
            }
        }
        Ok(())
    }

    /// Mark a task failed and notify its creator.
    pub async fn fail(&self, task_id: Uuid, error_message: &str) -> Result<Task> {
        let mut state = self.state.lock().await;
        self.do_fail(&mut state, task_id, error_message)
    }

    fn do_fail(
        &self,
        state: &mut SchedulerState,
        task_id: Uuid,
        error_message: &str,
    ) -> Result<Task> {
        let current = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?
            .clone();
        if current.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "task {task_id} is already {}",
                current.status.as_str()
            )));
        }

        let mut task = current;
        task.status = TaskStatus::Failed;
        task.error_message = Some(error_message.to_string());
        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        if let Some(agent) = task.assigned_agent {
            state.remove_from_workload(agent, task_id);
        }
        state.tasks.insert(task_id, task.clone());
        warn!(task_id = %task_id, error = %error_message, "task failed");

        let mut metadata = Map::new();
        metadata.insert("task_id".into(), json!(task_id.to_string()));
        metadata.insert("error".into(), json!(error_message));
        self.post(
            Message::new(
                SCHEDULER_SENDER,
                task.created_by.clone(),
                MessageType::Notification,
                format!("Task failed: {}\nError: {}", task.title, error_message),
            )
            .with_metadata(metadata),
        );
        Ok(task)
    }

    /// Cancel a task. Terminal, no fan-out.
    pub async fn cancel(&self, task_id: Uuid) -> Result<Task> {
        let mut state = self.state.lock().await;
        self.do_cancel(&mut state, task_id)
    }

    fn do_cancel(&self, state: &mut SchedulerState, task_id: Uuid) -> Result<Task> {
        let current = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?
            .clone();
        if current.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "task {task_id} is already {}",
                current.status.as_str()
            )));
        }

        let mut task = current;
        task.status = TaskStatus::Cancelled;
        task.updated_at = Utc::now();
        self.store.save_task(&task)?;
        if let Some(agent) = task.assigned_agent {
            state.remove_from_workload(agent, task_id);
        }
        state.tasks.insert(task_id, task.clone());
        info!(task_id = %task_id, "cancelled task");
        Ok(task)
    }

    // ─────────────────────────────────────────
    // Dependencies
    // ─────────────────────────────────────────

    /// Re-point a task's dependency set. Only pending or blocked tasks can
    /// be re-pointed; closing a cycle is a conflict and leaves the task
    /// untouched.
    pub async fn update_dependencies(&self, task_id: Uuid, deps: Vec<Uuid>) -> Result<Task> {
        let mut state = self.state.lock().await;
        let current = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?
            .clone();
        if !matches!(current.status, TaskStatus::Pending | TaskStatus::Blocked) {
            return Err(Error::Conflict(format!(
                "task {task_id} is {}; dependencies can only change while pending or blocked",
                current.status.as_str()
            )));
        }

        let mut unique: Vec<Uuid> = Vec::new();
        for dep in deps {
            if dep == task_id {
                return Err(Error::Conflict(format!(
                    "task {task_id} cannot depend on itself"
                )));
            }
            if !unique.contains(&dep) {
                unique.push(dep);
            }
        }
        for dep in &unique {
            if self.resolve(&state, *dep)?.is_none() {
                return Err(Error::Validation(format!("unknown dependency: {dep}")));
            }
        }
        if self.would_cycle(&state, task_id, &unique)? {
            return Err(Error::Conflict(format!(
                "updating dependencies of task {task_id} would form a cycle"
            )));
        }

        let mut task = current;
        task.dependencies = unique;
        task.updated_at = Utc::now();
        // Re-evaluate blocking against the new dependency set.
        let satisfied = self.deps_satisfied(&state, &task)?;
        task.status = if satisfied {
            TaskStatus::Pending
        } else {
            TaskStatus::Blocked
        };
        self.store.save_task(&task)?;
        let assignee = task.assigned_agent;
        state.tasks.insert(task_id, task.clone());
        debug!(task_id = %task_id, deps = task.dependencies.len(), "updated dependencies");

        if satisfied {
            if let Some(agent_id) = assignee {
                match self.do_assign(&mut state, task_id, agent_id) {
                    Ok(outcome) => return Ok(outcome.task().clone()),
                    Err(e) => {
                        warn!(task_id = %task_id, agent_id = %agent_id, error = %e, "re-assign after dependency update failed");
                    }
                }
            }
        }
        Ok(task)
    }

    /// Whether pointing `task_id` at `deps` would close a cycle: true iff
    /// `task_id` is reachable from any of `deps` along dependency edges.
    fn would_cycle(&self, state: &SchedulerState, task_id: Uuid, deps: &[Uuid]) -> Result<bool> {
        let mut stack: Vec<Uuid> = deps.to_vec();
        let mut seen: HashSet<Uuid> = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == task_id {
                return Ok(true);
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(task) = self.resolve(state, current)? {
                stack.extend(task.dependencies.iter().copied());
            }
        }
        Ok(false)
    }

    /// All dependencies completed? Unknown dependency ids count as
    /// unsatisfied (and are logged), never as satisfied.
    fn deps_satisfied(&self, state: &SchedulerState, task: &Task) -> Result<bool> {
        for dep in &task.dependencies {
            match self.resolve(state, *dep)? {
                Some(dep_task) if dep_task.status == TaskStatus::Completed => {}
                Some(_) => return Ok(false),
                None => {
                    warn!(task_id = %task.task_id, dependency = %dep, "dependency not found");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Resolve a task by id: the in-memory table first, then the store
    /// (tasks that reached a terminal state before this process started).
    fn resolve(&self, state: &SchedulerState, task_id: Uuid) -> Result<Option<Task>> {
        if let Some(task) = state.tasks.get(&task_id) {
            return Ok(Some(task.clone()));
        }
        self.store.get_task(task_id)
    }

    // ─────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────

    pub async fn get(&self, task_id: Uuid) -> Result<Task> {
        let state = self.state.lock().await;
        match self.resolve(&state, task_id)? {
            Some(task) => Ok(task),
            None => Err(Error::NotFound(format!("task {task_id}"))),
        }
    }

    /// Tasks filtered by status and/or assignee, newest first.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        assigned_agent: Option<Uuid>,
    ) -> Vec<Task> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .filter(|t| assigned_agent.is_none_or(|a| t.assigned_agent == Some(a)))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Pending tasks whose dependencies are satisfied, ordered by
    /// (priority desc, created_at asc, task id asc). With an agent filter,
    /// restricted to unassigned tasks or tasks recorded for that agent.
    pub async fn available(&self, agent_id: Option<Uuid>) -> Result<Vec<Task>> {
        let state = self.state.lock().await;
        self.available_locked(&state, agent_id)
    }

    fn available_locked(
        &self,
        state: &SchedulerState,
        agent_id: Option<Uuid>,
    ) -> Result<Vec<Task>> {
        let mut available = Vec::new();
        for task in state.tasks.values() {
            if task.status != TaskStatus::Pending {
                continue;
            }
            if let Some(agent) = agent_id {
                if !(task.assigned_agent.is_none() || task.assigned_agent == Some(agent)) {
                    continue;
                }
            }
            if self.deps_satisfied(state, task)? {
                available.push(task.clone());
            }
        }
        available.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.task_id.cmp(&b.task_id))
        });
        Ok(available)
    }

    /// Non-terminal tasks currently counted toward an agent's workload.
    pub async fn agent_workload(&self, agent_id: Uuid) -> Vec<Task> {
        let state = self.state.lock().await;
        state
            .workloads
            .get(&agent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tasks.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    // ─────────────────────────────────────────
    // Periodic cycle body
    // ─────────────────────────────────────────

    /// One scheduler cycle: notify about overdue tasks, then auto-assign
    /// up to the configured batch of available tasks to the least-loaded
    /// eligible worker. Historical rows are never cleaned up.
    pub async fn run_cycle(&self) {
        let mut state = self.state.lock().await;
        self.notify_overdue(&state, Utc::now());
        if let Err(e) = self.auto_assign(&mut state) {
            warn!(error = %e, "auto-assignment pass failed");
        }
    }

    fn notify_overdue(&self, state: &SchedulerState, now: DateTime<Utc>) {
        for task in state.tasks.values() {
            if !task.is_overdue(now) {
                continue;
            }
            let Some(agent_id) = task.assigned_agent else {
                continue;
            };
            let due = task.due_date.expect("overdue implies a due date");
            let mut metadata = Map::new();
            metadata.insert("task_id".into(), json!(task.task_id.to_string()));
            metadata.insert("due_date".into(), json!(due.to_rfc3339()));
            self.post(
                Message::new(
                    SCHEDULER_SENDER,
                    agent_id.to_string(),
                    MessageType::Notification,
                    format!("Task overdue: {} (due: {})", task.title, due.to_rfc3339()),
                )
                .with_metadata(metadata)
                .with_priority(3),
            );
        }
    }

    fn auto_assign(&self, state: &mut SchedulerState) -> Result<()> {
        let batch: Vec<Uuid> = self
            .available_locked(state, None)?
            .into_iter()
            .take(self.config.auto_assign_batch)
            .map(|t| t.task_id)
            .collect();

        for task_id in batch {
            let Some(agent_id) = self.pick_worker(state) else {
                debug!("no eligible worker for auto-assignment");
                break;
            };
            if let Err(e) = self.do_assign(state, task_id, agent_id) {
                warn!(task_id = %task_id, agent_id = %agent_id, error = %e, "auto-assign failed");
            }
        }
        Ok(())
    }

    /// The least-loaded worker eligible under its autonomy policy: `low`
    /// is never auto-assigned, `medium` only under the workload cap,
    /// `high` ignores the cap. Ties break on agent id for determinism.
    fn pick_worker(&self, state: &SchedulerState) -> Option<Uuid> {
        state
            .workers
            .iter()
            .filter(|(_, autonomy)| **autonomy != AutonomyLevel::Low)
            .map(|(id, autonomy)| (*id, *autonomy, state.workload_len(*id)))
            .filter(|(_, autonomy, load)| {
                *autonomy == AutonomyLevel::High || *load < self.config.workload_cap
            })
            .min_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)))
            .map(|(id, _, _)| id)
    }

    /// Post a message via the broker. Best-effort: the state transition
    /// that produced it is already durable.
    fn post(&self, msg: Message) {
        if !self.broker.send(msg) {
            debug!("scheduler message had no live recipient");
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
