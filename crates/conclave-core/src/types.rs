//! Domain types for Conclave — agent configuration, tasks, and broker
//! messages.
//!
//! Everything here is plain data: the services that give these types
//! behavior live in the broker, scheduler, and agent crates. Enums use
//! snake_case wire names so the serialized form matches the column values
//! in the store and the JSON bodies on the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The literal recipient that fans a message out to every registered agent.
pub const BROADCAST_RECIPIENT: &str = "ALL";

// ─────────────────────────────────────────────
// Agent configuration
// ─────────────────────────────────────────────

/// How aggressively the scheduler may auto-assign work to an agent.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Never auto-assigned; only explicit assignment.
    Low,
    /// Auto-assigned while under the concurrent-task cap.
    #[default]
    Medium,
    /// Auto-assigned regardless of the cap.
    High,
}

impl AutonomyLevel {
    /// Parse a wire string, rejecting unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(AutonomyLevel::Low),
            "medium" => Ok(AutonomyLevel::Medium),
            "high" => Ok(AutonomyLevel::High),
            other => Err(Error::Validation(format!("unknown autonomy level: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Low => "low",
            AutonomyLevel::Medium => "medium",
            AutonomyLevel::High => "high",
        }
    }
}

/// Who an agent is allowed to talk to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationRight {
    AgentToAgent,
    AgentToUser,
}

impl CommunicationRight {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "agent_to_agent" => Ok(CommunicationRight::AgentToAgent),
            "agent_to_user" => Ok(CommunicationRight::AgentToUser),
            other => Err(Error::Validation(format!(
                "unknown communication right: {other}"
            ))),
        }
    }
}

/// Whether an agent retains context across invocations.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Ephemeral,
    #[default]
    TaskLimited,
    Persistent,
}

impl MemoryScope {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ephemeral" => Ok(MemoryScope::Ephemeral),
            "task_limited" => Ok(MemoryScope::TaskLimited),
            "persistent" => Ok(MemoryScope::Persistent),
            other => Err(Error::Validation(format!("unknown memory scope: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Ephemeral => "ephemeral",
            MemoryScope::TaskLimited => "task_limited",
            MemoryScope::Persistent => "persistent",
        }
    }
}

/// Persistent configuration of an agent.
///
/// This is what the store holds; the transient runtime (inbox, worker task)
/// is spawned from it when the agent is started and discarded on stop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent_id: Uuid,
    pub name: String,
    /// Seed for the agent's system prompt.
    pub role: String,
    pub model_id: String,
    /// Tool names this agent may use. Empty means all registered tools.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub autonomy_level: AutonomyLevel,
    #[serde(default = "default_communication_rights")]
    pub communication_rights: Vec<CommunicationRight>,
    #[serde(default)]
    pub memory_scope: MemoryScope,
    pub created_at: DateTime<Utc>,
}

fn default_communication_rights() -> Vec<CommunicationRight> {
    vec![CommunicationRight::AgentToAgent]
}

impl AgentConfig {
    /// Create a new agent configuration with defaults for the policy fields.
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        AgentConfig {
            agent_id: Uuid::new_v4(),
            name: name.into(),
            role: role.into(),
            model_id: model_id.into(),
            allowed_tools: Vec::new(),
            autonomy_level: AutonomyLevel::default(),
            communication_rights: default_communication_rights(),
            memory_scope: MemoryScope::default(),
            created_at: Utc::now(),
        }
    }

    /// Whether the agent may call the named tool.
    pub fn may_use_tool(&self, name: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == name)
    }
}

// ─────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────

/// Task lifecycle states.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Blocked,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(Error::Validation(format!("unknown task status: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Blocked => "blocked",
        }
    }
}

/// Task priority. The numeric value is the persisted form and the sort key.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_i64(&self) -> i64 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
            TaskPriority::Critical => 4,
        }
    }

    pub fn from_i64(v: i64) -> Result<Self> {
        match v {
            1 => Ok(TaskPriority::Low),
            2 => Ok(TaskPriority::Medium),
            3 => Ok(TaskPriority::High),
            4 => Ok(TaskPriority::Critical),
            other => Err(Error::Validation(format!("unknown task priority: {other}"))),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(Error::Validation(format!("unknown task priority: {other}"))),
        }
    }
}

/// A unit of work with dependencies, priority, progress, and a result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: Uuid,
    pub title: String,
    pub description: String,
    pub assigned_agent: Option<Uuid>,
    pub created_by: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    /// Task IDs that must be completed before this task is eligible.
    pub dependencies: Vec<Uuid>,
    /// Task IDs whose `parent_task` is this task.
    pub subtasks: Vec<Uuid>,
    pub parent_task: Option<Uuid>,
    pub metadata: Map<String, Value>,
    /// Completion fraction in [0, 1]. Exactly 1.0 iff completed.
    pub progress: f64,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Task {
            task_id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            assigned_agent: None,
            created_by: created_by.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            created_at: now,
            updated_at: now,
            due_date: None,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            parent_task: None,
            metadata: Map::new(),
            progress: 0.0,
            result: None,
            error_message: None,
        }
    }

    /// Whether the task is past its due date and still open.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due < now && !self.status.is_terminal(),
            None => false,
        }
    }
}

// ─────────────────────────────────────────────
// Broker messages
// ─────────────────────────────────────────────

/// Kinds of messages routed by the broker.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    TaskAssignment,
    TaskCompletion,
    Broadcast,
    System,
}

impl MessageType {
    /// Parse a wire string. Unknown values are a validation error — they
    /// are never silently coerced to `request`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "request" => Ok(MessageType::Request),
            "response" => Ok(MessageType::Response),
            "notification" => Ok(MessageType::Notification),
            "task_assignment" => Ok(MessageType::TaskAssignment),
            "task_completion" => Ok(MessageType::TaskCompletion),
            "broadcast" => Ok(MessageType::Broadcast),
            "system" => Ok(MessageType::System),
            other => Err(Error::Validation(format!("unknown message type: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notification => "notification",
            MessageType::TaskAssignment => "task_assignment",
            MessageType::TaskCompletion => "task_completion",
            MessageType::Broadcast => "broadcast",
            MessageType::System => "system",
        }
    }
}

/// A message between agents (or between the system and an agent).
///
/// Immutable after send. Senders and recipients are free-form strings:
/// agent IDs, user handles, service names, or [`BROADCAST_RECIPIENT`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub recipient: String,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub requires_response: bool,
    /// 1 = low, 2 = medium, 3 = high.
    #[serde(default = "default_message_priority")]
    pub priority: u8,
}

fn default_message_priority() -> u8 {
    1
}

impl Message {
    /// Create a new message with default metadata and priority 1.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Message {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type,
            content: content.into(),
            metadata: Map::new(),
            timestamp: Utc::now(),
            conversation_id: None,
            requires_response: false,
            priority: default_message_priority(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 3);
        self
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_requires_response(mut self, requires_response: bool) -> Self {
        self.requires_response = requires_response;
        self
    }

    /// Whether this message fans out to all registered agents.
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST_RECIPIENT || self.message_type == MessageType::Broadcast
    }

    /// A per-recipient copy of a broadcast, with a freshly minted id.
    pub fn reminted_for(&self, recipient: &str) -> Self {
        Message {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            ..self.clone()
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_autonomy_level_round_trip() {
        for (s, level) in [
            ("low", AutonomyLevel::Low),
            ("medium", AutonomyLevel::Medium),
            ("high", AutonomyLevel::High),
        ] {
            assert_eq!(AutonomyLevel::parse(s).unwrap(), level);
            assert_eq!(level.as_str(), s);
        }
        assert!(AutonomyLevel::parse("maximum").is_err());
    }

    #[test]
    fn test_agent_config_defaults() {
        let agent = AgentConfig::new("Researcher", "Finds things out", "qwen-7b-chat-gguf");
        assert_eq!(agent.autonomy_level, AutonomyLevel::Medium);
        assert_eq!(agent.memory_scope, MemoryScope::TaskLimited);
        assert_eq!(
            agent.communication_rights,
            vec![CommunicationRight::AgentToAgent]
        );
        assert!(agent.allowed_tools.is_empty());
    }

    #[test]
    fn test_may_use_tool_empty_means_all() {
        let mut agent = AgentConfig::new("A", "role", "m");
        assert!(agent.may_use_tool("anything"));

        agent.allowed_tools = vec!["web_scraper".into()];
        assert!(agent.may_use_tool("web_scraper"));
        assert!(!agent.may_use_tool("code_executor"));
    }

    #[test]
    fn test_agent_config_serde_snake_case() {
        let agent = AgentConfig::new("A", "role", "m");
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["autonomy_level"], "medium");
        assert_eq!(json["memory_scope"], "task_limited");
        assert_eq!(json["communication_rights"][0], "agent_to_agent");
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_task_status_parse() {
        assert_eq!(TaskStatus::parse("in_progress").unwrap(), TaskStatus::InProgress);
        assert!(TaskStatus::parse("IN_PROGRESS").is_err());
        assert!(TaskStatus::parse("done").is_err());
    }

    #[test]
    fn test_priority_ordering_and_values() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
        assert_eq!(TaskPriority::Low.as_i64(), 1);
        assert_eq!(TaskPriority::Critical.as_i64(), 4);
        assert_eq!(TaskPriority::from_i64(3).unwrap(), TaskPriority::High);
        assert!(TaskPriority::from_i64(9).is_err());
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("Build", "Build the thing", "admin");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.progress, 0.0);
        assert!(task.assigned_agent.is_none());
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_task_overdue() {
        let mut task = Task::new("T", "d", "u");
        let now = Utc::now();
        assert!(!task.is_overdue(now));

        task.due_date = Some(now - chrono::Duration::hours(1));
        assert!(task.is_overdue(now));

        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn test_message_type_parse_rejects_unknown() {
        assert_eq!(MessageType::parse("request").unwrap(), MessageType::Request);
        assert_eq!(
            MessageType::parse("task_assignment").unwrap(),
            MessageType::TaskAssignment
        );
        let err = MessageType::parse("REQUEST").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(MessageType::parse("gossip").is_err());
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::new("scheduler", "agent-1", MessageType::Notification, "overdue")
            .with_priority(3)
            .with_requires_response(true);
        assert_eq!(msg.priority, 3);
        assert!(msg.requires_response);

        // Priority clamps to the 1–3 band.
        let msg = Message::new("a", "b", MessageType::Request, "x").with_priority(9);
        assert_eq!(msg.priority, 3);
    }

    #[test]
    fn test_broadcast_detection() {
        let direct = Message::new("a", "b", MessageType::Request, "hi");
        assert!(!direct.is_broadcast());

        let to_all = Message::new("a", BROADCAST_RECIPIENT, MessageType::Notification, "hi");
        assert!(to_all.is_broadcast());

        let typed = Message::new("a", "b", MessageType::Broadcast, "hi");
        assert!(typed.is_broadcast());
    }

    #[test]
    fn test_reminted_copy_gets_fresh_id() {
        let mut original = Message::new("a", BROADCAST_RECIPIENT, MessageType::Broadcast, "hi");
        original.metadata.insert("k".into(), json!("v"));

        let copy = original.reminted_for("agent-2");
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.recipient, "agent-2");
        assert_eq!(copy.content, original.content);
        assert_eq!(copy.metadata, original.metadata);
        assert_eq!(copy.timestamp, original.timestamp);
    }

    #[test]
    fn test_message_serde_round_trip() {
        let msg = Message::new("s", "r", MessageType::TaskCompletion, "done")
            .with_conversation(Uuid::new_v4());
        let json_str = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json_str).unwrap();
        assert_eq!(msg, back);
    }
}
