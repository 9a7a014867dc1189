//! SQLite-backed store — typed persistence for agents, tasks, message
//! audit rows, and the forward-declared memory/knowledge tables.
//!
//! A [`rusqlite::Connection`] wrapped in an `Arc<Mutex<…>>` is held
//! internally, making the store `Send + Sync` while keeping SQLite's
//! single-writer requirement. Calls are short and synchronous; WAL mode
//! keeps concurrent readers cheap.
//!
//! Column conventions: IDs and timestamps are TEXT (UUID strings, RFC 3339),
//! JSON collections are TEXT, embeddings are BLOB.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    AgentConfig, AutonomyLevel, MemoryScope, Message, MessageType, Task, TaskPriority, TaskStatus,
};

// ─────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────

/// DDL executed when the store is opened. Table and column names are part
/// of the persistence contract.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    model_id TEXT NOT NULL,
    allowed_tools TEXT NOT NULL DEFAULT '[]',
    autonomy_level TEXT NOT NULL DEFAULT 'medium',
    communication_rights TEXT NOT NULL DEFAULT '[]',
    memory_scope TEXT NOT NULL DEFAULT 'task_limited',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    assigned_agent TEXT REFERENCES agents(agent_id) ON DELETE SET NULL,
    created_by TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 2,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    due_date TEXT,
    dependencies TEXT NOT NULL DEFAULT '[]',
    subtasks TEXT NOT NULL DEFAULT '[]',
    parent_task TEXT REFERENCES tasks(task_id),
    metadata TEXT NOT NULL DEFAULT '{}',
    progress REAL NOT NULL DEFAULT 0.0,
    result TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
CREATE INDEX IF NOT EXISTS idx_tasks_assigned_agent ON tasks (assigned_agent);
CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks (created_at);

CREATE TABLE IF NOT EXISTS agent_communications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    timestamp TEXT NOT NULL,
    conversation_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_communications_timestamp ON agent_communications (timestamp);
CREATE INDEX IF NOT EXISTS idx_communications_conversation ON agent_communications (conversation_id);
CREATE INDEX IF NOT EXISTS idx_communications_recipient ON agent_communications (recipient_id);

CREATE TABLE IF NOT EXISTS knowledge_base (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    content TEXT NOT NULL,
    source_url TEXT,
    source_type TEXT,
    scraped_at TEXT,
    embedding BLOB,
    metadata TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',
    created_by TEXT
);

CREATE TABLE IF NOT EXISTS agent_memory (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL REFERENCES agents(agent_id) ON DELETE CASCADE,
    memory_type TEXT NOT NULL,
    content TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_memory_agent_id ON agent_memory (agent_id);

CREATE TABLE IF NOT EXISTS system_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    module TEXT,
    agent_id TEXT,
    timestamp TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON system_logs (timestamp);
"#;

// ─────────────────────────────────────────────
// Row conversion helpers
// ─────────────────────────────────────────────

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_err(idx, e))
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conversion_err(idx, e))
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentConfig> {
    let agent_id: String = row.get(0)?;
    let allowed_tools: String = row.get(4)?;
    let autonomy: String = row.get(5)?;
    let rights: String = row.get(6)?;
    let scope: String = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok(AgentConfig {
        agent_id: parse_uuid(0, &agent_id)?,
        name: row.get(1)?,
        role: row.get(2)?,
        model_id: row.get(3)?,
        allowed_tools: parse_json(4, &allowed_tools)?,
        autonomy_level: AutonomyLevel::parse(&autonomy)
            .map_err(|e| conversion_err(5, std::io::Error::other(e.to_string())))?,
        communication_rights: parse_json(6, &rights)?,
        memory_scope: MemoryScope::parse(&scope)
            .map_err(|e| conversion_err(7, std::io::Error::other(e.to_string())))?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let task_id: String = row.get(0)?;
    let assigned: Option<String> = row.get(3)?;
    let status: String = row.get(5)?;
    let priority: i64 = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let due_date: Option<String> = row.get(9)?;
    let dependencies: String = row.get(10)?;
    let subtasks: String = row.get(11)?;
    let parent: Option<String> = row.get(12)?;
    let metadata: String = row.get(13)?;

    Ok(Task {
        task_id: parse_uuid(0, &task_id)?,
        title: row.get(1)?,
        description: row.get(2)?,
        assigned_agent: assigned.as_deref().map(|s| parse_uuid(3, s)).transpose()?,
        created_by: row.get(4)?,
        status: TaskStatus::parse(&status)
            .map_err(|e| conversion_err(5, std::io::Error::other(e.to_string())))?,
        priority: TaskPriority::from_i64(priority)
            .map_err(|e| conversion_err(6, std::io::Error::other(e.to_string())))?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
        due_date: due_date
            .as_deref()
            .map(|s| parse_timestamp(9, s))
            .transpose()?,
        dependencies: parse_json(10, &dependencies)?,
        subtasks: parse_json(11, &subtasks)?,
        parent_task: parent.as_deref().map(|s| parse_uuid(12, s)).transpose()?,
        metadata: parse_json(13, &metadata)?,
        progress: row.get(14)?,
        result: row.get(15)?,
        error_message: row.get(16)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let message_id: String = row.get(0)?;
    let message_type: String = row.get(3)?;
    let metadata: String = row.get(5)?;
    let timestamp: String = row.get(6)?;
    let conversation: Option<String> = row.get(7)?;

    Ok(Message {
        id: parse_uuid(0, &message_id)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        message_type: MessageType::parse(&message_type)
            .map_err(|e| conversion_err(3, std::io::Error::other(e.to_string())))?,
        content: row.get(4)?,
        metadata: parse_json(5, &metadata)?,
        timestamp: parse_timestamp(6, &timestamp)?,
        conversation_id: conversation
            .as_deref()
            .map(|s| parse_uuid(7, s))
            .transpose()?,
        requires_response: false,
        priority: 1,
    })
}

const TASK_COLUMNS: &str = "task_id, title, description, assigned_agent, created_by, status, \
     priority, created_at, updated_at, due_date, dependencies, subtasks, parent_task, \
     metadata, progress, result, error_message";

const MESSAGE_COLUMNS: &str =
    "message_id, sender_id, recipient_id, message_type, content, metadata, timestamp, \
     conversation_id";

// ─────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────

/// Transactional persistent store for the Conclave services.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // journal_mode returns a result row, so query_row rather than execute.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Internal(format!("store lock poisoned: {e}")))
    }

    /// Cheap connectivity probe for the health endpoint.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ─────────────────────────────────────────
    // Agents
    // ─────────────────────────────────────────

    pub fn insert_agent(&self, agent: &AgentConfig) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO agents (agent_id, name, role, model_id, allowed_tools, \
             autonomy_level, communication_rights, memory_scope, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                agent.agent_id.to_string(),
                agent.name,
                agent.role,
                agent.model_id,
                serde_json::to_string(&agent.allowed_tools)?,
                agent.autonomy_level.as_str(),
                serde_json::to_string(&agent.communication_rights)?,
                agent.memory_scope.as_str(),
                agent.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: Uuid) -> Result<Option<AgentConfig>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT agent_id, name, role, model_id, allowed_tools, autonomy_level, \
             communication_rights, memory_scope, created_at \
             FROM agents WHERE agent_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![agent_id.to_string()], agent_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_agents(&self) -> Result<Vec<AgentConfig>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT agent_id, name, role, model_id, allowed_tools, autonomy_level, \
             communication_rights, memory_scope, created_at \
             FROM agents ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], agent_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Delete an agent row. Returns `false` when no row existed.
    pub fn delete_agent(&self, agent_id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM agents WHERE agent_id = ?1",
            params![agent_id.to_string()],
        )?;
        Ok(n > 0)
    }

    // ─────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────

    /// Insert or overwrite a task row.
    pub fn save_task(&self, task: &Task) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO tasks ({TASK_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                task.task_id.to_string(),
                task.title,
                task.description,
                task.assigned_agent.map(|id| id.to_string()),
                task.created_by,
                task.status.as_str(),
                task.priority.as_i64(),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.due_date.map(|d| d.to_rfc3339()),
                serde_json::to_string(&task.dependencies)?,
                serde_json::to_string(&task.subtasks)?,
                task.parent_task.map(|id| id.to_string()),
                serde_json::to_string(&Value::Object(task.metadata.clone()))?,
                task.progress,
                task.result,
                task.error_message,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![task_id.to_string()], task_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Load every non-terminal task — used to rebuild scheduler state after
    /// a restart.
    pub fn load_open_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status NOT IN ('completed', 'failed', 'cancelled') \
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], task_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    // ─────────────────────────────────────────
    // Message audit
    // ─────────────────────────────────────────

    /// Append a message to the audit trail.
    pub fn record_message(&self, msg: &Message) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO agent_communications ({MESSAGE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                msg.id.to_string(),
                msg.sender,
                msg.recipient,
                msg.message_type.as_str(),
                msg.content,
                serde_json::to_string(&Value::Object(msg.metadata.clone()))?,
                msg.timestamp.to_rfc3339(),
                msg.conversation_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// The last `limit` audit rows of a conversation, chronological order.
    pub fn conversation_history(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM agent_communications \
             WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            params![conversation_id.to_string(), limit as i64],
            message_from_row,
        )?;
        let mut messages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)?;
        messages.reverse();
        Ok(messages)
    }

    /// The last `limit` audit rows addressed to a recipient, chronological
    /// order.
    pub fn recipient_history(&self, recipient: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM agent_communications \
             WHERE recipient_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![recipient, limit as i64], message_from_row)?;
        let mut messages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)?;
        messages.reverse();
        Ok(messages)
    }

    // ─────────────────────────────────────────
    // Agent memory (forward-declared persistence)
    // ─────────────────────────────────────────

    /// Remove all persistent memory rows for an agent. Returns the number
    /// of rows removed.
    pub fn clear_agent_memory(&self, agent_id: Uuid) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM agent_memory WHERE agent_id = ?1",
            params![agent_id.to_string()],
        )?;
        Ok(n)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BROADCAST_RECIPIENT;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    #[test]
    fn test_agent_round_trip() {
        let store = store();
        let mut agent = AgentConfig::new("Researcher", "Finds things out", "qwen-7b-chat-gguf");
        agent.allowed_tools = vec!["web_scraper".into(), "file_manager".into()];
        agent.autonomy_level = AutonomyLevel::High;
        agent.memory_scope = MemoryScope::Persistent;

        store.insert_agent(&agent).unwrap();
        let loaded = store.get_agent(agent.agent_id).unwrap().unwrap();
        assert_eq!(loaded.name, "Researcher");
        assert_eq!(loaded.allowed_tools, agent.allowed_tools);
        assert_eq!(loaded.autonomy_level, AutonomyLevel::High);
        assert_eq!(loaded.memory_scope, MemoryScope::Persistent);
    }

    #[test]
    fn test_get_agent_missing() {
        let store = store();
        assert!(store.get_agent(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_delete_agent() {
        let store = store();
        let agent = AgentConfig::new("A", "r", "m");
        store.insert_agent(&agent).unwrap();

        assert!(store.delete_agent(agent.agent_id).unwrap());
        assert!(store.get_agent(agent.agent_id).unwrap().is_none());
        // Create → fetch → delete → fetch yields nothing the second time.
        assert!(!store.delete_agent(agent.agent_id).unwrap());
    }

    #[test]
    fn test_list_agents() {
        let store = store();
        store.insert_agent(&AgentConfig::new("A", "r", "m")).unwrap();
        store.insert_agent(&AgentConfig::new("B", "r", "m")).unwrap();
        assert_eq!(store.list_agents().unwrap().len(), 2);
    }

    #[test]
    fn test_task_round_trip_preserves_fields() {
        let store = store();
        let dep = Uuid::new_v4();
        let mut task = Task::new("Build", "Build the thing", "admin");
        task.priority = TaskPriority::Critical;
        task.dependencies = vec![dep];
        task.due_date = Some(Utc::now());
        task.metadata
            .insert("phase".into(), serde_json::json!("one"));
        task.progress = 0.25;
        task.status = TaskStatus::InProgress;

        store.save_task(&task).unwrap();
        let loaded = store.get_task(task.task_id).unwrap().unwrap();
        assert_eq!(loaded.title, "Build");
        assert_eq!(loaded.priority, TaskPriority::Critical);
        assert_eq!(loaded.dependencies, vec![dep]);
        assert_eq!(loaded.status, TaskStatus::InProgress);
        assert_eq!(loaded.progress, 0.25);
        assert_eq!(loaded.metadata["phase"], "one");
        assert!(loaded.due_date.is_some());
    }

    #[test]
    fn test_save_task_overwrites() {
        let store = store();
        let mut task = Task::new("T", "d", "u");
        store.save_task(&task).unwrap();

        task.status = TaskStatus::Completed;
        task.progress = 1.0;
        task.result = Some("done".into());
        store.save_task(&task).unwrap();

        let loaded = store.get_task(task.task_id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("done"));
    }

    #[test]
    fn test_load_open_tasks_skips_terminal() {
        let store = store();
        let open = Task::new("open", "d", "u");
        let mut done = Task::new("done", "d", "u");
        done.status = TaskStatus::Completed;
        done.progress = 1.0;
        let mut dead = Task::new("dead", "d", "u");
        dead.status = TaskStatus::Cancelled;

        store.save_task(&open).unwrap();
        store.save_task(&done).unwrap();
        store.save_task(&dead).unwrap();

        let loaded = store.load_open_tasks().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].task_id, open.task_id);
        // Terminal rows persist for audit even though they aren't reloaded.
        assert!(store.get_task(done.task_id).unwrap().is_some());
    }

    #[test]
    fn test_conversation_history_chronological() {
        let store = store();
        let conv = Uuid::new_v4();
        for i in 0..5 {
            let msg = Message::new("a", "b", MessageType::Request, format!("msg-{i}"))
                .with_conversation(conv);
            store.record_message(&msg).unwrap();
        }

        let history = store.conversation_history(conv, 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg-2");
        assert_eq!(history[2].content, "msg-4");
    }

    #[test]
    fn test_conversation_history_empty() {
        let store = store();
        assert!(store
            .conversation_history(Uuid::new_v4(), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_recipient_history() {
        let store = store();
        store
            .record_message(&Message::new("s", "agent-1", MessageType::Request, "one"))
            .unwrap();
        store
            .record_message(&Message::new("s", "agent-2", MessageType::Request, "other"))
            .unwrap();
        store
            .record_message(&Message::new(
                "s",
                "agent-1",
                MessageType::Notification,
                "two",
            ))
            .unwrap();

        let tail = store.recipient_history("agent-1", 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "one");
        assert_eq!(tail[1].content, "two");
    }

    #[test]
    fn test_broadcast_audit_row() {
        let store = store();
        let msg = Message::new("u", BROADCAST_RECIPIENT, MessageType::Broadcast, "hi all");
        store.record_message(&msg).unwrap();
        let tail = store.recipient_history(BROADCAST_RECIPIENT, 10).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message_type, MessageType::Broadcast);
    }

    #[test]
    fn test_clear_agent_memory_empty() {
        let store = store();
        assert_eq!(store.clear_agent_memory(Uuid::new_v4()).unwrap(), 0);
    }

    #[test]
    fn test_health_check() {
        let store = store();
        store.health_check().unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conclave.db");

        let agent = AgentConfig::new("A", "r", "m");
        {
            let store = Store::open(&path).unwrap();
            store.insert_agent(&agent).unwrap();
        }

        // Reopen and verify persistence across store instances.
        let store = Store::open(&path).unwrap();
        assert!(store.get_agent(agent.agent_id).unwrap().is_some());
    }
}
