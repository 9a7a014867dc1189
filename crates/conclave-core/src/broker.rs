//! Message broker — per-agent inbound queues with direct, broadcast, and
//! channel delivery.
//!
//! Each registered agent gets an unbounded FIFO inbox backed by a tokio
//! mpsc channel: many producers, a single consumer (the agent's runtime).
//! Ordering is FIFO per (sender, recipient) pair; there is no global order
//! across senders. Delivery is at-least-once to live inboxes and
//! best-effort overall — task-critical retries belong to the scheduler.
//!
//! Every send writes an audit row to the store before enqueueing; audit
//! failures are logged and do not block delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::Store;
use crate::types::Message;

// ─────────────────────────────────────────────
// Inbox
// ─────────────────────────────────────────────

/// Receiving handle for one agent's inbox.
///
/// Cloneable, but there must be only one consumer at a time — the receiver
/// is shared behind an async mutex, so concurrent `recv` calls would steal
/// messages from each other.
#[derive(Clone)]
pub struct Inbox {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>,
    depth: Arc<AtomicUsize>,
}

impl Inbox {
    /// Wait for the next message. Returns `None` once the agent has been
    /// unregistered and the queue is drained.
    pub async fn recv(&self) -> Option<Message> {
        let msg = self.rx.lock().await.recv().await;
        if msg.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        msg
    }

    /// Wait for the next message up to `timeout`. Returns `None` on timeout
    /// or when the queue is closed and drained.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.recv()).await.ok()?
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct AgentChannel {
    tx: mpsc::UnboundedSender<Message>,
    inbox: Inbox,
    depth: Arc<AtomicUsize>,
}

impl AgentChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        AgentChannel {
            tx,
            inbox: Inbox {
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
                depth: depth.clone(),
            },
            depth,
        }
    }

    fn enqueue(&self, msg: Message) -> bool {
        match self.tx.send(msg) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }
}

// ─────────────────────────────────────────────
// Broker stats
// ─────────────────────────────────────────────

/// Point-in-time broker counters for the stats endpoint.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BrokerStats {
    pub registered_agents: usize,
    pub active_conversations: usize,
    pub broadcast_channels: usize,
    pub total_queued_messages: usize,
}

// ─────────────────────────────────────────────
// MessageBroker
// ─────────────────────────────────────────────

/// Central router for agent-to-agent communication.
pub struct MessageBroker {
    store: Option<Arc<Store>>,
    agents: RwLock<HashMap<String, AgentChannel>>,
    conversations: RwLock<HashMap<Uuid, Vec<String>>>,
    channels: RwLock<HashMap<String, Vec<String>>>,
}

impl MessageBroker {
    /// Broker without an audit store (tests, embedded use).
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Broker that persists an audit row for every message sent.
    pub fn with_store(store: Arc<Store>) -> Self {
        Self::build(Some(store))
    }

    fn build(store: Option<Arc<Store>>) -> Self {
        MessageBroker {
            store,
            agents: RwLock::new(HashMap::new()),
            conversations: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    // ─────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────

    /// Idempotently create an inbox for `agent_id` and return its handle.
    pub fn register_agent(&self, agent_id: &str) -> Inbox {
        let mut agents = self.agents.write().unwrap();
        if let Some(existing) = agents.get(agent_id) {
            return existing.inbox.clone();
        }
        let channel = AgentChannel::new();
        let inbox = channel.inbox.clone();
        agents.insert(agent_id.to_string(), channel);
        info!(agent_id = %agent_id, "registered agent inbox");
        inbox
    }

    /// Remove an agent's inbox. Undelivered messages are dropped once the
    /// consumer releases its handle.
    pub fn unregister_agent(&self, agent_id: &str) {
        let removed = self.agents.write().unwrap().remove(agent_id);
        match removed {
            Some(channel) => {
                let pending = channel.depth.load(Ordering::Relaxed);
                if pending > 0 {
                    warn!(
                        agent_id = %agent_id,
                        pending = pending,
                        "unregistered agent with undelivered messages"
                    );
                } else {
                    info!(agent_id = %agent_id, "unregistered agent inbox");
                }
            }
            None => debug!(agent_id = %agent_id, "unregister for unknown agent"),
        }
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.read().unwrap().contains_key(agent_id)
    }

    // ─────────────────────────────────────────
    // Delivery
    // ─────────────────────────────────────────

    /// Route a message. Broadcasts (recipient `ALL` or type `broadcast`)
    /// fan out to every registered agent except the sender, each copy with
    /// a freshly minted id. Returns `true` iff at least one recipient was
    /// enqueued.
    pub fn send(&self, msg: Message) -> bool {
        self.audit(&msg);

        if msg.is_broadcast() {
            return self.fan_out(&msg);
        }

        let agents = self.agents.read().unwrap();
        match agents.get(&msg.recipient) {
            Some(channel) => {
                let delivered = channel.enqueue(msg.clone());
                if delivered {
                    debug!(
                        sender = %msg.sender,
                        recipient = %msg.recipient,
                        message_type = msg.message_type.as_str(),
                        "message enqueued"
                    );
                } else {
                    warn!(recipient = %msg.recipient, "inbox closed, message dropped");
                }
                delivered
            }
            None => {
                warn!(recipient = %msg.recipient, "recipient not registered");
                false
            }
        }
    }

    fn fan_out(&self, msg: &Message) -> bool {
        let agents = self.agents.read().unwrap();
        let mut delivered = 0usize;
        for (agent_id, channel) in agents.iter() {
            if *agent_id == msg.sender {
                continue;
            }
            if channel.enqueue(msg.reminted_for(agent_id)) {
                delivered += 1;
            }
        }
        info!(sender = %msg.sender, recipients = delivered, "broadcast fan-out");
        delivered > 0
    }

    /// Wait for the next message for `agent_id`, up to `timeout` (`None`
    /// blocks indefinitely). Returns `None` on timeout or unknown agent.
    pub async fn receive(&self, agent_id: &str, timeout: Option<Duration>) -> Option<Message> {
        let inbox = {
            let agents = self.agents.read().unwrap();
            agents.get(agent_id)?.inbox.clone()
        };
        match timeout {
            Some(t) => inbox.recv_timeout(t).await,
            None => inbox.recv().await,
        }
    }

    fn audit(&self, msg: &Message) {
        if let Some(store) = &self.store {
            if let Err(e) = store.record_message(msg) {
                warn!(message_id = %msg.id, error = %e, "failed to persist message audit row");
            }
        }
    }

    // ─────────────────────────────────────────
    // Conversations & channels (in-memory)
    // ─────────────────────────────────────────

    /// Create a conversation grouping the given participants.
    pub fn create_conversation(&self, participants: Vec<String>) -> Uuid {
        let id = Uuid::new_v4();
        info!(conversation_id = %id, participants = participants.len(), "created conversation");
        self.conversations.write().unwrap().insert(id, participants);
        id
    }

    pub fn conversation_participants(&self, conversation_id: Uuid) -> Option<Vec<String>> {
        self.conversations
            .read()
            .unwrap()
            .get(&conversation_id)
            .cloned()
    }

    /// Audit-backed history of a conversation, chronological order.
    pub fn history(&self, conversation_id: Uuid, limit: usize) -> crate::Result<Vec<Message>> {
        match &self.store {
            Some(store) => store.conversation_history(conversation_id, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Subscribe an agent to a broadcast channel (created on first join).
    pub fn join_channel(&self, agent_id: &str, channel: &str) {
        let mut channels = self.channels.write().unwrap();
        let members = channels.entry(channel.to_string()).or_default();
        if !members.iter().any(|m| m == agent_id) {
            members.push(agent_id.to_string());
            info!(agent_id = %agent_id, channel = %channel, "joined channel");
        }
    }

    pub fn leave_channel(&self, agent_id: &str, channel: &str) {
        let mut channels = self.channels.write().unwrap();
        if let Some(members) = channels.get_mut(channel) {
            members.retain(|m| m != agent_id);
            info!(agent_id = %agent_id, channel = %channel, "left channel");
        }
    }

    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        self.channels
            .read()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────

    /// Number of messages queued for one agent.
    pub fn queue_size(&self, agent_id: &str) -> usize {
        self.agents
            .read()
            .unwrap()
            .get(agent_id)
            .map(|c| c.depth.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> BrokerStats {
        let agents = self.agents.read().unwrap();
        BrokerStats {
            registered_agents: agents.len(),
            active_conversations: self.conversations.read().unwrap().len(),
            broadcast_channels: self.channels.read().unwrap().len(),
            total_queued_messages: agents
                .values()
                .map(|c| c.depth.load(Ordering::Relaxed))
                .sum(),
        }
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageType, BROADCAST_RECIPIENT};

    fn request(sender: &str, recipient: &str, content: &str) -> Message {
        Message::new(sender, recipient, MessageType::Request, content)
    }

    #[tokio::test]
    async fn test_direct_delivery() {
        let broker = MessageBroker::new();
        let inbox = broker.register_agent("a1");

        assert!(broker.send(request("u", "a1", "hello")));
        let msg = inbox.recv().await.unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.sender, "u");
    }

    #[tokio::test]
    async fn test_fifo_per_sender_recipient_pair() {
        let broker = MessageBroker::new();
        let inbox = broker.register_agent("a1");

        for i in 0..5 {
            assert!(broker.send(request("s", "a1", &format!("msg-{i}"))));
        }
        for i in 0..5 {
            let msg = inbox.recv().await.unwrap();
            assert_eq!(msg.content, format!("msg-{i}"));
        }
    }

    #[tokio::test]
    async fn test_register_idempotent() {
        let broker = MessageBroker::new();
        let first = broker.register_agent("a1");
        let second = broker.register_agent("a1");

        // Both handles read from the same queue.
        broker.send(request("u", "a1", "only one"));
        assert!(first.recv().await.is_some());
        assert!(second
            .recv_timeout(Duration::from_millis(20))
            .await
            .is_none());
    }

    #[test]
    fn test_send_to_unknown_recipient() {
        let broker = MessageBroker::new();
        assert!(!broker.send(request("u", "ghost", "anyone there?")));
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let broker = MessageBroker::new();
        let a1 = broker.register_agent("a1");
        let a2 = broker.register_agent("a2");
        let a3 = broker.register_agent("a3");

        let msg = Message::new("a1", BROADCAST_RECIPIENT, MessageType::Broadcast, "hi");
        assert!(broker.send(msg));

        // a2 and a3 each receive exactly one copy; a1 none.
        let m2 = a2.recv().await.unwrap();
        let m3 = a3.recv().await.unwrap();
        assert_eq!(m2.content, "hi");
        assert_eq!(m3.content, "hi");
        // Each copy has its own id and its own recipient.
        assert_ne!(m2.id, m3.id);
        assert_eq!(m2.recipient, "a2");
        assert_eq!(m3.recipient, "a3");
        assert!(a1.recv_timeout(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_from_external_sender_reaches_all() {
        let broker = MessageBroker::new();
        let inboxes: Vec<Inbox> = (1..=3)
            .map(|i| broker.register_agent(&format!("a{i}")))
            .collect();

        let msg = Message::new("u", BROADCAST_RECIPIENT, MessageType::Notification, "hi");
        assert!(broker.send(msg));

        for inbox in &inboxes {
            assert!(inbox.recv().await.is_some());
        }
    }

    #[test]
    fn test_broadcast_with_no_agents_fails() {
        let broker = MessageBroker::new();
        let msg = Message::new("u", BROADCAST_RECIPIENT, MessageType::Broadcast, "void");
        assert!(!broker.send(msg));
    }

    #[tokio::test]
    async fn test_receive_timeout_returns_none() {
        let broker = MessageBroker::new();
        broker.register_agent("a1");
        let got = broker
            .receive("a1", Some(Duration::from_millis(20)))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_receive_unknown_agent() {
        let broker = MessageBroker::new();
        assert!(broker
            .receive("nobody", Some(Duration::from_millis(10)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_unregister_drops_queue() {
        let broker = MessageBroker::new();
        broker.register_agent("a1");
        broker.send(request("u", "a1", "pending"));

        broker.unregister_agent("a1");
        assert!(!broker.is_registered("a1"));
        assert!(!broker.send(request("u", "a1", "late")));
    }

    #[test]
    fn test_queue_size_tracking() {
        let broker = MessageBroker::new();
        broker.register_agent("a1");
        assert_eq!(broker.queue_size("a1"), 0);

        broker.send(request("u", "a1", "one"));
        broker.send(request("u", "a1", "two"));
        assert_eq!(broker.queue_size("a1"), 2);
        assert_eq!(broker.queue_size("missing"), 0);
    }

    #[test]
    fn test_conversations() {
        let broker = MessageBroker::new();
        let id = broker.create_conversation(vec!["a1".into(), "a2".into()]);
        let participants = broker.conversation_participants(id).unwrap();
        assert_eq!(participants, vec!["a1".to_string(), "a2".to_string()]);
        assert!(broker.conversation_participants(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_channel_membership() {
        let broker = MessageBroker::new();
        broker.join_channel("a1", "team_alpha");
        broker.join_channel("a2", "team_alpha");
        broker.join_channel("a1", "team_alpha"); // no duplicate

        assert_eq!(broker.channel_members("team_alpha").len(), 2);

        broker.leave_channel("a1", "team_alpha");
        assert_eq!(broker.channel_members("team_alpha"), vec!["a2".to_string()]);
        assert!(broker.channel_members("team_omega").is_empty());
    }

    #[test]
    fn test_stats() {
        let broker = MessageBroker::new();
        broker.register_agent("a1");
        broker.register_agent("a2");
        broker.send(request("u", "a1", "x"));
        broker.create_conversation(vec!["a1".into()]);
        broker.join_channel("a1", "team_a");

        let stats = broker.stats();
        assert_eq!(stats.registered_agents, 2);
        assert_eq!(stats.active_conversations, 1);
        assert_eq!(stats.broadcast_channels, 1);
        assert_eq!(stats.total_queued_messages, 1);
    }

    #[tokio::test]
    async fn test_audit_rows_written_before_delivery() {
        let store = Arc::new(Store::in_memory().unwrap());
        let broker = MessageBroker::with_store(store.clone());
        broker.register_agent("a1");

        let conv = broker.create_conversation(vec!["u".into(), "a1".into()]);
        let msg = request("u", "a1", "first").with_conversation(conv);
        assert!(broker.send(msg));
        let msg = request("u", "a1", "second").with_conversation(conv);
        assert!(broker.send(msg));

        let history = broker.history(conv, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn test_audit_row_even_when_recipient_missing() {
        // Delivery is best-effort, but the audit trail still records the
        // attempt — the send happened even if nobody was listening.
        let store = Arc::new(Store::in_memory().unwrap());
        let broker = MessageBroker::with_store(store.clone());

        let conv = broker.create_conversation(vec!["u".into()]);
        assert!(!broker.send(request("u", "ghost", "lost").with_conversation(conv)));
        assert_eq!(broker.history(conv, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_many_producers_single_consumer() {
        let broker = Arc::new(MessageBroker::new());
        let inbox = broker.register_agent("sink");

        let mut handles = Vec::new();
        for producer in 0..4 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    broker.send(Message::new(
                        format!("p{producer}"),
                        "sink",
                        MessageType::Request,
                        format!("{producer}-{i}"),
                    ));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // All 40 arrive; per-producer order is preserved.
        let mut last_seen: HashMap<String, usize> = HashMap::new();
        for _ in 0..40 {
            let msg = inbox.recv().await.unwrap();
            let (producer, seq) = msg.content.split_once('-').unwrap();
            let seq: usize = seq.parse().unwrap();
            if let Some(prev) = last_seen.get(producer) {
                assert!(seq > *prev, "FIFO violated for {producer}");
            }
            last_seen.insert(producer.to_string(), seq);
        }
    }
}
