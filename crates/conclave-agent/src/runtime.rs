//! Agent runtime — the reason–act loop and the inbox-driven worker.
//!
//! Each started agent has one runtime. `think` runs the inline
//! reason–act loop (model call → parse → tool call → observation) and is
//! also invoked for task assignments and requests arriving on the inbox.
//! Tool failures and model errors are recorded as observations and never
//! kill the agent; the loop only ends with a final answer, the iteration
//! cap, a missed deadline, or a stop signal.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conclave_core::broker::{Inbox, MessageBroker};
use conclave_core::types::{AgentConfig, Message, MessageType};
use conclave_models::Generator;
use conclave_scheduler::TaskScheduler;

use crate::action::{parse_action, Action};
use crate::tools::ToolRegistry;

/// Default reason–act iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Returned when the iteration cap is reached without a final answer.
pub const ITERATION_CAP_FALLBACK: &str =
    "I could not determine a final answer within the allowed number of steps.";

/// Returned when a stop signal interrupts the loop.
pub const CANCELLED_FALLBACK: &str = "Cancelled before reaching a final answer.";

/// Returned when the optional deadline passes mid-loop.
pub const DEADLINE_FALLBACK: &str = "I ran out of time before reaching a final answer.";

/// The transient worker for one started agent.
pub struct AgentRuntime {
    config: AgentConfig,
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    broker: Arc<MessageBroker>,
    scheduler: Arc<TaskScheduler>,
    system_prompt: String,
    max_iterations: usize,
    stop: watch::Receiver<bool>,
    /// Reason–act iterations are strictly sequential per agent, even when
    /// an inline `think` races the inbox-driven loop.
    think_lock: tokio::sync::Mutex<()>,
}

impl AgentRuntime {
    pub fn new(
        config: AgentConfig,
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        broker: Arc<MessageBroker>,
        scheduler: Arc<TaskScheduler>,
        max_iterations: usize,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let system_prompt = build_system_prompt(&config, &tools);
        info!(
            agent = %config.name,
            tools = tools.tool_names().len(),
            max_iterations = max_iterations,
            "agent runtime created"
        );
        AgentRuntime {
            config,
            generator,
            tools,
            broker,
            scheduler,
            system_prompt,
            max_iterations,
            stop,
            think_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.config.agent_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    // ─────────────────────────────────────────
    // Reason–act loop
    // ─────────────────────────────────────────

    /// Run the reason–act loop for `prompt` and return the final answer.
    ///
    /// Issues at most `max_iterations` model calls. A stop signal or a
    /// passed deadline is observed at the next iteration boundary and
    /// yields the corresponding deterministic fallback string.
    pub async fn think(
        &self,
        prompt: &str,
        max_iterations: usize,
        deadline: Option<Instant>,
    ) -> String {
        let _serial = self.think_lock.lock().await;
        let mut history = format!("User Query: {prompt}\n");

        for iteration in 0..max_iterations {
            if *self.stop.borrow() {
                info!(agent = %self.config.name, "think cancelled by stop signal");
                return CANCELLED_FALLBACK.to_string();
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(agent = %self.config.name, "think deadline exceeded");
                return DEADLINE_FALLBACK.to_string();
            }

            debug!(agent = %self.config.name, iteration = iteration + 1, "reason-act iteration");
            let full_prompt = format!(
                "{}\n\n--- History ---\n{}\n\nYour Action:",
                self.system_prompt, history
            );

            let response = match self
                .generator
                .complete(&self.config.model_id, &full_prompt)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(agent = %self.config.name, error = %e, "model call failed");
                    history.push_str(&format!("\nObservation: Model error: {e}\n"));
                    continue;
                }
            };

            match parse_action(&response) {
                Action::FinalAnswer(answer) => {
                    debug!(agent = %self.config.name, "final answer");
                    return answer;
                }
                Action::ToolCall { tool, args } => {
                    if !self.config.may_use_tool(&tool) || !self.tools.has(&tool) {
                        warn!(agent = %self.config.name, tool = %tool, "tool not available");
                        history.push_str(&format!(
                            "\nAction: Tried to use tool '{tool}'.\nObservation: Error: Tool not available.\n"
                        ));
                        continue;
                    }
                    let rendered_args = Value::Object(args.clone()).to_string();
                    info!(agent = %self.config.name, tool = %tool, "executing tool");
                    let observation = self.tools.execute(&tool, args).await;
                    history.push_str(&format!(
                        "\nAction: Used tool '{tool}' with arguments {rendered_args}.\nObservation: {observation}\n"
                    ));
                }
            }
        }

        warn!(agent = %self.config.name, "iteration cap reached");
        ITERATION_CAP_FALLBACK.to_string()
    }

    // ─────────────────────────────────────────
    // Inbox-driven worker
    // ─────────────────────────────────────────

    /// Consume the inbox until the stop signal fires or the inbox closes.
    pub async fn run(&self, inbox: Inbox) {
        let mut stop = self.stop.clone();
        info!(agent = %self.config.name, "agent runtime started");
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                msg = inbox.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break,
                },
            }
        }
        info!(agent = %self.config.name, "agent runtime stopped");
    }

    async fn handle_message(&self, msg: Message) {
        debug!(
            agent = %self.config.name,
            message_type = msg.message_type.as_str(),
            sender = %msg.sender,
            "message received"
        );
        match msg.message_type {
            MessageType::TaskAssignment => self.handle_assignment(&msg).await,
            MessageType::Request => self.handle_request(&msg).await,
            // Everything else is informational for now.
            other => debug!(agent = %self.config.name, message_type = other.as_str(), "no handler"),
        }
    }

    async fn handle_assignment(&self, msg: &Message) {
        let task_id = msg
            .metadata
            .get("task_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let Some(task_id) = task_id else {
            warn!(agent = %self.config.name, "task assignment without task_id metadata");
            return;
        };

        let task = match self.scheduler.get(task_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(agent = %self.config.name, task_id = %task_id, error = %e, "assigned task not found");
                return;
            }
        };

        if let Err(e) = self.scheduler.update_progress(task_id, 0.1, None).await {
            warn!(task_id = %task_id, error = %e, "could not mark task in progress");
        }

        let answer = self.think(&task.description, self.max_iterations, None).await;
        if answer == CANCELLED_FALLBACK {
            // Leave the task for another run; the agent is being stopped.
            return;
        }

        if let Err(e) = self.scheduler.complete(task_id, Some(answer)).await {
            warn!(task_id = %task_id, error = %e, "could not complete task");
            if let Err(e) = self.scheduler.fail(task_id, &e.to_string()).await {
                debug!(task_id = %task_id, error = %e, "could not fail task either");
            }
        }
    }

    async fn handle_request(&self, msg: &Message) {
        let answer = self.think(&msg.content, self.max_iterations, None).await;
        if answer == CANCELLED_FALLBACK || !msg.requires_response {
            return;
        }

        let mut reply = Message::new(
            self.config.agent_id.to_string(),
            msg.sender.clone(),
            MessageType::Response,
            answer,
        );
        if let Some(conversation) = msg.conversation_id {
            reply = reply.with_conversation(conversation);
        }
        if !self.broker.send(reply) {
            warn!(agent = %self.config.name, recipient = %msg.sender, "response had no live recipient");
        }
    }
}

/// System prompt: identity, the fenced-JSON protocol, and the agent's
/// allowed tools.
fn build_system_prompt(config: &AgentConfig, tools: &ToolRegistry) -> String {
    let tool_lines: Vec<String> = tools
        .describe()
        .into_iter()
        .filter(|info| config.may_use_tool(&info.name))
        .map(|info| format!("- {}: {}", info.name, info.description))
        .collect();
    let tool_descriptions = if tool_lines.is_empty() {
        "No tools available.".to_string()
    } else {
        tool_lines.join("\n")
    };

    format!(
        "You are {}, an advanced AI agent. Your role is: {}.\n\n\
         To solve problems, you can use a thinking process. You will be given a user query and a history of your previous actions.\n\
         Based on this, you must decide on your next action. You have two choices:\n\
         1. **Use a tool**: If you need more information, respond with a JSON object specifying the tool and its arguments. The format MUST be:\n\
         ```json\n{{\"tool\": \"tool_name\", \"args\": {{\"arg_name\": \"value\"}}}}\n```\n\
         2. **Provide a final answer**: If you have enough information, provide the final answer as a plain string.\n\n\
         Here are the tools available to you:\n{}\n\n\
         Begin your thought process now.",
        config.name, config.role, tool_descriptions
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
