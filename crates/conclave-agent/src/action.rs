//! Parsing of model output into the next agent action.
//!
//! The wire protocol is a fenced block containing a JSON object with both
//! `tool` and `args` keys; anything else is a final answer. Parsing is
//! tolerant: every fenced block in the response is tried, surrounding prose
//! is ignored, and malformed JSON simply falls through to the final-answer
//! interpretation.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// What the model asked for in one reason–act step.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Invoke `tool` with the given arguments.
    ToolCall {
        tool: String,
        args: Map<String, Value>,
    },
    /// The response is the final answer.
    FinalAnswer(String),
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // ```json ... ``` or bare ``` ... ```; non-greedy so multiple fences
    // in one response are matched separately.
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"))
}

/// Interpret a model response as either a tool call or a final answer.
pub fn parse_action(response: &str) -> Action {
    for capture in fence_regex().captures_iter(response) {
        let block = capture[1].trim();
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(block) {
            let tool = obj.get("tool").and_then(Value::as_str);
            let args = obj.get("args").and_then(Value::as_object);
            if let (Some(tool), Some(args)) = (tool, args) {
                return Action::ToolCall {
                    tool: tool.to_string(),
                    args: args.clone(),
                };
            }
        }
    }
    Action::FinalAnswer(response.trim().to_string())
}
