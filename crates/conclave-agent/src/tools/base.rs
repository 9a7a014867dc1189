//! Tool trait — the interface every agent tool implements.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Default per-tool execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A named, described, executable unit with typed arguments and a textual
/// result.
///
/// The runtime discovers tools via `name()`, renders `description()` into
/// the agent's system prompt, and dispatches fenced-JSON calls through the
/// registry via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call this tool (e.g. `"web_scraper"`).
    fn name(&self) -> &str;

    /// What the tool does and what its arguments mean. Read by the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments:
    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Execute with the given arguments, returning text for the model.
    ///
    /// Returning `Err` is fine — the registry turns it into an error string
    /// so a failing tool never takes the agent down.
    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<String>;

    /// How long the registry lets a call run before killing it.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }
}

// ─────────────────────────────────────────────
// Argument helpers
// ─────────────────────────────────────────────

/// Extract a required string argument with a model-friendly error.
pub fn require_string(args: &Map<String, Value>, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing required argument: {key}"))
}

/// Extract an optional string argument.
pub fn optional_string(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Extract an optional integer argument.
pub fn optional_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_require_string() {
        let a = args(&[("url", json!("https://example.com"))]);
        assert_eq!(require_string(&a, "url").unwrap(), "https://example.com");
        assert!(require_string(&a, "missing").is_err());
    }

    #[test]
    fn test_require_string_wrong_type() {
        let a = args(&[("url", json!(7))]);
        assert!(require_string(&a, "url").is_err());
    }

    #[test]
    fn test_optional_helpers() {
        let a = args(&[("mode", json!("fast")), ("count", json!(3))]);
        assert_eq!(optional_string(&a, "mode").as_deref(), Some("fast"));
        assert_eq!(optional_string(&a, "other"), None);
        assert_eq!(optional_i64(&a, "count"), Some(3));
        assert_eq!(optional_i64(&a, "mode"), None);
    }

    #[tokio::test]
    async fn test_default_timeout() {
        struct NoopTool;

        #[async_trait]
        impl Tool for NoopTool {
            fn name(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                "Does nothing"
            }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _args: Map<String, Value>) -> anyhow::Result<String> {
                Ok("ok".into())
            }
        }

        assert_eq!(NoopTool.timeout(), DEFAULT_TOOL_TIMEOUT);
    }
}
