//! Tool registry — the startup-time `name → Tool` table.
//!
//! Tools register explicitly during startup (no filesystem discovery);
//! a duplicate name logs a warning and the later registration wins. Once
//! the registry is shared behind an `Arc` it is read-only.
//!
//! Dispatch always hands a `String` back to the reason–act loop: execution
//! errors and timeouts become error text, never panics or propagated
//! failures.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::base::Tool;

/// Name, description, and argument schema of one registered tool.
#[derive(Clone, Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Stores tools keyed by name and dispatches calls.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A duplicate name warns and replaces the earlier
    /// registration.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "duplicate tool registration, later one wins");
        } else {
            info!(tool = %name, "registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Listing for the tools endpoint, sorted by name.
    pub fn describe(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Execute a tool by name under its timeout. The model always gets a
    /// string back, even on failure.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> String {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = %name, "tool not found");
                return format!("Error: Tool '{name}' not found");
            }
        };

        match tokio::time::timeout(tool.timeout(), tool.execute(args)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "tool execution failed");
                format!("Error executing {name}: {e}")
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = tool.timeout().as_secs(), "tool timed out");
                format!(
                    "Error: Tool '{name}' timed out after {} seconds",
                    tool.timeout().as_secs()
                )
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
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
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<String> {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("(empty)");
            Ok(format!("Echo: {text}"))
        }
    }

    struct BoomTool;

    #[async_trait]
    impl Tool for BoomTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always raises"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _args: Map<String, Value>) -> anyhow::Result<String> {
            anyhow::bail!("kaboom")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps past its own timeout"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
        async fn execute(&self, _args: Map<String, Value>) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".into())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.has("echo"));
        assert!(!reg.has("nope"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_name_later_wins() {
        struct EchoV2;

        #[async_trait]
        impl Tool for EchoV2 {
            fn name(&self) -> &str {
                "echo"
            }
            fn description(&self) -> &str {
                "Second echo"
            }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _args: Map<String, Value>) -> anyhow::Result<String> {
                Ok("v2".into())
            }
        }

        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(EchoV2));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("echo").unwrap().description(), "Second echo");
    }

    #[test]
    fn test_describe_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(BoomTool));
        reg.register(Arc::new(EchoTool));
        let infos = reg.describe();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "boom");
        assert_eq!(infos[1].name, "echo");
        assert_eq!(reg.tool_names(), vec!["boom", "echo"]);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let mut args = Map::new();
        args.insert("text".into(), json!("hello"));
        assert_eq!(reg.execute("echo", args).await, "Echo: hello");
    }

    #[tokio::test]
    async fn test_execute_not_found() {
        let reg = ToolRegistry::new();
        let result = reg.execute("missing", Map::new()).await;
        assert!(result.starts_with("Error: Tool 'missing' not found"));
    }

    #[tokio::test]
    async fn test_execute_error_becomes_string() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(BoomTool));
        let result = reg.execute("boom", Map::new()).await;
        assert!(result.starts_with("Error executing boom:"));
        assert!(result.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_execute_timeout_becomes_string() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(SlowTool));
        let result = reg.execute("slow", Map::new()).await;
        assert!(result.contains("timed out"));
    }
}
