//! Code executor tool — runs a snippet in a subprocess with a deny-pattern
//! guard, a timeout, and output truncation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::{info, warn};

use super::base::{optional_string, require_string, Tool};

/// Maximum combined output before truncation (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Default snippet timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Patterns that are always blocked, whatever the language.
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\b(format|mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:", // fork bomb
    r#"\bos\.system\s*\(\s*['"]rm"#,
];

/// Execute short python or shell snippets inside the workspace.
pub struct CodeExecutorTool {
    workspace: PathBuf,
    timeout: Duration,
    deny_regexes: Vec<Regex>,
}

impl CodeExecutorTool {
    pub fn new(workspace: PathBuf, timeout_secs: Option<u64>) -> Self {
        let deny_regexes = DENY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            workspace,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            deny_regexes,
        }
    }

    /// Returns an error message when the snippet trips the guard.
    fn guard(&self, code: &str) -> Option<String> {
        let lower = code.to_lowercase();
        for re in &self.deny_regexes {
            if re.is_match(&lower) {
                warn!("code snippet blocked by safety guard");
                return Some(
                    "Error: Code blocked by safety guard (dangerous pattern detected)".into(),
                );
            }
        }
        None
    }
}

#[async_trait]
impl Tool for CodeExecutorTool {
    fn name(&self) -> &str {
        "code_executor"
    }

    fn description(&self) -> &str {
        "Execute a short code snippet and return its output. \
         Supported languages: 'python' and 'sh'. The snippet runs in the \
         agent workspace with a hard timeout; stdout, stderr, and a non-zero \
         exit code are all reported."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The snippet to run"
                },
                "language": {
                    "type": "string",
                    "description": "Snippet language: 'python' (default) or 'sh'",
                    "enum": ["python", "sh"]
                }
            },
            "required": ["code"]
        })
    }

    fn timeout(&self) -> Duration {
        // Leave headroom so the subprocess timeout below fires first.
        self.timeout + Duration::from_secs(5)
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<String> {
        let code = require_string(&args, "code")?;
        let language = optional_string(&args, "language").unwrap_or_else(|| "python".into());

        if let Some(blocked) = self.guard(&code) {
            return Ok(blocked);
        }

        let (program, flag) = match language.as_str() {
            "python" => ("python3", "-c"),
            "sh" => ("sh", "-c"),
            other => anyhow::bail!("Unsupported language: {other}"),
        };

        info!(language = %language, bytes = code.len(), "executing code snippet");

        let child = Command::new(program)
            .arg(flag)
            .arg(&code)
            .current_dir(&self.workspace)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn {program}: {e}"))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let code = output.status.code().unwrap_or(-1);

                let mut parts = Vec::new();
                if !stdout.is_empty() {
                    parts.push(stdout);
                }
                if !stderr.is_empty() {
                    parts.push(format!("STDERR:\n{stderr}"));
                }
                if code != 0 {
                    parts.push(format!("Exit code: {code}"));
                }

                let mut combined = if parts.is_empty() {
                    "(no output)".to_string()
                } else {
                    parts.join("\n")
                };

                if combined.len() > MAX_OUTPUT_LEN {
                    let remaining = combined.len() - MAX_OUTPUT_LEN;
                    combined.truncate(MAX_OUTPUT_LEN);
                    combined.push_str(&format!("\n... (truncated, {remaining} more chars)"));
                }
                Ok(combined)
            }
            Ok(Err(e)) => anyhow::bail!("Snippet failed to run: {e}"),
            Err(_) => Ok(format!(
                "Error: Snippet timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn tool(timeout: Option<u64>) -> (tempfile::TempDir, CodeExecutorTool) {
        let dir = tempfile::tempdir().unwrap();
        let tool = CodeExecutorTool::new(dir.path().to_path_buf(), timeout);
        (dir, tool)
    }

    #[tokio::test]
    async fn test_shell_snippet() {
        let (_dir, tool) = tool(Some(10));
        let result = tool
            .execute(make_args(&[("code", "echo conclave"), ("language", "sh")]))
            .await
            .unwrap();
        assert!(result.contains("conclave"));
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let (_dir, tool) = tool(Some(10));
        let result = tool
            .execute(make_args(&[("code", "exit 3"), ("language", "sh")]))
            .await
            .unwrap();
        assert!(result.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let (_dir, tool) = tool(None);
        let err = tool
            .execute(make_args(&[("code", "puts 'hi'"), ("language", "ruby")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported language"));
    }

    #[tokio::test]
    async fn test_guard_blocks_rm_rf() {
        let (_dir, tool) = tool(None);
        let result = tool
            .execute(make_args(&[("code", "rm -rf /"), ("language", "sh")]))
            .await
            .unwrap();
        assert!(result.contains("safety guard"));
    }

    #[test]
    fn test_guard_allows_ordinary_code() {
        let (_dir, tool) = tool(None);
        assert!(tool.guard("print(1 + 1)").is_none());
        assert!(tool.guard("ls -la").is_none());
    }

    #[test]
    fn test_guard_blocks_fork_bomb() {
        let (_dir, tool) = tool(None);
        assert!(tool.guard(":() { :|:& };:").is_some());
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, tool) = tool(Some(1));
        let result = tool
            .execute(make_args(&[("code", "sleep 30"), ("language", "sh")]))
            .await
            .unwrap();
        assert!(result.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_code_argument() {
        let (_dir, tool) = tool(None);
        assert!(tool.execute(Map::new()).await.is_err());
    }
}
