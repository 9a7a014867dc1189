//! File manager tool — read, write, append, list, and delete files confined
//! to the agent workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::base::{require_string, Tool};

/// Maximum file size returned by `read` (characters).
const MAX_READ_LEN: usize = 50_000;

/// Resolve a user-supplied relative path inside `root`, rejecting anything
/// that escapes it.
fn resolve_path(root: &Path, path: &str) -> anyhow::Result<PathBuf> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        anyhow::bail!("Access denied: absolute paths are not allowed");
    }
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        anyhow::bail!("Access denied: path traversal (..) is not allowed");
    }
    Ok(root.join(candidate))
}

/// File operations inside a workspace root.
pub struct FileManagerTool {
    workspace: PathBuf,
}

impl FileManagerTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn read(&self, path: &Path) -> anyhow::Result<String> {
        if !path.is_file() {
            anyhow::bail!("File not found: {}", path.display());
        }
        let mut content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        if content.len() > MAX_READ_LEN {
            let remaining = content.len() - MAX_READ_LEN;
            content.truncate(MAX_READ_LEN);
            content.push_str(&format!("\n... (truncated, {remaining} more chars)"));
        }
        Ok(content)
    }

    fn write(&self, path: &Path, content: &str, append: bool) -> anyhow::Result<String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", parent.display()))?;
        }
        let bytes = content.len();
        if append {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
            file.write_all(content.as_bytes())
                .map_err(|e| anyhow::anyhow!("Failed to append to {}: {e}", path.display()))?;
            Ok(format!("Appended {bytes} bytes to {}", path.display()))
        } else {
            std::fs::write(path, content)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
            Ok(format!("Wrote {bytes} bytes to {}", path.display()))
        }
    }

    fn list(&self, path: &Path) -> anyhow::Result<String> {
        if !path.is_dir() {
            anyhow::bail!("Not a directory: {}", path.display());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let kind = if entry.file_type()?.is_dir() { "dir" } else { "file" };
            entries.push(format!("{kind}  {}", entry.file_name().to_string_lossy()));
        }
        entries.sort();
        if entries.is_empty() {
            Ok("(empty directory)".into())
        } else {
            Ok(entries.join("\n"))
        }
    }

    fn delete(&self, path: &Path) -> anyhow::Result<String> {
        if !path.is_file() {
            anyhow::bail!("File not found: {}", path.display());
        }
        std::fs::remove_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to delete {}: {e}", path.display()))?;
        Ok(format!("Deleted {}", path.display()))
    }
}

#[async_trait]
impl Tool for FileManagerTool {
    fn name(&self) -> &str {
        "file_manager"
    }

    fn description(&self) -> &str {
        "Manage files inside the agent workspace. Operations: 'read' (path), \
         'write' (path, content), 'append' (path, content), 'list' (path, \
         defaults to the workspace root), 'delete' (path). Paths are \
         relative to the workspace; traversal outside it is rejected."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "One of: read, write, append, list, delete",
                    "enum": ["read", "write", "append", "list", "delete"]
                },
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "Content for write/append operations"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<String> {
        let operation = require_string(&args, "operation")?;
        debug!(operation = %operation, "file_manager call");

        match operation.as_str() {
            "read" => {
                let path = resolve_path(&self.workspace, &require_string(&args, "path")?)?;
                self.read(&path)
            }
            "write" | "append" => {
                let path = resolve_path(&self.workspace, &require_string(&args, "path")?)?;
                let content = require_string(&args, "content")?;
                self.write(&path, &content, operation == "append")
            }
            "list" => {
                let path = match args.get("path").and_then(Value::as_str) {
                    Some(p) => resolve_path(&self.workspace, p)?,
                    None => self.workspace.clone(),
                };
                self.list(&path)
            }
            "delete" => {
                let path = resolve_path(&self.workspace, &require_string(&args, "path")?)?;
                self.delete(&path)
            }
            other => anyhow::bail!("Unknown operation: {other}"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
