//! Configuration — typed schema plus the YAML loader.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. YAML file (`conclave.yaml` by default)
//! 3. Environment variables `CONCLAVE_<SECTION>__<FIELD>` (override YAML)

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────

/// Root configuration for the Conclave server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    /// Directory the built-in tools operate in.
    pub workspace: String,
    /// Model id → backend description.
    pub llm_models: HashMap<String, ModelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            workspace: "workspace".to_string(),
            llm_models: HashMap::new(),
        }
    }
}

/// Where the SQLite database lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "conclave.db".to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Periodic-loop and auto-assignment tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler cycles.
    pub cycle_secs: u64,
    /// Maximum tasks auto-assigned per cycle.
    pub auto_assign_batch: usize,
    /// Concurrent-task cap per agent (ignored by high-autonomy agents).
    pub workload_cap: usize,
    /// Seconds to wait for an agent runtime to drain on stop.
    pub drain_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 60,
            auto_assign_batch: 5,
            workload_cap: 3,
            drain_timeout_secs: 10,
        }
    }
}

/// Which backend family serves a model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelProvider {
    /// llama.cpp-style server (`/completion` wire format).
    #[serde(rename = "gguf-server")]
    GgufServer,
    /// text-generation-inference-style server (`/generate` wire format).
    #[serde(rename = "transformer-server")]
    TransformerServer,
}

/// One entry in the `llm_models` map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    /// Base URL of the model server.
    pub base_url: String,
    /// Path of the weights the server has loaded. Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(default)]
    pub config: GenerationDefaults,
}

/// Per-model generation defaults, overridable per request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

// ─────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────

/// Load configuration from `path` (or `conclave.yaml` in the working
/// directory), falling back to defaults when the file is missing or
/// unparseable, then applying env overrides.
pub fn load_config(path: Option<&Path>) -> Config {
    let default_path = Path::new("conclave.yaml");
    let config_path = path.unwrap_or(default_path);

    let config = if config_path.exists() {
        debug!(path = %config_path.display(), "loading config");
        match std::fs::read_to_string(config_path) {
            Ok(content) => match serde_yaml::from_str::<Config>(&content) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "failed to parse config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "failed to read config, using defaults");
                Config::default()
            }
        }
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        Config::default()
    };

    apply_env_overrides(config)
}

/// Write a config as YAML (used by `conclaved init-config`).
pub fn save_config(config: &Config, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = serde_yaml::to_string(config).map_err(std::io::Error::other)?;
    std::fs::write(path, yaml)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Environment overrides, `CONCLAVE_<SECTION>__<FIELD>`:
/// - `CONCLAVE_DATABASE__PATH`
/// - `CONCLAVE_SERVER__HOST` / `CONCLAVE_SERVER__PORT`
/// - `CONCLAVE_SCHEDULER__CYCLE_SECS`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(path) = std::env::var("CONCLAVE_DATABASE__PATH") {
        config.database.path = path;
    }
    if let Ok(host) = std::env::var("CONCLAVE_SERVER__HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("CONCLAVE_SERVER__PORT") {
        match port.parse() {
            Ok(p) => config.server.port = p,
            Err(_) => warn!(value = %port, "ignoring invalid CONCLAVE_SERVER__PORT"),
        }
    }
    if let Ok(secs) = std::env::var("CONCLAVE_SCHEDULER__CYCLE_SECS") {
        match secs.parse() {
            Ok(s) => config.scheduler.cycle_secs = s,
            Err(_) => warn!(value = %secs, "ignoring invalid CONCLAVE_SCHEDULER__CYCLE_SECS"),
        }
    }
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
