//! conclaved — the Conclave orchestration server.
//!
//! # Commands
//!
//! - `conclaved serve [-c conclave.yaml]` — run the HTTP server
//! - `conclaved init-config [PATH]` — write a starter configuration file

mod error;
mod routes;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use conclave_agent::tools::code::CodeExecutorTool;
use conclave_agent::tools::files::FileManagerTool;
use conclave_agent::tools::web::WebScraperTool;
use conclave_agent::tools::ToolRegistry;
use conclave_agent::AgentManager;
use conclave_core::broker::MessageBroker;
use conclave_core::config::{
    load_config, save_config, Config, GenerationDefaults, ModelConfig, ModelProvider,
};
use conclave_core::store::Store;
use conclave_models::ModelRouter;
use conclave_scheduler::{SchedulerService, TaskScheduler};

use crate::state::AppState;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Conclave — server-side orchestrator for a fleet of tool-using AI agents.
#[derive(Parser)]
#[command(name = "conclaved", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Path to the YAML configuration file (default: conclave.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Write a starter configuration file
    InitConfig {
        /// Where to write the file
        #[arg(default_value = "conclave.yaml")]
        path: PathBuf,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, logs } => serve(config.as_deref(), logs).await,
        Commands::InitConfig { path } => init_config(&path),
    }
}

async fn serve(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let _log_guard = init_logging(verbose);
    let config = load_config(config_path);

    // Persistence + broker.
    let store = Arc::new(
        Store::open(Path::new(&config.database.path))
            .with_context(|| format!("failed to open database {}", config.database.path))?,
    );
    let broker = Arc::new(MessageBroker::with_store(store.clone()));

    // Scheduler rebuilds open tasks from the store.
    let scheduler = Arc::new(TaskScheduler::new(
        store.clone(),
        broker.clone(),
        config.scheduler.clone(),
    )?);

    // Model router over the configured backends.
    let models = Arc::new(ModelRouter::new(config.llm_models.clone()));

    // Startup-time tool registration.
    let workspace = PathBuf::from(&config.workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CodeExecutorTool::new(workspace.clone(), None)));
    tools.register(Arc::new(FileManagerTool::new(workspace)));
    tools.register(Arc::new(WebScraperTool::new()));
    let tools = Arc::new(tools);

    let manager = Arc::new(AgentManager::new(
        store.clone(),
        broker.clone(),
        scheduler.clone(),
        models.clone(),
        tools.clone(),
        Duration::from_secs(config.scheduler.drain_timeout_secs),
    ));

    // Periodic loop, joined on shutdown.
    let service = Arc::new(SchedulerService::new(
        scheduler.clone(),
        Duration::from_secs(config.scheduler.cycle_secs),
    ));
    let service_handle = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    let app = routes::build_router(AppState {
        store,
        broker,
        scheduler,
        manager,
        models,
        tools,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "conclaved listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.stop();
    service_handle.await.context("scheduler service panicked")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let mut config = Config::default();
    config.llm_models.insert(
        "qwen-7b-chat-gguf".to_string(),
        ModelConfig {
            provider: ModelProvider::GgufServer,
            base_url: "http://127.0.0.1:8080".to_string(),
            model_path: Some("/models/qwen-7b-chat.Q4_K_M.gguf".to_string()),
            config: GenerationDefaults::default(),
        },
    );
    save_config(&config, path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Console + daily-rolling file logging.
fn init_logging(verbose: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::EnvFilter;

    let file_appender = tracing_appender::rolling::daily("logs", "conclave.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if verbose {
        EnvFilter::new("conclave=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file_writer.and(std::io::stdout))
        .with_target(false)
        .compact()
        .init();
    guard
}
