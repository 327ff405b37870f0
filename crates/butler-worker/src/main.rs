//! Butler Worker

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use butler_core::TaskId;
use butler_tool::ProcessInvoker;
use butler_worker::{
    load_registry, Config, MemoryStore, StepExecutor, TaskRunCoordinator, WorkspaceManager,
};

/// Butler worker - runs OCR processing chains
#[derive(Parser)]
#[command(name = "butler-worker")]
#[command(about = "Runs OCR processing chains for stored tasks", long_about = None)]
struct Cli {
    /// Root directory for task workspaces
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Log level handed to processing tools
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory of fallback processor descriptions
    #[arg(long, global = true)]
    specs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chain of a stored task
    Run {
        /// Task ID
        task_id: String,

        /// Chain and task store file
        #[arg(long, env = "BUTLER_STORE")]
        store: PathBuf,
    },

    /// List the registered processors
    Processors,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("butler_worker=info,butler_tool=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.tool_log_level = level;
    }
    if let Some(dir) = cli.specs_dir {
        config.processor_specs_dir = Some(dir);
    }

    let registry =
        load_registry(config.processors.as_slice(), config.processor_specs_dir.as_deref()).await;

    match cli.command {
        Commands::Processors => {
            println!("{}", serde_json::to_string_pretty(&registry)?);
        }
        Commands::Run { task_id, store } => {
            run_task(&config, registry, TaskId::new(task_id), store).await?;
        }
    }

    Ok(())
}

async fn run_task(
    config: &Config,
    registry: butler_core::ProcessorRegistry,
    task_id: TaskId,
    store_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::load(&store_path).await?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("butler-worker/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let coordinator = TaskRunCoordinator::new(
        Arc::new(registry),
        store.clone(),
        store.clone(),
        WorkspaceManager::new(config.results_dir.clone(), config.manifest_basename.clone())
            .with_http_client(http),
        StepExecutor::new(Arc::new(ProcessInvoker::new()), config.tool_log_level.clone()),
    );

    let outcome = coordinator.run_task(&task_id).await;

    store.save(&store_path).await?;
    info!(store = %store_path.display(), "Store written");

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
