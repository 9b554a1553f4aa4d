// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, GatewayCommands, TokenCommands};
use haya_channels::{ChannelRegistry, Dock};
use haya_config::{Config, LogLevel};
use haya_core::HistoryManager;
use haya_gateway::{AppState, GatewayAuth};
use haya_memory::{BruteForceVectorIndex, MemoryDatabase, SaveMemoryTool, SqliteMemoryDatabase, VectorIndex};
use haya_model::{AgentRuntime, ChatEvent, ChatRequest, Message, Usage};
use haya_scheduler::{CronJob, JobRunner, Scheduler};
use haya_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(*shell);
            Ok(())
        }
        Some(Commands::ShowConfig { config }) => {
            let config = haya_config::load(config.as_deref())?;
            init_logging(cli.verbose, config.logging.level);
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Some(Commands::Gateway { command: GatewayCommands::Token { command: TokenCommands::Regenerate } }) => {
            println!("{}", generate_token());
            Ok(())
        }
        Some(Commands::Serve { config }) => {
            let config = haya_config::load(config.as_deref())?;
            init_logging(cli.verbose, config.logging.level);
            run_serve(config).await
        }
        None => {
            let config = haya_config::load(None)?;
            init_logging(cli.verbose, config.logging.level);
            run_serve(config).await
        }
    }
}

/// Assembles the gateway's shared state from a validated [`Config`], starts
/// the HTTP/WebSocket server and the cron scheduler, and runs until the
/// process receives an interrupt (spec.md §4.8, §6 `cron[]`).
async fn run_serve(config: Config) -> anyhow::Result<()> {
    let history = Arc::new(HistoryManager::new(config.agent.max_history_messages));
    let tools = Arc::new(ToolRegistry::new());

    let (memory_db, vector_index): (Option<Arc<dyn MemoryDatabase>>, Option<Arc<dyn VectorIndex>>) =
        if config.memory.enabled {
            let db: Arc<dyn MemoryDatabase> = Arc::new(open_memory_db(&config)?);
            let index: Arc<dyn VectorIndex> = Arc::new(BruteForceVectorIndex::new());
            tools
                .register(Arc::new(SaveMemoryTool::new(db.clone())))
                .context("registering save_memory tool")?;
            (Some(db), Some(index))
        } else {
            (None, None)
        };

    let channels = Arc::new(ChannelRegistry::new());
    let dock = Arc::new(Dock::new(channels.clone()));
    if !config.plugins.is_empty() {
        warn!(
            plugins = ?config.plugins,
            "no channel plugins are registered in this build; configured plugin ids will not start"
        );
    }

    let jobs = config
        .cron
        .iter()
        .map(|j| CronJob::new(j.name.clone(), &j.schedule, j.action.clone(), j.enabled))
        .collect::<Result<Vec<_>, _>>()
        .context("parsing gateway.cron")?;
    let scheduler = Arc::new(Scheduler::new(jobs).context("building cron scheduler")?);

    let auth = Arc::new(GatewayAuth::from_config(&config.gateway.auth).context("initializing gateway auth")?);
    let runtime: Arc<dyn AgentRuntime> = Arc::new(UnconfiguredRuntime);

    let state = Arc::new(AppState::new(
        config.clone(),
        history,
        tools,
        channels,
        dock,
        scheduler.clone(),
        memory_db,
        vector_index,
        runtime,
        auth,
    ));

    let server = haya_gateway::serve(&config, state).await.context("starting gateway server")?;
    info!(addr = %server.local_addr, "haya gateway started");

    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler.tick_loop(Arc::new(LoggingJobRunner), std::time::Duration::from_secs(1)).await;
        }
    });

    tokio::select! {
        result = server.wait() => {
            scheduler_task.abort();
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            server.abort();
            scheduler_task.abort();
            Ok(())
        }
    }
}

fn open_memory_db(config: &Config) -> anyhow::Result<SqliteMemoryDatabase> {
    match config.memory.db_path.as_deref() {
        Some(path) => {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteMemoryDatabase::open(&path)
        }
        None => {
            let dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("haya");
            std::fs::create_dir_all(&dir)?;
            SqliteMemoryDatabase::open(&dir.join("memory.db"))
        }
    }
}

fn generate_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Dispatches fired cron jobs by logging them. `action` interpretation (e.g.
/// routing to a tool call or an internal command) is the host application's
/// responsibility; this crate only guarantees the job fired on schedule
/// (spec.md §1, §6 `cron[]`).
struct LoggingJobRunner;

#[async_trait]
impl JobRunner for LoggingJobRunner {
    async fn run(&self, job_name: &str, action: &str) -> anyhow::Result<()> {
        info!(job = job_name, action, "cron job fired");
        Ok(())
    }
}

/// Placeholder [`AgentRuntime`] used until an operator wires in a concrete
/// provider driver. LLM provider SDKs are explicitly out of scope for this
/// crate (spec.md §1) — `chat.send` surfaces this as a normal
/// `ChatEvent::Error` rather than panicking or hanging.
struct UnconfiguredRuntime;

#[async_trait]
impl AgentRuntime for UnconfiguredRuntime {
    async fn chat(
        &self,
        _request: ChatRequest,
        _history: Vec<Message>,
        mut on_chunk: Box<dyn FnMut(ChatEvent) + Send>,
    ) -> anyhow::Result<Usage> {
        on_chunk(ChatEvent::Error(
            "no model provider is configured; implement haya_model::AgentRuntime and wire it into main.rs".into(),
        ));
        Ok(Usage { input_tokens: 0, output_tokens: 0 })
    }
}

/// Initializes the global `tracing` subscriber. `RUST_LOG` always wins when
/// set; otherwise the CLI's `-v`/`-vv` flags override `logging.level` from
/// config (spec.md §6 `logging.level`).
fn init_logging(verbosity: u8, configured_level: LogLevel) {
    let default_directive = match verbosity {
        0 => configured_level.as_filter_directive(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).try_init();
}
