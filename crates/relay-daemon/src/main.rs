use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use relay_core::config::RelayConfig;
use relay_engine::{EnvSecrets, ExecutionEngine, TracingNotifier};
use relay_scheduler::Scheduler;
use relay_store::{db, ConnectionRepo, IntegrationRepo, RunLogRepo, ScheduledJobRepo};
use tracing::info;

mod cli;
mod commands;

use cli::Cli;

/// Everything a command needs, wired once at startup.
pub struct App {
    pub config: RelayConfig,
    pub connections: ConnectionRepo,
    pub integrations: Arc<IntegrationRepo>,
    pub jobs: Arc<ScheduledJobRepo>,
    pub logs: Arc<RunLogRepo>,
    pub engine: Arc<ExecutionEngine>,
    pub scheduler: Scheduler,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_daemon=info,relay_scheduler=info,relay_engine=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > RELAY_CONFIG env > ~/.relay/relay.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("RELAY_CONFIG").ok());
    let config = RelayConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        RelayConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening catalog database");
    let shared = db::open(&db_path)?;

    let integrations = Arc::new(IntegrationRepo::new(shared.clone()));
    let jobs = Arc::new(ScheduledJobRepo::new(shared.clone()));
    let logs = Arc::new(RunLogRepo::new(shared.clone()));

    let engine = Arc::new(
        ExecutionEngine::new(integrations.clone(), logs.clone(), config.engine.clone())
            .with_secrets(Arc::new(EnvSecrets))
            .with_notifier(Arc::new(TracingNotifier)),
    );
    let scheduler = Scheduler::new(
        jobs.clone(),
        integrations.clone(),
        engine.clone(),
        config.scheduler.clone(),
    );

    let app = App {
        config,
        connections: ConnectionRepo::new(shared),
        integrations,
        jobs,
        logs,
        engine,
        scheduler,
    };

    commands::dispatch(&app, cli.command).await
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
