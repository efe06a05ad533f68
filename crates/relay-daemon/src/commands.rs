use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use relay_core::types::{mask_connection_string, DatabaseKind, NewIntegration, RunOutcome};
use relay_store::{RunLogStore, ScheduledJobStore};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tracing::{error, info, warn};

use crate::cli::{Command, ConnectionCommand, IntegrationCommand, ScheduleCommand};
use crate::App;

pub async fn dispatch(app: &App, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Serve => serve(app).await,
        Command::Run { integration_id } => {
            let outcome = app.scheduler.run_integration(&integration_id).await?;
            flush_notifications(app).await;
            print_json(&outcome)?;
            Ok(exit_code(std::slice::from_ref(&outcome)))
        }
        Command::RunGroup { group } => {
            let outcomes = app.scheduler.run_group(&group).await?;
            flush_notifications(app).await;
            print_json(&outcomes)?;
            Ok(exit_code(&outcomes))
        }
        Command::Schedule(cmd) => schedule(app, cmd).map(|()| ExitCode::SUCCESS),
        Command::Connection(cmd) => connection(app, cmd).map(|()| ExitCode::SUCCESS),
        Command::Integration(cmd) => integration(app, cmd).map(|()| ExitCode::SUCCESS),
        Command::Logs { integration, limit } => {
            let logs = match integration {
                Some(id) => {
                    let mut all = app.logs.get_by_integration_id(&id)?;
                    all.truncate(limit);
                    all
                }
                None => app.logs.get_recent(limit)?,
            };
            print_json(&logs)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run the cron clock until a shutdown signal, then drain.
async fn serve(app: &App) -> anyhow::Result<ExitCode> {
    let report = app.scheduler.start()?;
    info!(
        scheduled = report.scheduled,
        discarded = report.discarded,
        invalid = report.invalid,
        dangling = report.dangling,
        "scheduler started"
    );

    let resync_secs = app.config.scheduler.reconcile_interval_secs;
    let mut resync = tokio::time::interval(Duration::from_secs(resync_secs.max(1)));
    resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick completes immediately; start() has just reconciled
    resync.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = resync.tick(), if resync_secs > 0 => {
                match app.scheduler.reconcile() {
                    Ok(r) if r.discarded + r.invalid + r.dangling > 0 => {
                        info!(scheduled = r.scheduled, discarded = r.discarded, "schedules resynced");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "schedule resync failed"),
                }
            }
        }
    }

    let timeout = Duration::from_secs(app.config.scheduler.shutdown_timeout_secs);
    let drain = app.scheduler.shutdown(timeout).await;
    if drain.timed_out {
        warn!(in_flight = drain.in_flight, "drain timed out; in-flight runs were cancelled");
    } else {
        info!(in_flight = drain.in_flight, "scheduler drained");
    }
    flush_notifications(app).await;
    Ok(ExitCode::SUCCESS)
}

/// Give notifiers of finished runs a bounded chance to deliver before exit.
async fn flush_notifications(app: &App) {
    let timeout = Duration::from_secs(app.config.scheduler.shutdown_timeout_secs);
    app.engine.flush_notifications(timeout).await;
}

fn schedule(app: &App, cmd: ScheduleCommand) -> anyhow::Result<()> {
    match cmd {
        ScheduleCommand::Add { integration_id, cron } => {
            let job = app.scheduler.create_schedule(&integration_id, &cron)?;
            print_json(&job)
        }
        ScheduleCommand::Rm { job_id } => {
            let deleted = app.scheduler.delete_schedule(&job_id)?;
            print_json(&json!({ "id": job_id, "deleted": deleted }))
        }
        ScheduleCommand::List => print_json(&app.jobs.list()?),
        ScheduleCommand::Suspend { job_id } => {
            app.scheduler.suspend_schedule(&job_id)?;
            print_json(&app.jobs.get_by_id(&job_id)?)
        }
        ScheduleCommand::Resume { job_id } => {
            app.scheduler.resume_schedule(&job_id)?;
            print_json(&app.jobs.get_by_id(&job_id)?)
        }
    }
}

fn connection(app: &App, cmd: ConnectionCommand) -> anyhow::Result<()> {
    match cmd {
        ConnectionCommand::Add {
            name,
            kind,
            connection_string,
        } => {
            let kind: DatabaseKind = match kind.parse() {
                Ok(k) => k,
                Err(e) => bail!(e),
            };
            let conn = app.connections.create(&name, kind, &connection_string)?;
            print_json(&masked(&conn))
        }
        ConnectionCommand::List => {
            let all: Vec<_> = app.connections.list()?.iter().map(masked).collect();
            print_json(&all)
        }
        ConnectionCommand::Enable { id } => app.connections.set_active(&id, true).map_err(Into::into),
        ConnectionCommand::Disable { id } => app.connections.set_active(&id, false).map_err(Into::into),
        ConnectionCommand::Rm { id } => app.connections.delete(&id).map_err(Into::into),
    }
}

fn integration(app: &App, cmd: IntegrationCommand) -> anyhow::Result<()> {
    match cmd {
        IntegrationCommand::Add { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let new: NewIntegration = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            print_json(&app.integrations.create(new)?)
        }
        IntegrationCommand::List => print_json(&app.integrations.list()?),
        IntegrationCommand::Rm { id } => app.scheduler.delete_integration(&id).map_err(Into::into),
    }
}

fn masked(conn: &relay_core::types::Connection) -> serde_json::Value {
    json!({
        "id": conn.id,
        "name": conn.name,
        "kind": conn.kind,
        "connection_string": mask_connection_string(&conn.connection_string),
        "is_active": conn.is_active,
        "created_at": conn.created_at,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(outcomes: &[RunOutcome]) -> ExitCode {
    if outcomes.iter().all(|o| o.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, draining"),
        _ = terminate => info!("received SIGTERM, draining"),
    }
}
