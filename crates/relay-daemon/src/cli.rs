use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Scheduled cross-database transfers")]
pub struct Cli {
    /// Config file (default: $RELAY_CONFIG, then ~/.relay/relay.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scheduler until SIGINT/SIGTERM, then drain in-flight runs
    Serve,

    /// Run one integration now and print its outcome
    Run { integration_id: String },

    /// Run every integration of a group in execution order
    RunGroup { group: String },

    /// Manage cron schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Manage database connections
    #[command(subcommand)]
    Connection(ConnectionCommand),

    /// Manage integrations
    #[command(subcommand)]
    Integration(IntegrationCommand),

    /// Print recent run logs, newest first
    Logs {
        #[arg(long)]
        integration: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// Attach a cron expression to an integration
    Add { integration_id: String, cron: String },
    /// Delete a schedule
    Rm { job_id: String },
    List,
    Suspend { job_id: String },
    Resume { job_id: String },
}

#[derive(Subcommand, Debug)]
pub enum ConnectionCommand {
    /// Register a connection. KIND is sqlite, postgres, sqlserver, mysql or oracle.
    /// The connection string may be `env:VAR` to read it from the environment.
    Add {
        name: String,
        kind: String,
        connection_string: String,
    },
    /// List connections with their credentials masked
    List,
    Enable { id: String },
    Disable { id: String },
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum IntegrationCommand {
    /// Create an integration from a JSON definition
    Add { file: PathBuf },
    List,
    /// Delete an integration and its schedules
    Rm { id: String },
}
