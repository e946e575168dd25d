//! Incident orchestrator CLI: the main entry point.
//!
//! Commands:
//! - `run`: Poll the incident queue and process new incidents
//! - `process`: Process a single incident by sys_id
//! - `init`: Write a default config file
//! - `doctor`: Show the effective configuration and client modes

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "incident-orchestrator",
    about = "Agentic dispatch of ServiceNow incidents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.incident-orchestrator/config.toml)
    #[arg(short, long, global = true, env = "INCIDENT_ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Read incidents from ServiceNow but keep every write in memory and
    /// use the stub order API
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for new incidents until interrupted
    Run,

    /// Process one incident and print its summary
    Process {
        /// The incident's sys_id
        sys_id: String,

        /// Print the full result including every agent run
        #[arg(long)]
        full: bool,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration and client modes
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run => commands::run::run(config_path, cli.dry_run).await?,
        Commands::Process { sys_id, full } => {
            commands::process::run(config_path, cli.dry_run, &sys_id, full).await?
        }
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Doctor => commands::doctor::run(config_path)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
