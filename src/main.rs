//! Binary entry point for autosnap.
//!
//! Parses arguments, layers configuration (defaults, file, environment,
//! flags), initializes observability and dispatches to [`autosnap::cli`].

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use autosnap::cli::{ConfigCommand, LedgerCommand, Workflow};
use autosnap::config::{AutosnapConfig, CONFIG_PATH_ENV};
use autosnap::observability::{self, InitOptions};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Autosnap - tag-driven snapshot creation and pruning for block storage.
#[derive(Parser)]
#[command(name = "autosnap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Report what would be done without creating or deleting anything.
    #[arg(long, global = true)]
    dry_run: bool,

    /// JSON platform-state file to operate on.
    #[arg(long, global = true, value_name = "JSON")]
    platform_state: Option<PathBuf>,

    /// Snapshot ledger database path.
    #[arg(long, global = true, value_name = "PATH")]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Snapshot every volume carrying the backup tag.
    Snapshot,

    /// Delete snapshots whose deletion time has passed.
    Prune,

    /// Snapshot, then prune.
    Run,

    /// Inspect the snapshot ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Ledger subcommands.
#[derive(Subcommand)]
enum LedgerAction {
    /// List the most recent entries.
    List {
        /// Maximum number of entries.
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let mut observability = match observability::init(
        &config,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli.command, &config).await;
    observability.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: &AutosnapConfig) -> autosnap::Result<()> {
    match command {
        Commands::Snapshot => run_workflow(config, Workflow::Snapshot).await,
        Commands::Prune => run_workflow(config, Workflow::Prune).await,
        Commands::Run => run_workflow(config, Workflow::Both).await,
        Commands::Ledger {
            action: LedgerAction::List { limit },
        } => LedgerCommand::list(limit).execute(&config.ledger_path).await,
        Commands::Config { show } => ConfigCommand::new(show).execute(config),
    }
}

async fn run_workflow(config: &AutosnapConfig, workflow: Workflow) -> autosnap::Result<()> {
    autosnap::cli::execute(config, workflow, interrupted())
        .await
        .map(|_| ())
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Loads configuration: file, then `AUTOSNAP_*` variables, then flags.
fn load_config(cli: &Cli) -> autosnap::Result<AutosnapConfig> {
    let config = match cli.config.as_deref() {
        Some(path) => AutosnapConfig::load_from_file(Path::new(path))?,
        None => AutosnapConfig::load_default()?,
    };

    let mut config = config.with_env_overrides();
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(path) = &cli.platform_state {
        config.platform_state = Some(path.clone());
    }
    if let Some(path) = &cli.ledger {
        config.ledger_path.clone_from(path);
    }

    config.validate()?;
    Ok(config)
}
