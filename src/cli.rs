//! Command-line interface for specforge
//!
//! A thin `clap`-based binary around the reactor: `run` (long-lived tick
//! loop), `once` (single tick, for scripting and deterministic tests),
//! `status` (print the current `SyncState` as JSON), `init` (scaffold
//! `.specifications/`, an empty queue, and a sync file).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use specforge_config::Config;
use specforge_processor::Reactor;
use specforge_util::{logging, write_json, ExitCode};

/// specforge - file-mediated operation queue processor for a spec manager
#[derive(Parser)]
#[command(name = "specforge")]
#[command(about = "Processes the mcp-operations.json queue against a specification store")]
#[command(version)]
pub struct Cli {
    /// Project root (overrides discovery via SPECFORGE_PROJECT_ROOT / PWD / cwd)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the long-lived tick loop until interrupted
    ///
    /// EXAMPLES:
    ///   specforge run
    ///   specforge run --tick-interval-secs 2 --optimizer-interval-secs 600
    Run {
        /// Seconds between ticks
        #[arg(long, default_value_t = 1)]
        tick_interval_secs: u64,

        /// Seconds between background optimizer passes
        #[arg(long, default_value_t = specforge_processor::optimizer::DEFAULT_INTERVAL_SECS)]
        optimizer_interval_secs: u64,
    },

    /// Run exactly one tick and print the resulting SyncState
    ///
    /// EXAMPLES:
    ///   specforge once
    Once,

    /// Print the current SyncState without running a tick
    ///
    /// EXAMPLES:
    ///   specforge status
    Status,

    /// Scaffold `.specifications/`, an empty queue, and a sync file
    ///
    /// EXAMPLES:
    ///   specforge init
    Init,
}

/// Main CLI execution function.
///
/// Handles ALL output including errors. Returns `Result<(), ExitCode>`:
/// on success, `Ok(())`; on error, prints a message and returns the exit
/// code. `main.rs` only calls `std::process::exit(code.as_i32())`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    logging::init_from_env(cli.verbose);

    let config = Config::resolve(cli.root.as_deref()).map_err(|err| {
        eprintln!("✗ configuration error: {err}");
        ExitCode::OTHER
    })?;

    let rt = tokio::runtime::Runtime::new().map_err(|err| {
        eprintln!("✗ failed to start async runtime: {err}");
        ExitCode::OTHER
    })?;

    match cli.command {
        Commands::Run { tick_interval_secs, optimizer_interval_secs } => {
            rt.block_on(run_command(&config, tick_interval_secs, optimizer_interval_secs))
        }
        Commands::Once => rt.block_on(once_command(&config)),
        Commands::Status => status_command(&config),
        Commands::Init => init_command(&config),
    }
}

async fn run_command(
    config: &Config,
    tick_interval_secs: u64,
    optimizer_interval_secs: u64,
) -> Result<(), ExitCode> {
    let mut reactor = Reactor::new(config).map_err(|err| {
        eprintln!("✗ failed to start reactor: {err}");
        ExitCode::OTHER
    })?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    println!("specforge: processing {}", config.project_root);
    reactor
        .run(
            std::time::Duration::from_secs(tick_interval_secs),
            std::time::Duration::from_secs(optimizer_interval_secs),
            shutdown_rx,
        )
        .await
        .map_err(|err| {
            eprintln!("✗ reactor loop failed: {err}");
            ExitCode::OTHER
        })
}

async fn once_command(config: &Config) -> Result<(), ExitCode> {
    let mut reactor = Reactor::new(config).map_err(|err| {
        eprintln!("✗ failed to start reactor: {err}");
        ExitCode::OTHER
    })?;

    let sync_state = reactor.run_once().await.map_err(|err| {
        eprintln!("✗ tick failed: {err}");
        ExitCode::OTHER
    })?;

    let json = serde_json::to_string_pretty(&sync_state).map_err(|err| {
        eprintln!("✗ failed to serialize sync state: {err}");
        ExitCode::OTHER
    })?;
    println!("{json}");
    Ok(())
}

fn status_command(config: &Config) -> Result<(), ExitCode> {
    let reactor = Reactor::new(config).map_err(|err| {
        eprintln!("✗ failed to load reactor state: {err}");
        ExitCode::OTHER
    })?;

    let sync_state = reactor.current_sync_state().map_err(|err| {
        eprintln!("✗ failed to compute sync state: {err}");
        ExitCode::OTHER
    })?;

    let json = serde_json::to_string_pretty(&sync_state).map_err(|err| {
        eprintln!("✗ failed to serialize sync state: {err}");
        ExitCode::OTHER
    })?;
    println!("{json}");
    Ok(())
}

fn init_command(config: &Config) -> Result<(), ExitCode> {
    std::fs::create_dir_all(config.base_dir.as_std_path()).map_err(|err| {
        eprintln!("✗ failed to create {}: {err}", config.base_dir);
        ExitCode::OTHER
    })?;

    let queue_path = config.project_root.join(specforge_processor::QUEUE_FILE);
    if !queue_path.is_file() {
        write_json(&queue_path, &specforge_queue::OperationQueue::default()).map_err(|err| {
            eprintln!("✗ failed to write {queue_path}: {err}");
            ExitCode::OTHER
        })?;
    }

    let sync_path = config.project_root.join("specforge-sync.json");
    if !sync_path.is_file() {
        let empty = specforge_processor::SyncState::empty(chrono::Utc::now());
        write_json(&sync_path, &empty).map_err(|err| {
            eprintln!("✗ failed to write {sync_path}: {err}");
            ExitCode::OTHER
        })?;
    }

    println!("✓ initialized specforge project at {}", config.project_root);
    println!("  specifications directory: {}", config.base_dir);
    println!("  operation queue: {queue_path}");
    println!("  sync state: {sync_path}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_without_panicking() {
        Cli::command().debug_assert();
    }
}
