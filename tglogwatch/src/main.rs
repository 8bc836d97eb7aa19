//! tglogwatch CLI entry point.
//!
//! Provides `start` to run the watch daemon and `check` to print what the
//! daemon would do with the current configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tglogwatch::tail::ProcessTail;
use tglogwatch::watch::{plan, Plan, WatchLoop};
use torrent_guard::config::{
    ConfigSource, FileConfigSource, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
use torrent_guard::services::{self, SystemdController};

/// tglogwatch: pauses the proxy core on torrent signatures in its access log.
#[derive(Parser)]
#[command(name = "tglogwatch", version, about)]
struct Cli {
    /// Configuration file, re-read on every reconciliation.
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the watch daemon until SIGINT or SIGTERM.
    Start {
        /// Also write JSON logs with daily rotation to this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print the current plan and discovered service, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { log_dir } => handle_start(cli.config, log_dir).await,
        Command::Check => handle_check(cli.config).await,
    }
}

/// Run the watch daemon.
async fn handle_start(config_path: PathBuf, log_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let _logging_guard = torrent_guard::logging::init_daemon(log_dir.as_deref(), "tglogwatch.log")?;

    let source = Arc::new(FileConfigSource::new(config_path));
    info!(config = %source.path().display(), "tglogwatch started");

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let mut watch = WatchLoop::new(source, Arc::new(ProcessTail), Arc::new(SystemdController));
    watch.run(shutdown).await;
    Ok(())
}

/// Print the plan for the current snapshot.
async fn handle_check(config_path: PathBuf) -> anyhow::Result<()> {
    torrent_guard::logging::init_cli();

    let config = FileConfigSource::new(&config_path).load();
    print!("{}", config.render());

    match plan(&config) {
        Plan::Idle { reason, wait } => {
            println!("plan: idle ({reason}), recheck in {}s", wait.as_secs());
        }
        Plan::Tail { path, matcher } => {
            println!("plan: tail {} matching {}", path.display(), matcher.as_str());
        }
    }

    let unit = services::discover(&SystemdController).await;
    println!("protected service: {unit}");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, using ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("received shutdown signal");
    shutdown.cancel();
}
