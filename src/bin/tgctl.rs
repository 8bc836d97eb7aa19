//! `tgctl`: operator CLI for Torrent Guard.
//!
//! Shows and edits `/etc/torrent-guard.conf`, test-fires one pause against
//! the protected service, and restarts the guard units.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use torrent_guard::config::{
    load_config, set_key, ConfigKey, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
use torrent_guard::pause::run_pause;
use torrent_guard::services::{self, ServiceController, SystemdController, GUARD_UNITS};

/// Torrent Guard control.
#[derive(Parser)]
#[command(name = "tgctl", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Print the current configuration.
    Show {
        /// Print as JSON instead of KEY=value lines.
        #[arg(long)]
        json: bool,
    },
    /// Set a configuration key.
    Set {
        /// Key name, e.g. PAUSE_SEC.
        key: String,
        /// New value.
        value: String,
    },
    /// Turn a feature on.
    Enable {
        /// Feature to enable.
        feature: Feature,
    },
    /// Turn a feature off.
    Disable {
        /// Feature to disable.
        feature: Feature,
    },
    /// Report whether a line matches the configured pattern.
    Match {
        /// Log line to test.
        line: String,
    },
    /// Simulate one pause of the protected service.
    TestFire {
        /// Pause length; defaults to PAUSE_SEC.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Restart the guard's own units.
    Restart,
}

/// Toggleable features.
#[derive(Clone, Copy, ValueEnum)]
enum Feature {
    /// The access-log watcher.
    Logwatch,
    /// The iptables detector.
    Iptables,
}

impl Feature {
    fn key(self) -> ConfigKey {
        match self {
            Self::Logwatch => ConfigKey::EnableLogwatch,
            Self::Iptables => ConfigKey::EnableIptables,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    torrent_guard::logging::init_cli();
    let cli = Cli::parse();

    match cli.command {
        Command::Show { json } => handle_show(&cli.config, json),
        Command::Set { key, value } => handle_set(&cli.config, &key.to_ascii_uppercase(), &value),
        Command::Enable { feature } => handle_set(&cli.config, feature.key().as_str(), "1"),
        Command::Disable { feature } => handle_set(&cli.config, feature.key().as_str(), "0"),
        Command::Match { line } => handle_match(&cli.config, &line),
        Command::TestFire { seconds } => handle_test_fire(&cli.config, seconds).await,
        Command::Restart => handle_restart().await,
    }
}

fn handle_show(path: &std::path::Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(path);
    if json {
        let out =
            serde_json::to_string_pretty(&config).context("failed to serialize config")?;
        println!("{out}");
    } else {
        println!("Current config ({}):", path.display());
        for line in config.render().lines() {
            println!("  {line}");
        }
        if config.log_regex.is_none() {
            println!("  (LOG_REGEX does not compile; log watching is idle)");
        }
    }
    Ok(())
}

fn handle_set(path: &std::path::Path, key: &str, value: &str) -> anyhow::Result<()> {
    let written = set_key(path, key, value).with_context(|| format!("failed to set {key}"))?;
    info!(line = %written, path = %path.display(), "config updated");
    println!("{written}");
    Ok(())
}

fn handle_match(path: &std::path::Path, line: &str) -> anyhow::Result<()> {
    let config = load_config(path);
    let matcher = config
        .log_regex
        .with_context(|| format!("LOG_REGEX {:?} does not compile", config.log_regex_raw))?;
    if matcher.matches(line) {
        println!("match");
    } else {
        println!("no match");
    }
    Ok(())
}

async fn handle_test_fire(path: &std::path::Path, seconds: Option<u64>) -> anyhow::Result<()> {
    let config = load_config(path);
    let duration = seconds
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.pause_duration());

    let controller = SystemdController;
    let unit = services::discover(&controller).await;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let record = run_pause(&controller, &unit, duration, &shutdown).await;
    let out = serde_json::to_string_pretty(&record).context("failed to serialize pause record")?;
    println!("{out}");
    Ok(())
}

async fn handle_restart() -> anyhow::Result<()> {
    let controller = SystemdController;
    let mut failed = 0_usize;
    for unit in GUARD_UNITS {
        match controller.restart(unit).await {
            Ok(()) => info!(unit, "restarted"),
            Err(e) => {
                warn!(unit, error = %e, "restart failed");
                failed = failed.saturating_add(1);
            }
        }
    }
    anyhow::ensure!(failed == 0, "{failed} unit(s) failed to restart");
    Ok(())
}
