//! Control of the protected proxy core through systemd.
//!
//! The watch loop and `tgctl` only see the [`ServiceController`] trait;
//! [`SystemdController`] is the production implementation. Stop and start
//! are best-effort: callers log failures and carry on.

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Units checked by [`discover`], in priority order.
pub const CANDIDATE_UNITS: [&str; 3] = ["xray.service", "v2ray.service", "3x-ui.service"];

/// Unit used when none of the candidates is installed.
pub const DEFAULT_UNIT: &str = "xray.service";

/// Units belonging to the guard itself.
pub const GUARD_UNITS: [&str; 2] = ["torrent-guard.service", "torrent-guard-log.service"];

/// Errors from a single `systemctl` invocation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// `systemctl` could not be run at all.
    #[error("failed to run systemctl {action}: {source}")]
    Spawn {
        /// Verb passed to systemctl.
        action: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `systemctl` ran but reported failure.
    #[error("systemctl {action} {unit} exited with {code:?}")]
    Failed {
        /// Verb passed to systemctl.
        action: &'static str,
        /// Unit acted upon.
        unit: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
    /// The blocking task running systemctl panicked or was cancelled.
    #[error("systemctl {action} task failed: {source}")]
    Join {
        /// Verb passed to systemctl.
        action: &'static str,
        /// Join error from the runtime.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Start/stop surface of the host's service supervisor.
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Whether `unit` is registered with the supervisor.
    async fn is_installed(&self, unit: &str) -> bool;

    /// Stop `unit`.
    async fn stop(&self, unit: &str) -> Result<(), ServiceError>;

    /// Start `unit`.
    async fn start(&self, unit: &str) -> Result<(), ServiceError>;

    /// Restart `unit`.
    async fn restart(&self, unit: &str) -> Result<(), ServiceError>;
}

/// Resolve the protected unit: the first installed candidate, else [`DEFAULT_UNIT`].
pub async fn discover(controller: &dyn ServiceController) -> String {
    for unit in CANDIDATE_UNITS {
        if controller.is_installed(unit).await {
            info!(unit, "discovered protected service");
            return unit.to_owned();
        }
    }
    info!(unit = DEFAULT_UNIT, "no candidate unit installed, using default");
    DEFAULT_UNIT.to_owned()
}

/// [`ServiceController`] backed by the system `systemctl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdController;

#[async_trait]
impl ServiceController for SystemdController {
    async fn is_installed(&self, unit: &str) -> bool {
        let output = tokio::task::spawn_blocking(|| {
            std::process::Command::new("systemctl")
                .args(["list-unit-files", "--no-legend", "--no-pager"])
                .stderr(std::process::Stdio::null())
                .output()
        })
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                unit_file_listed(&String::from_utf8_lossy(&out.stdout), unit)
            }
            Ok(Ok(out)) => {
                debug!(exit_code = ?out.status.code(), "systemctl list-unit-files returned non-zero");
                false
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to run systemctl list-unit-files");
                false
            }
            Err(e) => {
                warn!(error = %e, "systemctl list-unit-files task panicked");
                false
            }
        }
    }

    async fn stop(&self, unit: &str) -> Result<(), ServiceError> {
        systemctl("stop", unit).await
    }

    async fn start(&self, unit: &str) -> Result<(), ServiceError> {
        systemctl("start", unit).await
    }

    async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
        systemctl("restart", unit).await
    }
}

/// Run `systemctl <action> <unit>`.
async fn systemctl(action: &'static str, unit: &str) -> Result<(), ServiceError> {
    let unit_owned = unit.to_owned();
    debug!(action, unit, "running systemctl");

    let status = tokio::task::spawn_blocking(move || {
        std::process::Command::new("systemctl")
            .args([action, unit_owned.as_str()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
    })
    .await
    .map_err(|source| ServiceError::Join { action, source })?
    .map_err(|source| ServiceError::Spawn { action, source })?;

    if !status.success() {
        return Err(ServiceError::Failed {
            action,
            unit: unit.to_owned(),
            code: status.code(),
        });
    }
    Ok(())
}

/// Whether `systemctl list-unit-files` output has a row for `unit`.
pub fn unit_file_listed(listing: &str, unit: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == unit)
}
