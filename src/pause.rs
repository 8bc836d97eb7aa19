//! The stop, wait, start cycle applied to the protected service.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::ServiceController;

/// Outcome of one pause cycle. Lives only as long as the caller keeps it.
#[derive(Debug, Clone, Serialize)]
pub struct PauseRecord {
    /// Unit that was paused.
    pub unit: String,
    /// Wall-clock time the pause began.
    pub started_at: DateTime<Utc>,
    /// Configured length of the pause.
    pub duration: Duration,
    /// Whether the stop command succeeded.
    pub stopped: bool,
    /// Whether the start command succeeded.
    pub started: bool,
    /// Whether the wait was cut short by shutdown.
    pub interrupted: bool,
}

/// Stop `unit`, wait `duration`, then start it again.
///
/// Start is attempted no matter how stop went, and also when `shutdown`
/// fires mid-wait, so the service is never left down by this cycle.
pub async fn run_pause(
    controller: &dyn ServiceController,
    unit: &str,
    duration: Duration,
    shutdown: &CancellationToken,
) -> PauseRecord {
    let started_at = Utc::now();
    info!(unit, secs = duration.as_secs(), "pausing core");

    let stopped = match controller.stop(unit).await {
        Ok(()) => true,
        Err(e) => {
            warn!(unit, error = %e, "stop failed, waiting anyway");
            false
        }
    };

    let interrupted = tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = shutdown.cancelled() => {
            warn!(unit, "shutdown during pause, resuming early");
            true
        }
    };

    info!(unit, "resuming core");
    let started = match controller.start(unit).await {
        Ok(()) => true,
        Err(e) => {
            warn!(unit, error = %e, "start failed");
            false
        }
    };

    PauseRecord {
        unit: unit.to_owned(),
        started_at,
        duration,
        stopped,
        started,
        interrupted,
    }
}
