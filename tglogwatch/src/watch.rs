//! The watch loop: reconcile config, follow the log, pause on signatures.
//!
//! The loop is an explicit state machine driven by `Transition`:
//!
//! ```text
//!            ┌──────────── Idle (disabled / bad pattern / open failed) ◄─┐
//!            ▼                                                          │
//!        Reconcile ──► Tailing ──(match, gate open)──► Pausing ─┐       │
//!            ▲            │  ▲                                  │       │
//!            │            │  └──────────────────────────────────┘       │
//!            │            └──(stream ended)─────────────────────────────┘
//!            └──(config changed while tailing)
//! ```
//!
//! Nothing here is fatal. Every failure becomes an idle wait followed by a
//! fresh reconciliation, forever, until the shutdown token fires.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use torrent_guard::config::{ConfigSource, GuardConfig};
use torrent_guard::pattern::PatternMatcher;
use torrent_guard::pause::run_pause;
use torrent_guard::services::{discover, ServiceController};

use crate::cooldown::CooldownGate;
use crate::tail::{LineStream, LogTailSource};

/// Wait after a snapshot whose pattern does not compile.
pub const INVALID_PATTERN_RETRY: Duration = Duration::from_secs(3);

/// Wait after the tail source fails to open.
pub const OPEN_RETRY: Duration = Duration::from_secs(3);

/// Floor for the config recheck period while tailing.
pub const MIN_RECHECK: Duration = Duration::from_secs(1);

/// Why the loop is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// `ENABLE_LOGWATCH` is off.
    Disabled,
    /// `LOG_REGEX` did not compile.
    InvalidPattern,
    /// The tail source could not be opened.
    OpenFailed,
    /// The tail stream ended (rotation, deletion, follower exit).
    TailExited,
}

impl fmt::Display for IdleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "logwatch disabled",
            Self::InvalidPattern => "invalid LOG_REGEX",
            Self::OpenFailed => "tail open failed",
            Self::TailExited => "tail exited",
        })
    }
}

/// What a fresh snapshot asks the loop to do.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Stay idle for `wait`, then reconcile again.
    Idle {
        /// Why nothing is tailed.
        reason: IdleReason,
        /// How long to wait.
        wait: Duration,
    },
    /// Follow `path` and match lines with `matcher`.
    Tail {
        /// Log to follow.
        path: PathBuf,
        /// Compiled signature.
        matcher: PatternMatcher,
    },
}

/// Decide what to do with a freshly loaded snapshot.
pub fn plan(config: &GuardConfig) -> Plan {
    if !config.enable_logwatch {
        return Plan::Idle {
            reason: IdleReason::Disabled,
            wait: config.sleep_duration(),
        };
    }
    match &config.log_regex {
        None => Plan::Idle {
            reason: IdleReason::InvalidPattern,
            wait: INVALID_PATTERN_RETRY,
        },
        Some(matcher) => Plan::Tail {
            path: config.log_path.clone(),
            matcher: matcher.clone(),
        },
    }
}

/// Next step of the state machine.
enum Transition {
    Reconcile,
    Idle { reason: IdleReason, wait: Duration },
    Tailing {
        config: GuardConfig,
        matcher: PatternMatcher,
        lines: LineStream,
    },
    Stop,
}

/// Owns the cooldown gate and the open tail; the only mutator of both.
pub struct WatchLoop {
    config: Arc<dyn ConfigSource>,
    tail: Arc<dyn LogTailSource>,
    services: Arc<dyn ServiceController>,
    gate: CooldownGate,
    unit: Option<String>,
    pauses: u64,
}

impl WatchLoop {
    /// Create a loop over the given collaborators.
    pub fn new(
        config: Arc<dyn ConfigSource>,
        tail: Arc<dyn LogTailSource>,
        services: Arc<dyn ServiceController>,
    ) -> Self {
        Self {
            config,
            tail,
            services,
            gate: CooldownGate::new(),
            unit: None,
            pauses: 0,
        }
    }

    /// Pin the protected unit instead of discovering it at the first pause.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Number of pauses run so far.
    pub fn pauses(&self) -> u64 {
        self.pauses
    }

    /// Run until `shutdown` fires.
    ///
    /// A pause in progress when `shutdown` fires is cut short, but the
    /// service is started again before this returns.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut next = Transition::Reconcile;
        loop {
            next = match next {
                Transition::Reconcile => self.reconcile().await,
                Transition::Idle { reason, wait } => {
                    info!(%reason, secs = wait.as_secs(), "idle; sleeping");
                    if wait.is_zero() {
                        tokio::task::yield_now().await;
                        if shutdown.is_cancelled() {
                            Transition::Stop
                        } else {
                            Transition::Reconcile
                        }
                    } else {
                        tokio::select! {
                            () = tokio::time::sleep(wait) => Transition::Reconcile,
                            () = shutdown.cancelled() => Transition::Stop,
                        }
                    }
                }
                Transition::Tailing {
                    config,
                    matcher,
                    lines,
                } => self.consume(config, matcher, lines, &shutdown).await,
                Transition::Stop => {
                    info!(pauses = self.pauses, "watch loop stopped");
                    return;
                }
            };
        }
    }

    async fn reconcile(&mut self) -> Transition {
        let config = self.config.load();
        match plan(&config) {
            Plan::Idle { reason, wait } => Transition::Idle { reason, wait },
            Plan::Tail { path, matcher } => match self.tail.open(&path).await {
                Ok(lines) => {
                    info!(path = %path.display(), pattern = matcher.as_str(), "tailing");
                    Transition::Tailing {
                        config,
                        matcher,
                        lines,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot open tail");
                    Transition::Idle {
                        reason: IdleReason::OpenFailed,
                        wait: OPEN_RETRY,
                    }
                }
            },
        }
    }

    /// Consume lines one at a time until the stream ends, the config moves
    /// the tail elsewhere, or shutdown fires. Dropping `lines` on return
    /// closes the follower.
    async fn consume(
        &mut self,
        mut config: GuardConfig,
        matcher: PatternMatcher,
        mut lines: LineStream,
        shutdown: &CancellationToken,
    ) -> Transition {
        let mut period = recheck_period(&config);
        let mut recheck = recheck_interval(period);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Transition::Stop,
                line = lines.next() => {
                    let Some(line) = line else {
                        let wait = config.sleep_duration();
                        info!(secs = wait.as_secs(), "tail exited; restarting");
                        return Transition::Idle {
                            reason: IdleReason::TailExited,
                            wait,
                        };
                    };
                    if matcher.matches(&line) {
                        self.on_match(&config, &line, shutdown).await;
                        if shutdown.is_cancelled() {
                            return Transition::Stop;
                        }
                    }
                }
                _ = recheck.tick() => {
                    let fresh = self.config.load();
                    if config.tail_changed(&fresh) {
                        info!("config changed; re-opening tail");
                        return Transition::Reconcile;
                    }
                    let fresh_period = recheck_period(&fresh);
                    if fresh_period != period {
                        debug!(secs = fresh_period.as_secs(), "recheck period changed");
                        period = fresh_period;
                        recheck = recheck_interval(period);
                    }
                    config = fresh;
                }
            }
        }
    }

    async fn on_match(&mut self, config: &GuardConfig, line: &str, shutdown: &CancellationToken) {
        if !self.gate.allow(Instant::now(), config.cooldown_duration()) {
            info!(cooldown_secs = config.cooldown_secs, "match but in cooldown; ignored");
            return;
        }
        debug!(line, "signature matched");

        let unit = self.protected_unit().await;
        let record = run_pause(
            self.services.as_ref(),
            &unit,
            config.pause_duration(),
            shutdown,
        )
        .await;

        self.gate.record(Instant::now());
        self.pauses = self.pauses.saturating_add(1);
        info!(
            unit = %record.unit,
            started_at = %record.started_at,
            stopped = record.stopped,
            started = record.started,
            interrupted = record.interrupted,
            "pause complete"
        );
    }

    async fn protected_unit(&mut self) -> String {
        if let Some(unit) = &self.unit {
            return unit.clone();
        }
        let unit = discover(self.services.as_ref()).await;
        self.unit = Some(unit.clone());
        unit
    }
}

fn recheck_period(config: &GuardConfig) -> Duration {
    config.sleep_duration().max(MIN_RECHECK)
}

/// Interval whose first tick is one `period` from now.
fn recheck_interval(period: Duration) -> tokio::time::Interval {
    let first = Instant::now()
        .checked_add(period)
        .unwrap_or_else(Instant::now);
    let mut recheck = tokio::time::interval_at(first, period);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    recheck
}
