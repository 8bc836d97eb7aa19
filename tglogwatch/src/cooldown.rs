//! Debounce gate between consecutive pauses.

use std::time::Duration;

use tokio::time::Instant;

/// Remembers when the last pause completed and decides whether another
/// one may start.
#[derive(Debug, Clone, Default)]
pub struct CooldownGate {
    last_trigger: Option<Instant>,
}

impl CooldownGate {
    /// A gate that has never triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pause may start at `now` given the configured `cooldown`.
    ///
    /// Always true for a zero cooldown or before the first recorded pause.
    pub fn allow(&self, now: Instant, cooldown: Duration) -> bool {
        if cooldown.is_zero() {
            return true;
        }
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= cooldown,
        }
    }

    /// Record a completed pause. Earlier timestamps never move the gate back.
    pub fn record(&mut self, now: Instant) {
        self.last_trigger = Some(match self.last_trigger {
            Some(last) if last > now => last,
            _ => now,
        });
    }

    /// Completion time of the last pause, if any.
    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }
}
