//! Per-project crash accounting.

use std::time::{Duration, Instant};

/// Crash history of one pooled worker.
///
/// `cooldown_expires_at` is only ever set once `consecutive_crashes` has
/// reached the registry's threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthState {
    /// Crashes since the last success or release.
    pub consecutive_crashes: u32,
    /// End of the current cooldown, if the breaker is open.
    pub cooldown_expires_at: Option<Instant>,
    /// Message of the most recent crash.
    pub last_crash_error: Option<String>,
    /// When the user was last told about the cooldown.
    pub last_notification_at: Option<Instant>,
}

impl HealthState {
    /// Returns `true` when nothing has gone wrong since the last reset.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.consecutive_crashes == 0 && self.cooldown_expires_at.is_none()
    }

    /// Returns the remaining cooldown at `now`, if the breaker is open.
    #[must_use]
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        self.cooldown_expires_at
            .and_then(|expires| expires.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    pub(super) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records a crash; returns `true` if it opened the breaker.
    pub(super) fn record_crash(
        &mut self,
        now: Instant,
        message: String,
        threshold: u32,
        cooldown: Duration,
    ) -> bool {
        self.consecutive_crashes = self.consecutive_crashes.saturating_add(1);
        self.last_crash_error = Some(message);
        if self.consecutive_crashes >= threshold.max(1) && self.cooldown_expires_at.is_none() {
            self.cooldown_expires_at = Some(now + cooldown);
            return true;
        }
        false
    }

    /// Decides whether an unavailability notice at `now` should reach the
    /// user, recording it if so.
    pub(super) fn claim_notification(&mut self, now: Instant, window: Duration) -> bool {
        let due = self
            .last_notification_at
            .is_none_or(|last| now.saturating_duration_since(last) >= window);
        if due {
            self.last_notification_at = Some(now);
        }
        due
    }
}
