//! Display-only session countdown shown on the consent screen.
//!
//! Nothing acts on expiry: the sequencer never leaves a phase because the
//! deadline passed.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use madani_core::config::MAX_SESSION_COUNTDOWN_SECS;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct SessionDeadline {
    /// Wall-clock deadline, for display.
    pub at: DateTime<Utc>,
    expires: Instant,
}

impl SessionDeadline {
    /// Lengths above one day are clamped.
    pub fn start(length: Duration) -> Self {
        let length = length.min(Duration::from_secs(MAX_SESSION_COUNTDOWN_SECS));
        let now = Utc::now();
        let at = TimeDelta::from_std(length)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);
        let started = Instant::now();
        Self {
            at,
            expires: started.checked_add(length).unwrap_or(started),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn label(&self) -> String {
        format_remaining(self.remaining())
    }
}

/// Formats as the consent screen does, e.g. `2 MINUTES 57 SECONDS`.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{} MINUTES {} SECONDS", secs / 60, secs % 60)
}
