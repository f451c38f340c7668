//! Per-client counting window.

use std::time::{Duration, Instant};

/// A fixed counting window for one client identity.
///
/// The window opens on the first observed request and stays open until
/// `reset_at`. A request arriving strictly after `reset_at` starts a fresh
/// window instead of counting against the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    /// Requests counted in the current window, including denied ones
    count: u64,
    /// When the current window expires
    reset_at: Instant,
}

impl ClientWindow {
    /// Open a new window at `now` with the first request already counted.
    pub fn open(now: Instant, duration: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + duration,
        }
    }

    /// Whether the window has fully elapsed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }

    /// Restart the window at `now`, counting the triggering request.
    pub fn reset(&mut self, now: Instant, duration: Duration) {
        *self = Self::open(now, duration);
    }

    /// Count one more request and return the new total.
    ///
    /// Saturates rather than wrapping for identities that never back off.
    pub fn record(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the instant at which this window expires.
    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    /// Whole seconds until the window resets, rounded up and never zero.
    pub fn retry_after_secs(&self, now: Instant) -> u64 {
        let remaining = self.reset_at.saturating_duration_since(now);
        let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
        millis.div_ceil(1000).max(1)
    }
}
