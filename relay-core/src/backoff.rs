//! Retry delay schedule for relay delivery.
//!
//! Delays start short and double after each failed attempt until they reach
//! a ceiling, then hold there:
//!
//! ```text
//! 0.5s → 1s → 2s → 4s → 8s → 16s → 32s → 32s → ...
//! ```
//!
//! There is no attempt limit; transient failures are retried forever.

use std::time::Duration;

/// First retry delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Ceiling for the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(32);

/// Exponential backoff state for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a schedule starting at [`INITIAL_BACKOFF`] capped at [`MAX_BACKOFF`].
    pub fn new() -> Self {
        Self::with_bounds(INITIAL_BACKOFF, MAX_BACKOFF)
    }

    /// Create a schedule with custom bounds.
    ///
    /// `initial` is clamped to `max`.
    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            current: initial,
            max,
        }
    }

    /// The delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the current delay and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Restart from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
