//! Reconnect delay schedule.
//!
//! Delays double from the initial value up to the ceiling, with up to 20%
//! shaved off at random so clients dropped together do not reconnect in lockstep.

use std::time::Duration;

/// Fraction of each delay that may be removed at random.
pub const JITTER_FACTOR: f64 = 0.2;

/// Exponential delay for `attempt` (0-based), capped at `max`.
pub fn base_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let initial_ms = initial.as_millis() as u64;
    let exponential = initial_ms.saturating_mul(1u64 << attempt.min(31));
    Duration::from_millis(exponential.min(max.as_millis() as u64))
}

/// Apply jitter to a delay. `random` must lie in `[0.0, 1.0)`.
pub fn with_jitter(delay: Duration, random: f64) -> Duration {
    let factor = 1.0 - JITTER_FACTOR * random.clamp(0.0, 1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Stateful backoff tracking consecutive failures.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// New schedule starting at `initial`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = base_delay(self.attempt, self.initial, self.max);
        self.attempt = self.attempt.saturating_add(1);
        with_jitter(delay, rand::random::<f64>())
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
