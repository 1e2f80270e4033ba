//! Per-request retry budget.

use std::time::Duration;

/// Remaining tries and remaining time for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    tries_left: u32,
    time_left: Duration,
}

impl RetryBudget {
    pub fn new(max_tries: u32, total_time: Duration) -> Self {
        Self {
            tries_left: max_tries,
            time_left: total_time,
        }
    }

    /// Charge one finished attempt against the budget.
    pub fn record_attempt(&mut self, elapsed: Duration) {
        self.tries_left = self.tries_left.saturating_sub(1);
        self.time_left = self.time_left.saturating_sub(elapsed);
    }

    /// True while both tries and time remain.
    pub fn can_retry(&self) -> bool {
        self.tries_left > 0 && !self.time_left.is_zero()
    }

    /// Timeout for the next attempt: never longer than the time left.
    ///
    /// A multiplier that does not yield a representable positive duration
    /// (negative, zero, NaN, overflowing) leaves the timeout unscaled.
    pub fn attempt_timeout(&self, request_timeout: Duration, multiplier: f64) -> Duration {
        let timeout = request_timeout.min(self.time_left);
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return timeout;
        }
        Duration::try_from_secs_f64(timeout.as_secs_f64() * multiplier).unwrap_or(timeout)
    }

    pub fn tries_left(&self) -> u32 {
        self.tries_left
    }

    pub fn time_left(&self) -> Duration {
        self.time_left
    }
}
