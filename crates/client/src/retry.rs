//! Reconnection scheduling policies.
//!
//! The reconnect supervisor asks its policy for the delay before each
//! attempt. Policies are stateful; `reset` is called after a successful
//! reconnect so a later outage starts the schedule from the beginning.

use std::time::Duration;

// Reconnection constants (kept here so the supervisor and tests stay in sync)
const RECONNECT_INTERVAL_MS: u64 = 2_000;
const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 30_000;
const MAX_BACKOFF_ATTEMPTS: u32 = 10;
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Strategy deciding when (and whether) the next reconnect attempt happens.
pub trait RetryPolicy: Send + 'static {
    /// Delay to wait before the next attempt, or `None` to give up.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Restart the schedule after a successful connection.
    fn reset(&mut self);
}

/// Retry forever at a fixed interval. The default policy.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(Duration::from_millis(RECONNECT_INTERVAL_MS))
    }
}

impl RetryPolicy for FixedInterval {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.interval)
    }

    fn reset(&mut self) {}
}

/// Exponential backoff with a cap and a bounded number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    attempts: u32,
    delay_ms: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay_ms: INITIAL_BACKOFF_MS,
        }
    }
}

impl ExponentialBackoff {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_BACKOFF_ATTEMPTS
    }
}

impl RetryPolicy for ExponentialBackoff {
    /// Advance to the next attempt, updating the delay for the subsequent one.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let current_delay = self.delay_ms;
        self.attempts += 1;
        self.delay_ms =
            ((self.delay_ms as f64) * BACKOFF_MULTIPLIER).min(MAX_BACKOFF_MS as f64) as u64;
        Some(Duration::from_millis(current_delay))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_never_gives_up() {
        let mut policy = FixedInterval::default();
        for _ in 0..100 {
            assert_eq!(
                policy.next_delay(),
                Some(Duration::from_millis(RECONNECT_INTERVAL_MS))
            );
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let mut policy = ExponentialBackoff::default();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(4_000)));
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn backoff_exhausts_after_max_attempts() {
        let mut policy = ExponentialBackoff::default();
        let mut delays = 0;
        while policy.next_delay().is_some() {
            delays += 1;
        }
        assert_eq!(delays, 10);
        assert!(policy.is_exhausted());

        policy.reset();
        assert!(!policy.is_exhausted());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1_000)));
    }
}
