//! Per-node retry policies
//!
//! Transient node failures are retried with exponential backoff before a
//! run gives up and reports a failed step. Jitter is on by default so
//! parallel runs hitting the same flaky dependency do not retry in
//! lockstep.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy attached to a node
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. `1` means no retries.
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds
    pub initial_interval: f64,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
    /// Upper bound on any single delay, in seconds
    pub max_interval: f64,
    /// Randomize each delay to 50-150% of its computed value
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts_made` failures
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.initial_interval * self.backoff_factor.powi(retry as i32);
        let capped = base.min(self.max_interval);
        let seconds = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            capped
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_without_jitter() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_jitter(false);
        assert_eq!(policy.delay(0), Duration::from_secs_f64(1.0));
        assert_eq!(policy.delay(1), Duration::from_secs_f64(2.0));
        assert_eq!(policy.delay(2), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn delay_is_capped_at_max_interval() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(1.0)
            .with_backoff_factor(10.0)
            .with_max_interval(5.0)
            .with_jitter(false);
        assert_eq!(policy.delay(6), Duration::from_secs_f64(5.0));
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let policy = RetryPolicy::new(3).with_initial_interval(2.0);
        for _ in 0..50 {
            let d = policy.delay(0).as_secs_f64();
            assert!((1.0..3.0).contains(&d), "jittered delay out of range: {d}");
        }
    }

    #[test]
    fn max_attempts_counts_the_first_try() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        let none = RetryPolicy::new(1);
        assert!(!none.should_retry(1));
    }
}
