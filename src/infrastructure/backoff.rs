use std::time::Duration;

use crate::types::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY, DEFAULT_RECONNECT_MAX_DELAY,
    DEFAULT_RECONNECT_MULTIPLIER,
};

/// Exponential backoff parameters for reconnection.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY,
            multiplier: DEFAULT_RECONNECT_MULTIPLIER,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Owns the retry-attempt counter and computes backoff delays.
///
/// `delay_for(n) = min(max_delay, base_delay * multiplier^n)`, zero-indexed.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    policy: BackoffPolicy,
    attempts: u32,
}

impl ReconnectSchedule {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay for the zero-indexed attempt `n`.
    pub fn delay_for(&self, n: u32) -> Duration {
        let raw = self.policy.base_delay_ms as f64 * self.policy.multiplier.powi(n as i32);
        let capped = raw.min(self.policy.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Claim the next attempt. Returns its delay, or `None` once the
    /// configured attempt budget is exhausted.
    pub fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Attempts claimed since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Reset the counter. Called on every entry into Connected and on manual
    /// reconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_formula_defaults() {
        let schedule = ReconnectSchedule::default();
        assert_eq!(schedule.delay_for(0), Duration::from_millis(1000));
        assert_eq!(schedule.delay_for(1), Duration::from_millis(1500));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(2250));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(3375));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let schedule = ReconnectSchedule::new(BackoffPolicy {
            base_delay_ms: 1000,
            multiplier: 10.0,
            max_delay_ms: 30_000,
            max_attempts: 10,
        });
        assert_eq!(schedule.delay_for(0), Duration::from_millis(1000));
        assert_eq!(schedule.delay_for(1), Duration::from_millis(10_000));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(30_000));
        assert_eq!(schedule.delay_for(9), Duration::from_millis(30_000));
    }

    #[test]
    fn test_exact_sequence_matches_formula() {
        let policy = BackoffPolicy {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 5,
        };
        let mut schedule = ReconnectSchedule::new(policy);
        for n in 0..policy.max_attempts {
            let expected = (100.0 * 2.0_f64.powi(n as i32)).min(30_000.0) as u64;
            assert_eq!(schedule.next(), Some(Duration::from_millis(expected)));
        }
        assert_eq!(schedule.next(), None);
        assert!(schedule.exhausted());
    }

    #[test]
    fn test_reset_restores_base_delay() {
        let mut schedule = ReconnectSchedule::default();
        schedule.next();
        schedule.next();
        assert_eq!(schedule.attempts(), 2);

        schedule.reset();
        assert_eq!(schedule.attempts(), 0);
        assert_eq!(schedule.next(), Some(Duration::from_millis(1000)));
    }
}
