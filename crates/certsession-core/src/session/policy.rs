use std::time::Duration;

use rand::Rng;

/// Keep-alive every 6 hours; sessions last considerably longer than that.
const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Consecutive failures tolerated before the session gives up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Backoff base, doubled for every failure after the first.
const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound of the random jitter added to each backoff.
const DEFAULT_MAX_JITTER_MS: u64 = 100;

/// How long `close` waits for the renewal task to finish.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Timing and escalation knobs for the renewal loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub keepalive_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub max_jitter: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_INTERVAL_SECS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl RenewalPolicy {
    /// Deterministic part of the delay before reconnect attempt `failures`.
    /// The first failure reconnects immediately.
    pub fn backoff(&self, failures: u32) -> Option<Duration> {
        if failures <= 1 {
            return None;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        Some(self.backoff_base.saturating_mul(factor))
    }

    /// Backoff plus jitter in `[0, max_jitter]`
    pub fn backoff_with_jitter(&self, failures: u32) -> Option<Duration> {
        let delay = self.backoff(failures)?;
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        if max_jitter_ms == 0 {
            return Some(delay);
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
        Some(delay + Duration::from_millis(jitter))
    }
}

/// Consecutive keep-alive failure count.
/// Owned by the renewal loop; nothing else reads or writes it.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive: u32,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failure and return the new total
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }

    pub fn is_exhausted(&self, policy: &RenewalPolicy) -> bool {
        self.consecutive >= policy.max_reconnect_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_reference() {
        let policy = RenewalPolicy::default();
        assert_eq!(policy.keepalive_interval, Duration::from_secs(21_600));
        assert_eq!(policy.max_reconnect_attempts, 3);
        assert_eq!(policy.backoff_base, Duration::from_secs(1));
        assert_eq!(policy.max_jitter, Duration::from_millis(100));
        assert_eq!(policy.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_doubles_after_first_failure() {
        let policy = RenewalPolicy::default();
        assert_eq!(policy.backoff(0), None);
        assert_eq!(policy.backoff(1), None);
        assert_eq!(policy.backoff(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.backoff(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.backoff(4), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RenewalPolicy::default();
        assert!(policy.backoff(200).is_some());
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RenewalPolicy::default();
        for _ in 0..100 {
            let delay = policy.backoff_with_jitter(2).unwrap();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_millis(2100));
        }
    }

    #[test]
    fn test_zero_jitter() {
        let policy = RenewalPolicy {
            max_jitter: Duration::ZERO,
            ..RenewalPolicy::default()
        };
        assert_eq!(policy.backoff_with_jitter(3), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_reset_makes_next_failure_first() {
        let policy = RenewalPolicy::default();
        let mut tracker = FailureTracker::new();

        assert_eq!(tracker.record_failure(), 1);
        assert_eq!(policy.backoff(tracker.count()), None);

        // Reconnect succeeded
        tracker.reset();

        let failures = tracker.record_failure();
        assert_eq!(failures, 1);
        assert_eq!(policy.backoff(failures), None);
    }

    #[test]
    fn test_exhaustion_at_max() {
        let policy = RenewalPolicy::default();
        let mut tracker = FailureTracker::new();
        tracker.record_failure();
        tracker.record_failure();
        assert!(!tracker.is_exhausted(&policy));
        tracker.record_failure();
        assert!(tracker.is_exhausted(&policy));
    }
}
