//! Restart policy and crash-loop tracking
//!
//! Every crash is restarted. Crashes are counted within a sliding window;
//! once the count reaches the crash-loop threshold the restart is deferred
//! by an exponential backoff instead of happening immediately.
//!
//! The decision depends on the window alone. A ready start clears the
//! consecutive-crash counter, which is reported in logs and status, but
//! crashes already in the window keep counting: a worker that flaps between
//! ready and crashed stays in backoff until the window drains.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Policy for restarting crashed workers
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Time window for counting crashes
    pub window: Duration,
    /// Crashes within the window at which the worker counts as crash-looping
    pub crash_loop_threshold: u32,
    /// Initial deferral once crash-looping
    pub backoff: Duration,
    /// Maximum deferral
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            crash_loop_threshold: 5,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    pub fn new(window: Duration, crash_loop_threshold: u32, backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            window,
            crash_loop_threshold,
            backoff,
            max_backoff,
        }
    }

    /// Restart immediately, always. Useful for tests.
    pub fn immediate() -> Self {
        Self {
            window: Duration::from_secs(60),
            crash_loop_threshold: u32::MAX,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// When a crashed worker should be restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart on this monitor pass
    Now,
    /// Crash-looping; restart once the delay has elapsed
    After(Duration),
}

/// Tracks crash history for a single cluster
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    crash_times: VecDeque<Instant>,
    consecutive_crashes: u32,
    total_restarts: u64,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            crash_times: VecDeque::new(),
            consecutive_crashes: 0,
            total_restarts: 0,
        }
    }

    /// Record a crash observed now
    pub fn record_crash(&mut self) -> RestartDecision {
        self.record_crash_at(Instant::now())
    }

    /// Record a crash observed at `now`
    pub fn record_crash_at(&mut self, now: Instant) -> RestartDecision {
        self.prune(now);
        self.crash_times.push_back(now);
        self.consecutive_crashes = self.consecutive_crashes.saturating_add(1);
        self.total_restarts += 1;

        let recent = self.crash_times.len() as u32;
        if recent < self.policy.crash_loop_threshold {
            return RestartDecision::Now;
        }

        let exponent = (recent - self.policy.crash_loop_threshold).min(16);
        let delay = self.policy.backoff.saturating_mul(2u32.saturating_pow(exponent));
        RestartDecision::After(delay.min(self.policy.max_backoff))
    }

    /// Worker reached readiness again. Clears the consecutive counter only;
    /// the crash window is left as is.
    pub fn reset(&mut self) {
        self.consecutive_crashes = 0;
    }

    /// Crashes within the current window
    pub fn recent_crashes(&self) -> usize {
        self.crash_times.len()
    }

    /// Crashes since the last successful start
    pub fn consecutive_crashes(&self) -> u32 {
        self.consecutive_crashes
    }

    /// Restarts issued over the tracker's lifetime
    pub fn total_restarts(&self) -> u64 {
        self.total_restarts
    }

    pub fn is_crash_looping(&self) -> bool {
        self.crash_times.len() as u32 >= self.policy.crash_loop_threshold
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.crash_times.front() {
            if now.duration_since(*front) > self.policy.window {
                self.crash_times.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy::new(
            Duration::from_secs(10),
            3,
            Duration::from_millis(100),
            Duration::from_millis(350),
        )
    }

    #[test]
    fn test_restarts_immediately_below_threshold() {
        let mut tracker = RestartTracker::new(policy());
        let t0 = Instant::now();
        assert_eq!(tracker.record_crash_at(t0), RestartDecision::Now);
        assert_eq!(tracker.record_crash_at(t0), RestartDecision::Now);
        assert!(!tracker.is_crash_looping());
    }

    #[test]
    fn test_crash_loop_backoff_grows_and_caps() {
        let mut tracker = RestartTracker::new(policy());
        let t0 = Instant::now();
        tracker.record_crash_at(t0);
        tracker.record_crash_at(t0);

        assert_eq!(tracker.record_crash_at(t0), RestartDecision::After(Duration::from_millis(100)));
        assert!(tracker.is_crash_looping());
        assert_eq!(tracker.record_crash_at(t0), RestartDecision::After(Duration::from_millis(200)));
        assert_eq!(tracker.record_crash_at(t0), RestartDecision::After(Duration::from_millis(350)));
        assert_eq!(tracker.total_restarts(), 5);
    }

    #[test]
    fn test_window_expiry() {
        let mut tracker = RestartTracker::new(policy());
        let t0 = Instant::now();
        tracker.record_crash_at(t0);
        tracker.record_crash_at(t0);
        tracker.record_crash_at(t0);
        assert!(tracker.is_crash_looping());

        let later = t0 + Duration::from_secs(11);
        assert_eq!(tracker.record_crash_at(later), RestartDecision::Now);
        assert_eq!(tracker.recent_crashes(), 1);
    }

    #[test]
    fn test_reset_clears_consecutive() {
        let mut tracker = RestartTracker::new(RestartPolicy::default());
        tracker.record_crash();
        tracker.record_crash();
        assert_eq!(tracker.consecutive_crashes(), 2);
        tracker.reset();
        assert_eq!(tracker.consecutive_crashes(), 0);
        assert_eq!(tracker.total_restarts(), 2);
    }

    #[test]
    fn test_reset_keeps_window_backoff() {
        let mut tracker = RestartTracker::new(policy());
        let t0 = Instant::now();
        tracker.record_crash_at(t0);
        tracker.record_crash_at(t0);
        tracker.reset();

        // Third crash inside the window is deferred despite the ready start
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(tracker.record_crash_at(t1), RestartDecision::After(Duration::from_millis(100)));
        assert_eq!(tracker.consecutive_crashes(), 1);
        assert_eq!(tracker.recent_crashes(), 3);
    }

    #[test]
    fn test_immediate_policy_never_defers() {
        let mut tracker = RestartTracker::new(RestartPolicy::immediate());
        for _ in 0..50 {
            assert_eq!(tracker.record_crash(), RestartDecision::Now);
        }
    }
}
