//! Reconnection delay policy.
//!
//! Delays grow as `base * 2^retry` up to `cap`, and the retry counter wraps
//! back to zero after `max_retry`, so a feed that never recovers cycles
//! through the same short sequence instead of settling on the cap forever.

use std::time::Duration;

/// Parameters of the reconnect delay sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay of the first retry, in `unit`s.
    pub base: u32,
    /// Upper bound of any single delay, in `unit`s.
    pub cap: u32,
    /// Highest retry index before the counter wraps to zero.
    pub max_retry: u32,
    /// Length of one delay step.
    pub unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: 2,
            cap: 30,
            max_retry: 5,
            unit: Duration::from_secs(1),
        }
    }
}

/// Tracks the retry counter of one connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    retry: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, retry: 0 }
    }

    /// Delay before the next attempt; advances the retry counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.retry).unwrap_or(u32::MAX);
        let steps = self.policy.base.saturating_mul(factor).min(self.policy.cap);

        self.retry += 1;
        if self.retry > self.policy.max_retry {
            self.retry = 0;
        }

        self.policy.unit * steps
    }

    /// Restart the sequence from `base`.
    pub fn reset(&mut self) {
        self.retry = 0;
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
