//! Bounded exponential backoff.
//!
//! Doubles the wait after every failed attempt (1 s → 2 s → 4 s … capped)
//! and refuses further attempts once the policy's budget is spent, so no
//! caller can end up in an unbounded retry loop.

use crate::config::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    next_delay_ms: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next_delay_ms: policy.initial_backoff_ms,
        }
    }

    /// Record a failed attempt.  Returns the delay to wait before the next
    /// attempt, or `None` when the attempt budget is exhausted.
    pub fn on_failure(&mut self) -> Option<u32> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.next_delay_ms;
        self.next_delay_ms = self
            .next_delay_ms
            .saturating_mul(2)
            .min(self.policy.max_backoff_ms);
        Some(delay)
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
