//! Retry state machine for cleaning calls
//!
//! The machine only decides *what* happens next; waiting is left to the
//! driver, so it works the same with blocking sleeps, timers or a scheduler.

use crate::config::RetryPolicy;
use crate::error::ServiceError;
use rand::Rng;
use std::time::{Duration, Instant};

/// Where a chunk's cleaning attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to make call number `n` (1-based)
    Attempting(u32),
    /// Backing off before call number `attempt`
    Waiting {
        /// The attempt that follows the wait
        attempt: u32,
        /// Earliest instant the attempt may start
        until: Instant,
    },
    /// No further calls will be made
    Exhausted,
}

/// Drives [`RetryState`] transitions for one chunk
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    last_error: Option<ServiceError>,
}

impl RetryMachine {
    /// Start in `Attempting(1)`
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting(1),
            last_error: None,
        }
    }

    /// Current state
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// The error that caused the latest transition, if any
    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    /// Consume the machine, returning the final error
    pub fn into_error(self) -> Option<ServiceError> {
        self.last_error
    }

    /// Record a failed call made in `Attempting(n)`
    ///
    /// Permanent errors and the final allowed attempt go straight to
    /// `Exhausted`; otherwise the machine waits for the backoff delay.
    pub fn on_failure(&mut self, error: ServiceError, now: Instant) -> RetryState {
        let attempt = match self.state {
            RetryState::Attempting(n) => n,
            other => {
                log::debug!("failure reported in state {other:?}; ignoring");
                return other;
            }
        };

        self.state = if !error.is_transient() || attempt >= self.policy.max_attempts {
            RetryState::Exhausted
        } else {
            RetryState::Waiting {
                attempt: attempt + 1,
                until: now + backoff_delay(&self.policy, attempt),
            }
        };
        self.last_error = Some(error);
        self.state
    }

    /// Leave `Waiting` once its deadline has passed
    pub fn on_wake(&mut self, now: Instant) -> RetryState {
        if let RetryState::Waiting { attempt, until } = self.state {
            if now >= until {
                self.state = RetryState::Attempting(attempt);
            }
        }
        self.state
    }
}

/// Delay after the `attempt`-th failed call: `base * 2^(attempt-1)`, capped
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(policy.max_delay);

    if !policy.jitter || delay.is_zero() {
        return delay;
    }

    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    delay.mul_f64(factor).clamp(policy.base_delay, policy.max_delay)
}
