//! Cleaning client: one service call per chunk, with bounded retries

use crate::config::RetryPolicy;
use crate::error::ServiceError;
use crate::retry::{RetryMachine, RetryState};
use crate::service::{CleanRequest, CleaningService};
use std::time::{Duration, Instant};

/// How the client waits between attempts
pub trait Sleeper: Send + Sync {
    /// Block the current worker for `duration`
    fn sleep(&self, duration: Duration);
}

/// Blocks the thread with [`std::thread::sleep`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Wraps a [`CleaningService`] with timeout and retry handling
pub struct CleaningClient<S> {
    service: S,
    retry: RetryPolicy,
    timeout: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl<S: CleaningService> CleaningClient<S> {
    /// Create a client that sleeps the calling thread between retries
    pub fn new(service: S, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            service,
            retry,
            timeout,
            sleeper: Box::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// The wrapped service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Clean one chunk, retrying transient failures
    pub fn clean(&self, text: &str) -> Result<String, ServiceError> {
        let request = CleanRequest {
            text,
            timeout: self.timeout,
        };
        let mut machine = RetryMachine::new(self.retry.clone());

        loop {
            match machine.state() {
                RetryState::Attempting(attempt) => match self.service.clean(&request) {
                    Ok(cleaned) => return Ok(cleaned),
                    Err(err) => {
                        log::warn!(
                            "{} attempt {}/{} failed: {}",
                            self.service.name(),
                            attempt,
                            self.retry.max_attempts,
                            err
                        );
                        machine.on_failure(err, Instant::now());
                    }
                },
                RetryState::Waiting { until, .. } => {
                    let now = Instant::now();
                    self.sleeper.sleep(until.saturating_duration_since(now));
                    // The sleeper may return early (tests); the deadline has
                    // been honoured once it returns.
                    machine.on_wake(until.max(now));
                }
                RetryState::Exhausted => {
                    return Err(machine
                        .into_error()
                        .unwrap_or_else(|| ServiceError::permanent("retries exhausted")));
                }
            }
        }
    }
}
