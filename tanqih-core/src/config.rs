//! Configuration types for the engine

use crate::error::{EngineError, Result};
use std::time::Duration;

/// Chunking policy for corpus files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Upper bound on chunk length, in chars
    pub max_chunk_chars: usize,
    /// Share of the chunk (percent) searched backwards for a clean cut
    pub lookback_percent: u8,
}

impl ChunkPolicy {
    /// Policy with the default lookback window
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            ..Self::default()
        }
    }

    /// Number of trailing chars inspected when looking for a boundary
    pub fn lookback_chars(&self) -> usize {
        (self.max_chunk_chars.saturating_mul(self.lookback_percent as usize) / 100).max(1)
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy {
            max_chunk_chars: 15_000,
            lookback_percent: 10,
        }
    }
}

/// Bounded exponential backoff for transient service errors
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of calls per chunk, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Apply ±10% jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How input text is split
    pub chunk_policy: ChunkPolicy,
    /// Retry behaviour of the cleaning client
    pub retry: RetryPolicy,
    /// Timeout handed to every service call
    pub call_timeout: Duration,
    /// Appended after every cleaned chunk in the output
    pub chunk_separator: String,
    /// Number of files processed concurrently
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_policy: ChunkPolicy::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(120),
            chunk_separator: "\n".to_string(),
            workers: 1,
        }
    }
}

impl EngineConfig {
    /// Check that the configuration can drive a run
    pub fn validate(&self) -> Result<()> {
        if self.chunk_policy.max_chunk_chars == 0 {
            return Err(EngineError::ConfigError(
                "max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if self.chunk_policy.lookback_percent > 100 {
            return Err(EngineError::ConfigError(format!(
                "lookback_percent must be at most 100, got {}",
                self.chunk_policy.lookback_percent
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(EngineError::ConfigError(
                "max_delay must not be shorter than base_delay".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(EngineError::ConfigError(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(EngineError::ConfigError(
                "call timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum chunk size in chars
    pub fn max_chunk_chars(mut self, chars: usize) -> Self {
        self.config.chunk_policy.max_chunk_chars = chars;
        self
    }

    /// Set the boundary lookback window in percent of the chunk size
    pub fn lookback_percent(mut self, percent: u8) -> Self {
        self.config.chunk_policy.lookback_percent = percent;
        self
    }

    /// Replace the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set the separator written after each cleaned chunk
    pub fn chunk_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.config.chunk_separator = separator.into();
        self
    }

    /// Set the number of concurrent file workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
