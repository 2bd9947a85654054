//! Layered error types
//!
//! Chunk-level service failures are described by [`ServiceError`]; everything
//! that can stop a file (or the whole run) is an [`EngineError`].

use std::path::PathBuf;
use thiserror::Error;

/// Classification of a cleaning service failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Retryable: rate limit, timeout, connection reset, 5xx
    Transient,
    /// Not retryable: invalid request, bad credentials, quota, blocked content
    Permanent,
}

/// Failure reported by a cleaning service call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} service error: {message}")]
pub struct ServiceError {
    /// Whether the call may succeed if repeated
    pub kind: ServiceErrorKind,
    /// Human readable detail
    pub message: String,
}

impl ServiceError {
    /// Create a retryable error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Create a non-retryable error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns true if the failure should be retried
    pub fn is_transient(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Reading an input file failed
    #[error("failed to read input {path}: {source}")]
    InputRead {
        /// Input file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Input file is not valid UTF-8
    #[error("input {path} is not valid UTF-8 (first invalid byte at {position})")]
    InvalidUtf8 {
        /// Input file path
        path: PathBuf,
        /// Byte offset of the first invalid sequence
        position: usize,
    },

    /// Writing or syncing an output file failed
    #[error("output write failed for {path}: {source}")]
    OutputWrite {
        /// Output file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Output file is shorter than the progress recorded for it
    #[error("output {path} holds {actual} bytes but {expected} were recorded")]
    OutputTruncated {
        /// Output file path
        path: PathBuf,
        /// Bytes the state store expects
        expected: u64,
        /// Bytes actually present
        actual: u64,
    },

    /// Persisting the state file failed
    #[error("failed to persist state to {path}: {source}")]
    StatePersist {
        /// State file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Reading the state file failed for a reason other than corruption
    #[error("failed to read state from {path}: {source}")]
    StateRead {
        /// State file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A state transition that would break chunk ordering
    #[error("chunk {index} of {file} recorded out of order (next expected {expected})")]
    OutOfOrder {
        /// File key
        file: String,
        /// Offending chunk index
        index: usize,
        /// Index the store expected next
        expected: usize,
    },

    /// No record exists for the file
    #[error("no progress record for {0}")]
    UnknownFile(String),

    /// Two inputs would write the same output file
    #[error("inputs {first} and {second} both map to output {output}")]
    OutputCollision {
        /// First input key
        first: String,
        /// Second input key
        second: String,
        /// Shared output path
        output: PathBuf,
    },

    /// Configuration error
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Corpus directory problems
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Thread pool construction failed
    #[cfg(feature = "parallel")]
    #[error("parallel execution failed: {0}")]
    ParallelError(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
