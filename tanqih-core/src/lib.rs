//! Resumable chunked cleaning of large text corpora
//!
//! This crate splits corpus files into bounded chunks, sends each chunk to a
//! cleaning service with bounded retries, appends the results to per-file
//! outputs, and records progress in a crash-safe state file so an
//! interrupted run picks up at the first chunk not yet written.

#![warn(missing_docs)]

pub mod chunker;
pub mod client;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod output;
pub mod progress;
pub mod retry;
pub mod service;
pub mod state;

// Re-export key types
pub use chunker::{split, Chunk, Chunks};
pub use client::{CleaningClient, Sleeper, ThreadSleeper};
pub use config::{ChunkPolicy, EngineConfig, EngineConfigBuilder, RetryPolicy};
pub use corpus::CorpusFile;
pub use engine::{CancelFlag, FileOutcome, ProcessingEngine, RunSummary};
pub use error::{EngineError, Result, ServiceError, ServiceErrorKind};
pub use progress::{NoopObserver, ProgressObserver};
pub use service::{CleanRequest, CleaningService, EchoService};
pub use state::{
    ChunkStatus, FileProgress, FileRecord, FileStatus, LoadOutcome, ProcessingState, StateStore,
};
