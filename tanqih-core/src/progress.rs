//! Progress notifications emitted by the engine
//!
//! Renderers (progress bars, dashboards) implement [`ProgressObserver`]. The
//! durable view of progress is [`crate::state::ProcessingState::progress`].

use crate::corpus::CorpusFile;
use crate::engine::FileOutcome;

/// Receives engine events; all methods default to no-ops
pub trait ProgressObserver: Send + Sync {
    /// Called once per run with the corpus
    fn run_started(&self, _files: &[CorpusFile]) {}

    /// A file is about to be processed from chunk `resume_from`
    ///
    /// `resumed_bytes` counts input bytes covered by chunks already done.
    fn file_started(
        &self,
        _file: &CorpusFile,
        _total_chunks: usize,
        _resume_from: usize,
        _resumed_bytes: u64,
    ) {
    }

    /// A chunk is about to be sent to the cleaning service
    fn chunk_started(&self, _file: &CorpusFile, _index: usize) {}

    /// A chunk was cleaned and recorded; `input_bytes` is its raw size
    fn chunk_finished(&self, _file: &CorpusFile, _index: usize, _input_bytes: usize) {}

    /// A file finished, was skipped, or stopped
    fn file_finished(&self, _file: &CorpusFile, _outcome: &FileOutcome) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}
