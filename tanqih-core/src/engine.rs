//! Processing engine
//!
//! Drives every corpus file through `Pending → Splitting → chunk loop →
//! Completed | PartiallyFailed | Aborted`. The ordering rule that keeps the
//! state store and the output in agreement is: append, sync, then record.

use crate::chunker::{self, Chunk};
use crate::client::CleaningClient;
use crate::config::EngineConfig;
use crate::corpus::{self, CorpusFile};
use crate::error::{EngineError, Result};
use crate::output::OutputFile;
use crate::progress::{NoopObserver, ProgressObserver};
use crate::service::CleaningService;
use crate::state::{
    ChunkStatus, FileProgress, FileRecord, FileStatus, ProcessingState, StateStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cooperative cancellation, checked before every chunk
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop after the in-flight chunk
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelFlag::cancel`] was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one file during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// File key
    pub file: String,
    /// Output path
    pub output_path: PathBuf,
    /// Status after this run
    pub status: FileStatus,
    /// Chunks written so far (all runs)
    pub chunks_done: usize,
    /// Chunks in the file
    pub chunks_total: usize,
    /// Chunk indices that need a re-run
    pub failed_chunks: Vec<usize>,
    /// Failure detail, if any
    pub error: Option<String>,
    /// Words of cleaned text produced in this run
    pub words_cleaned: usize,
    /// Already completed before this run
    pub skipped: bool,
    /// Stopped by cancellation
    pub interrupted: bool,
}

impl FileOutcome {
    /// True if the operator has to run again for this file
    pub fn needs_rerun(&self) -> bool {
        self.status != FileStatus::Completed
    }
}

/// Result of [`ProcessingEngine::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One outcome per input file, in input order
    pub outcomes: Vec<FileOutcome>,
    /// The run was cancelled before finishing
    pub interrupted: bool,
}

impl RunSummary {
    /// Files whose every chunk is done
    pub fn completed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == FileStatus::Completed)
    }

    /// Files with failed chunks
    pub fn partially_failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == FileStatus::PartiallyFailed)
    }

    /// Files stopped by I/O problems
    pub fn aborted(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == FileStatus::Aborted)
    }

    /// Files left pending or in progress (interrupted runs)
    pub fn unfinished(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Pending | FileStatus::InProgress))
    }

    /// Words cleaned during this run
    pub fn words_cleaned(&self) -> usize {
        self.outcomes.iter().map(|o| o.words_cleaned).sum()
    }

    /// True when no file needs another run
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.outcomes.iter().all(|o| !o.needs_rerun())
    }
}

/// Orchestrates chunking, cleaning, output and state updates
pub struct ProcessingEngine<S> {
    config: EngineConfig,
    client: CleaningClient<S>,
    store: Mutex<StateStore>,
    in_flight: Mutex<HashMap<String, usize>>,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelFlag,
}

impl<S: CleaningService> ProcessingEngine<S> {
    /// Create an engine around `service`, resuming from `store`
    pub fn new(config: EngineConfig, service: S, store: StateStore) -> Result<Self> {
        let client = CleaningClient::new(service, config.retry.clone(), config.call_timeout);
        Self::with_client(config, client, store)
    }

    /// Create an engine with a preconfigured client
    pub fn with_client(
        config: EngineConfig,
        client: CleaningClient<S>,
        store: StateStore,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            store: Mutex::new(store),
            in_flight: Mutex::new(HashMap::new()),
            observer: Arc::new(NoopObserver),
            cancel: CancelFlag::new(),
        })
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the run after the in-flight chunk
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Copy of the current processing state
    pub fn snapshot(&self) -> ProcessingState {
        self.store().snapshot()
    }

    /// Per-file progress
    pub fn progress(&self) -> Vec<FileProgress> {
        self.store().progress()
    }

    /// Status of chunk `index` of `file`, including the one being cleaned now
    pub fn chunk_status(&self, file: &str, index: usize) -> ChunkStatus {
        let cleaning = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file)
            == Some(&index);
        if cleaning {
            ChunkStatus::InProgress
        } else {
            self.store().chunk_status(file, index)
        }
    }

    /// Give back the state store
    pub fn into_store(self) -> StateStore {
        self.store
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Process every file, resuming where earlier runs stopped
    ///
    /// Chunk and file failures are reported in the summary; only a broken
    /// worker pool is returned as an error.
    pub fn run(&self, files: &[CorpusFile]) -> Result<RunSummary> {
        self.observer.run_started(files);
        log::info!(
            "processing {} files with {} (max {} chars per chunk)",
            files.len(),
            self.client.service().name(),
            self.config.chunk_policy.max_chunk_chars
        );

        let outcomes = if self.config.workers > 1 && files.len() > 1 {
            self.run_parallel(files)?
        } else {
            files.iter().map(|f| self.process_file(f)).collect()
        };

        let summary = RunSummary {
            interrupted: self.cancel.is_cancelled(),
            outcomes,
        };
        if summary.interrupted {
            log::info!("processing interrupted; progress saved");
        }
        Ok(summary)
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&self, files: &[CorpusFile]) -> Result<Vec<FileOutcome>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| EngineError::ParallelError(e.to_string()))?;
        Ok(pool.install(|| files.par_iter().map(|f| self.process_file(f)).collect()))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(&self, files: &[CorpusFile]) -> Result<Vec<FileOutcome>> {
        log::warn!("built without the parallel feature; processing files one at a time");
        Ok(files.iter().map(|f| self.process_file(f)).collect())
    }

    /// Process one file; failures are folded into the outcome
    pub fn process_file(&self, file: &CorpusFile) -> FileOutcome {
        match self.try_process_file(file) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("{}: aborted: {}", file.key, err);
                let reason = err.to_string();
                if let Err(store_err) = self.store().record_abort(&file.key, &reason) {
                    if !matches!(store_err, EngineError::UnknownFile(_)) {
                        log::error!("{}: could not record abort: {}", file.key, store_err);
                    }
                }
                let mut outcome = self.outcome(file, 0);
                outcome.status = FileStatus::Aborted;
                outcome.error = Some(reason);
                self.observer.file_finished(file, &outcome);
                outcome
            }
        }
    }

    fn try_process_file(&self, file: &CorpusFile) -> Result<FileOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(self.interrupted(file, 0));
        }

        log::debug!("{}: splitting", file.key);
        let text = read_input(&file.path)?;
        let policy = self.config.chunk_policy;
        let total = chunker::split(&text, policy).count();
        let digest = corpus::digest(&text);
        let fresh = || {
            FileRecord::new(
                total,
                file.output_path.clone(),
                policy,
                self.config.chunk_separator.clone(),
                digest.clone(),
            )
        };

        let resume = self.reconcile(file, &digest, total)?;
        let (mut output, next) = match resume {
            Resume::AlreadyDone => {
                log::info!("{}: already completed, skipping", file.key);
                let mut outcome = self.outcome(file, 0);
                outcome.skipped = true;
                self.observer.file_finished(file, &outcome);
                return Ok(outcome);
            }
            Resume::From { next, output_bytes } => {
                match OutputFile::resume(&file.output_path, output_bytes) {
                    Ok(output) => (output, next),
                    Err(EngineError::OutputTruncated {
                        expected, actual, ..
                    }) => {
                        log::warn!(
                            "{}: output has {} bytes but {} were recorded; restarting from chunk 0",
                            file.key,
                            actual,
                            expected
                        );
                        self.store().begin_file(&file.key, fresh())?;
                        (OutputFile::create(&file.output_path)?, 0)
                    }
                    Err(e) => return Err(e),
                }
            }
            Resume::Restart => {
                self.store().begin_file(&file.key, fresh())?;
                (OutputFile::create(&file.output_path)?, 0)
            }
        };

        if next < total {
            self.store().mark_in_progress(&file.key)?;
        }

        let resumed_bytes = chunker::split(&text, policy)
            .take(next)
            .last()
            .map_or(0, |c| c.end as u64);
        self.observer
            .file_started(file, total, next, resumed_bytes);
        if next > 0 {
            log::info!("{}: resuming at chunk {} of {}", file.key, next + 1, total);
        } else {
            log::info!("{}: starting ({} chunks)", file.key, total);
        }

        let mut words = 0;
        for chunk in chunker::split(&text, policy).skip(next) {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupted(file, words));
            }
            match self.clean_chunk(file, &chunk, total, &mut output)? {
                Some(cleaned_words) => words += cleaned_words,
                None => {
                    let outcome = self.outcome(file, words);
                    self.observer.file_finished(file, &outcome);
                    return Ok(outcome);
                }
            }
        }

        let outcome = self.outcome(file, words);
        log::info!(
            "{}: {} ({}/{} chunks)",
            file.key,
            outcome.status.as_str(),
            outcome.chunks_done,
            outcome.chunks_total
        );
        self.observer.file_finished(file, &outcome);
        Ok(outcome)
    }

    /// Clean, append and record one chunk
    ///
    /// Returns the number of cleaned words, or `None` when the chunk failed
    /// and the file has to stop.
    fn clean_chunk(
        &self,
        file: &CorpusFile,
        chunk: &Chunk<'_>,
        total: usize,
        output: &mut OutputFile,
    ) -> Result<Option<usize>> {
        self.set_in_flight(&file.key, Some(chunk.index));
        let result = self.clean_chunk_inner(file, chunk, total, output);
        self.set_in_flight(&file.key, None);
        result
    }

    fn clean_chunk_inner(
        &self,
        file: &CorpusFile,
        chunk: &Chunk<'_>,
        total: usize,
        output: &mut OutputFile,
    ) -> Result<Option<usize>> {
        self.observer.chunk_started(file, chunk.index);
        log::debug!(
            "{}: cleaning chunk {}/{} ({} chars)",
            file.key,
            chunk.index + 1,
            total,
            chunk.char_count
        );

        match self.client.clean(chunk.text) {
            Ok(mut cleaned) => {
                let words = cleaned.split_whitespace().count();
                cleaned.push_str(&self.config.chunk_separator);
                let output_bytes = output.append(&cleaned)?;
                self.store()
                    .record_completion(&file.key, chunk.index, output_bytes)?;
                self.observer
                    .chunk_finished(file, chunk.index, chunk.len());
                Ok(Some(words))
            }
            Err(err) => {
                log::warn!(
                    "{}: chunk {} failed, flagged for re-run: {}",
                    file.key,
                    chunk.index,
                    err
                );
                self.store()
                    .record_failure(&file.key, chunk.index, &err.to_string())?;
                Ok(None)
            }
        }
    }

    /// Decide where `file` continues, given what the store remembers
    fn reconcile(&self, file: &CorpusFile, digest: &str, total: usize) -> Result<Resume> {
        let store = self.store();
        let Some(record) = store.record(&file.key) else {
            return Ok(Resume::Restart);
        };

        let matches = record.total_chunks == total
            && record.same_layout(&self.config.chunk_policy, &self.config.chunk_separator)
            && record.output_path == file.output_path
            && record.input_digest == digest;
        if !matches {
            log::warn!(
                "{}: input or chunk settings changed since the last run; restarting from chunk 0",
                file.key
            );
            return Ok(Resume::Restart);
        }

        if record.status == FileStatus::Completed
            && output_len(&record.output_path) == Some(record.output_bytes)
        {
            return Ok(Resume::AlreadyDone);
        }

        Ok(Resume::From {
            next: record.next_index(),
            output_bytes: record.output_bytes,
        })
    }

    fn store(&self) -> MutexGuard<'_, StateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_in_flight(&self, file: &str, index: Option<usize>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        match index {
            Some(index) => in_flight.insert(file.to_string(), index),
            None => in_flight.remove(file),
        };
    }

    fn interrupted(&self, file: &CorpusFile, words: usize) -> FileOutcome {
        log::info!("{}: stopping on interrupt", file.key);
        let mut outcome = self.outcome(file, words);
        outcome.interrupted = true;
        self.observer.file_finished(file, &outcome);
        outcome
    }

    fn outcome(&self, file: &CorpusFile, words_cleaned: usize) -> FileOutcome {
        let store = self.store();
        match store.record(&file.key) {
            Some(record) => FileOutcome {
                file: file.key.clone(),
                output_path: record.output_path.clone(),
                status: record.status,
                chunks_done: record.chunks_done(),
                chunks_total: record.total_chunks,
                failed_chunks: record.failed_chunks.iter().copied().collect(),
                error: record.last_error.clone(),
                words_cleaned,
                skipped: false,
                interrupted: false,
            },
            None => FileOutcome {
                file: file.key.clone(),
                output_path: file.output_path.clone(),
                status: FileStatus::Pending,
                chunks_done: 0,
                chunks_total: 0,
                failed_chunks: Vec::new(),
                error: None,
                words_cleaned,
                skipped: false,
                interrupted: false,
            },
        }
    }
}

enum Resume {
    AlreadyDone,
    From { next: usize, output_bytes: u64 },
    Restart,
}

fn read_input(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| EngineError::InputRead {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|e| EngineError::InvalidUtf8 {
        path: path.to_path_buf(),
        position: e.utf8_error().valid_up_to(),
    })
}

fn output_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
