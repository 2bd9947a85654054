//! Durable processing state
//!
//! The whole state is one JSON document. Every update rewrites it through a
//! temporary file in the same directory followed by an atomic rename, so a
//! crash leaves either the old or the new document on disk, never a mix.
//!
//! On load, anything that cannot be trusted is discarded: progress may be
//! lost, but data is never skipped.

use crate::config::ChunkPolicy;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Format version written to disk
pub const STATE_VERSION: u32 = 1;

/// Lifecycle of a file across runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Known but nothing attempted yet
    Pending,
    /// Some chunks may be done; more remain
    InProgress,
    /// Every chunk is done
    Completed,
    /// A chunk failed after retries; re-run to continue
    PartiallyFailed,
    /// Output could not be written or input could not be read
    Aborted,
}

impl FileStatus {
    /// Label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::InProgress => "in_progress",
            FileStatus::Completed => "completed",
            FileStatus::PartiallyFailed => "partially_failed",
            FileStatus::Aborted => "aborted",
        }
    }
}

/// Status of a single chunk as seen by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Not written yet
    Pending,
    /// Being cleaned right now; see `ProcessingEngine::chunk_status`
    InProgress,
    /// Cleaned text is in the output
    Done,
    /// Last attempt failed after retries
    Failed,
}

/// Progress record for one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Number of chunks the file splits into
    pub total_chunks: usize,
    /// Highest chunk index whose output is durably written
    pub last_completed_index: Option<usize>,
    /// Where cleaned text is appended
    pub output_path: PathBuf,
    /// Output length covering chunks `0..=last_completed_index`
    #[serde(default)]
    pub output_bytes: u64,
    /// Chunk size the boundaries were computed with
    pub max_chunk_chars: usize,
    /// Lookback window the boundaries were computed with
    pub lookback_percent: u8,
    /// Separator written after each chunk in the output
    pub chunk_separator: String,
    /// SHA-256 of the input the boundaries were computed from
    pub input_digest: String,
    /// Chunks whose last attempt failed
    #[serde(default)]
    pub failed_chunks: BTreeSet<usize>,
    /// Current file status
    pub status: FileStatus,
    /// Most recent failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl FileRecord {
    /// A record with no chunks done
    pub fn new(
        total_chunks: usize,
        output_path: PathBuf,
        policy: ChunkPolicy,
        chunk_separator: String,
        input_digest: String,
    ) -> Self {
        Self {
            total_chunks,
            last_completed_index: None,
            output_path,
            output_bytes: 0,
            max_chunk_chars: policy.max_chunk_chars,
            lookback_percent: policy.lookback_percent,
            chunk_separator,
            input_digest,
            failed_chunks: BTreeSet::new(),
            status: if total_chunks == 0 {
                FileStatus::Completed
            } else {
                FileStatus::Pending
            },
            last_error: None,
        }
    }

    /// Number of chunks already written
    pub fn chunks_done(&self) -> usize {
        self.last_completed_index.map_or(0, |i| i + 1)
    }

    /// Index of the next chunk to clean
    pub fn next_index(&self) -> usize {
        self.chunks_done()
    }

    /// True when every chunk is written
    pub fn is_finished(&self) -> bool {
        self.chunks_done() == self.total_chunks
    }

    /// True if chunk boundaries and output layout match `policy` and `separator`
    pub fn same_layout(&self, policy: &ChunkPolicy, separator: &str) -> bool {
        self.max_chunk_chars == policy.max_chunk_chars
            && self.lookback_percent == policy.lookback_percent
            && self.chunk_separator == separator
    }

    fn check(&self) -> std::result::Result<(), String> {
        if let Some(last) = self.last_completed_index {
            if last >= self.total_chunks {
                return Err(format!(
                    "last completed index {last} beyond {} chunks",
                    self.total_chunks
                ));
            }
        } else if self.output_bytes != 0 {
            return Err("output bytes recorded without any completed chunk".to_string());
        }
        if self.status == FileStatus::Completed && !self.is_finished() {
            return Err("marked completed with chunks remaining".to_string());
        }
        if let Some(&failed) = self.failed_chunks.iter().next() {
            if failed < self.chunks_done() {
                return Err(format!("chunk {failed} both done and failed"));
            }
        }
        Ok(())
    }
}

/// Read-only progress line for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    /// File key
    pub file: String,
    /// Chunks written
    pub chunks_done: usize,
    /// Chunks in the file
    pub chunks_total: usize,
    /// File status
    pub status: FileStatus,
    /// Chunk indices that need a re-run
    pub failed_chunks: Vec<usize>,
    /// Output path
    pub output_path: PathBuf,
}

/// The full persisted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Format version
    pub version: u32,
    /// Records keyed by file identity
    pub files: BTreeMap<String, FileRecord>,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            files: BTreeMap::new(),
        }
    }
}

impl ProcessingState {
    /// Record for `file`, if any
    pub fn file(&self, file: &str) -> Option<&FileRecord> {
        self.files.get(file)
    }

    /// Per-file progress, ordered by key
    pub fn progress(&self) -> Vec<FileProgress> {
        self.files
            .iter()
            .map(|(key, record)| FileProgress {
                file: key.clone(),
                chunks_done: record.chunks_done(),
                chunks_total: record.total_chunks,
                status: record.status,
                failed_chunks: record.failed_chunks.iter().copied().collect(),
                output_path: record.output_path.clone(),
            })
            .collect()
    }

    /// True if `index` of `file` is written to output
    pub fn is_complete(&self, file: &str, index: usize) -> bool {
        self.file(file)
            .and_then(|r| r.last_completed_index)
            .is_some_and(|last| index <= last)
    }

    /// Status of one chunk
    pub fn chunk_status(&self, file: &str, index: usize) -> ChunkStatus {
        match self.file(file) {
            Some(record) if record.failed_chunks.contains(&index) => ChunkStatus::Failed,
            Some(_) if self.is_complete(file, index) => ChunkStatus::Done,
            _ => ChunkStatus::Pending,
        }
    }
}

/// What `load` found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No state file, or an empty one
    Fresh,
    /// State read as written
    Loaded,
    /// Some records were dropped as inconsistent
    Repaired {
        /// Keys of dropped records
        dropped: Vec<String>,
    },
    /// Unreadable document; moved aside and replaced by an empty state
    Corrupt {
        /// Where the unreadable bytes were kept
        backup: PathBuf,
        /// Parse failure
        reason: String,
    },
}

/// The persisted state plus where it lives
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: ProcessingState,
    outcome: LoadOutcome,
}

impl StateStore {
    /// Load the state file at `path`
    ///
    /// Missing or empty files mean "nothing done yet". Corrupt files are
    /// copied to `<path>.corrupt` and treated as no progress. Only I/O errors
    /// other than "not found" are returned.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(EngineError::StateRead { path, source }),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            log::debug!("no saved progress at {}", path.display());
            return Ok(Self {
                path,
                state: ProcessingState::default(),
                outcome: LoadOutcome::Fresh,
            });
        }

        let parsed = serde_json::from_slice::<ProcessingState>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|state| {
                if state.version == STATE_VERSION {
                    Ok(state)
                } else {
                    Err(format!("unsupported state version {}", state.version))
                }
            });

        match parsed {
            Ok(state) => Ok(Self::repair(path, state)),
            Err(reason) => {
                let backup = backup_path(&path);
                fs::write(&backup, &bytes).map_err(|source| EngineError::StatePersist {
                    path: backup.clone(),
                    source,
                })?;
                log::error!(
                    "state file {} is corrupt ({}); saved a copy to {} and starting with no progress",
                    path.display(),
                    reason,
                    backup.display()
                );
                Ok(Self {
                    path,
                    state: ProcessingState::default(),
                    outcome: LoadOutcome::Corrupt { backup, reason },
                })
            }
        }
    }

    fn repair(path: PathBuf, mut state: ProcessingState) -> Self {
        let mut dropped = Vec::new();
        state.files.retain(|key, record| match record.check() {
            Ok(()) => true,
            Err(reason) => {
                log::warn!("discarding inconsistent progress for {key}: {reason}");
                dropped.push(key.clone());
                false
            }
        });

        let outcome = if dropped.is_empty() {
            LoadOutcome::Loaded
        } else {
            LoadOutcome::Repaired { dropped }
        };
        Self {
            path,
            state,
            outcome,
        }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What `load` found
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Borrow the current state
    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ProcessingState {
        self.state.clone()
    }

    /// Consume the store, returning its state
    pub fn into_state(self) -> ProcessingState {
        self.state
    }

    /// Record for `file`, if any
    pub fn record(&self, file: &str) -> Option<&FileRecord> {
        self.state.file(file)
    }

    /// True if `index` of `file` is written to output
    pub fn is_complete(&self, file: &str, index: usize) -> bool {
        self.state.is_complete(file, index)
    }

    /// Status of one chunk
    pub fn chunk_status(&self, file: &str, index: usize) -> ChunkStatus {
        self.state.chunk_status(file, index)
    }

    /// Per-file progress
    pub fn progress(&self) -> Vec<FileProgress> {
        self.state.progress()
    }

    /// Install a fresh record for `file`, replacing any previous one
    pub fn begin_file(&mut self, file: &str, record: FileRecord) -> Result<()> {
        self.state.files.insert(file.to_string(), record);
        self.persist()
    }

    /// Mark a file as being worked on
    pub fn mark_in_progress(&mut self, file: &str) -> Result<()> {
        let record = self.record_mut(file)?;
        if record.status == FileStatus::InProgress {
            return Ok(());
        }
        record.status = FileStatus::InProgress;
        record.last_error = None;
        self.persist()
    }

    /// Advance `file` past chunk `index`, whose output now ends at `output_bytes`
    ///
    /// Must be called only after the output is durably written.
    pub fn record_completion(&mut self, file: &str, index: usize, output_bytes: u64) -> Result<()> {
        let record = self.record_mut(file)?;
        let expected = record.next_index();
        if index != expected || index >= record.total_chunks {
            return Err(EngineError::OutOfOrder {
                file: file.to_string(),
                index,
                expected,
            });
        }

        record.last_completed_index = Some(index);
        record.output_bytes = output_bytes;
        record.failed_chunks.remove(&index);
        if record.is_finished() {
            record.status = FileStatus::Completed;
            record.last_error = None;
        } else {
            record.status = FileStatus::InProgress;
        }
        self.persist()
    }

    /// Mark chunk `index` of `file` as failed after retries
    pub fn record_failure(&mut self, file: &str, index: usize, reason: &str) -> Result<()> {
        let record = self.record_mut(file)?;
        let expected = record.next_index();
        if index < expected {
            return Err(EngineError::OutOfOrder {
                file: file.to_string(),
                index,
                expected,
            });
        }
        record.failed_chunks.insert(index);
        record.status = FileStatus::PartiallyFailed;
        record.last_error = Some(format!("chunk {index}: {reason}"));
        self.persist()
    }

    /// Mark `file` as aborted by an I/O problem; progress is kept
    pub fn record_abort(&mut self, file: &str, reason: &str) -> Result<()> {
        let record = self.record_mut(file)?;
        record.status = FileStatus::Aborted;
        record.last_error = Some(reason.to_string());
        self.persist()
    }

    /// Forget all progress for `file`; returns whether a record existed
    pub fn reset_file(&mut self, file: &str) -> Result<bool> {
        if self.state.files.remove(file).is_none() {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn record_mut(&mut self, file: &str) -> Result<&mut FileRecord> {
        self.state
            .files
            .get_mut(file)
            .ok_or_else(|| EngineError::UnknownFile(file.to_string()))
    }

    /// Write the state atomically
    fn persist(&self) -> Result<()> {
        let err = |source: std::io::Error| EngineError::StatePersist {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(err)?;

        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| err(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(err)?;
        tmp.write_all(&json).map_err(err)?;
        tmp.as_file().sync_all().map_err(err)?;
        tmp.persist(&self.path).map_err(|e| err(e.error))?;
        sync_dir(&dir).map_err(err)?;

        log::trace!("state saved to {}", self.path.display());
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".corrupt");
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
