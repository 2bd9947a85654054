//! Append-only output files

use crate::error::{EngineError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An output file opened for appending cleaned chunks
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    path: PathBuf,
    len: u64,
}

impl OutputFile {
    /// Create (or truncate) the output for a file starting from chunk 0
    pub fn create(path: &Path) -> Result<Self> {
        let err = |source: std::io::Error| EngineError::OutputWrite {
            path: path.to_path_buf(),
            source,
        };
        ensure_parent(path).map_err(err)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(err)?;
        file.sync_all().map_err(err)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len: 0,
        })
    }

    /// Reopen an output whose first `recorded` bytes are known good
    ///
    /// Bytes past `recorded` belong to a chunk whose completion was never
    /// recorded and are cut off. A file shorter than `recorded` cannot be
    /// resumed and yields [`EngineError::OutputTruncated`].
    pub fn resume(path: &Path, recorded: u64) -> Result<Self> {
        let err = |source: std::io::Error| EngineError::OutputWrite {
            path: path.to_path_buf(),
            source,
        };
        ensure_parent(path).map_err(err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(err)?;

        let actual = file.metadata().map_err(err)?.len();
        if actual < recorded {
            return Err(EngineError::OutputTruncated {
                path: path.to_path_buf(),
                expected: recorded,
                actual,
            });
        }
        if actual > recorded {
            log::warn!(
                "discarding {} unrecorded bytes at the end of {}",
                actual - recorded,
                path.display()
            );
            file.set_len(recorded).map_err(err)?;
            file.sync_all().map_err(err)?;
        }
        file.seek(SeekFrom::Start(recorded)).map_err(err)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            len: recorded,
        })
    }

    /// Append `text` and sync it to disk; returns the new length
    pub fn append(&mut self, text: &str) -> Result<u64> {
        let err = |source: std::io::Error| EngineError::OutputWrite {
            path: self.path.clone(),
            source,
        };
        self.file.write_all(text.as_bytes()).map_err(err)?;
        self.file.sync_data().map_err(err)?;
        self.len += text.len() as u64;
        Ok(self.len)
    }

    /// Current length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
