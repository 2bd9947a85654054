//! Corpus discovery and file identity

use crate::error::{EngineError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of every output file name
pub const OUTPUT_PREFIX: &str = "cleaned_";

/// An input file of the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    /// Identity used as the state key
    pub key: String,
    /// Where to read the text
    pub path: PathBuf,
    /// Size in bytes at discovery time
    pub size: u64,
    /// Where cleaned text goes
    pub output_path: PathBuf,
}

impl CorpusFile {
    /// Describe `path`, sending output to `cleaned_dir`
    pub fn new(path: &Path, cleaned_dir: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|source| EngineError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .ok_or_else(|| EngineError::Corpus(format!("{} has no file name", path.display())))?;

        let mut output_name = std::ffi::OsString::from(OUTPUT_PREFIX);
        output_name.push(name);

        Ok(Self {
            key: path.to_string_lossy().into_owned(),
            path: path.to_path_buf(),
            size: metadata.len(),
            output_path: cleaned_dir.join(output_name),
        })
    }
}

/// List the `.{extension}` files directly inside `corpus_dir`, sorted by name
pub fn discover(corpus_dir: &Path, extension: &str, cleaned_dir: &Path) -> Result<Vec<CorpusFile>> {
    let entries = fs::read_dir(corpus_dir).map_err(|e| {
        EngineError::Corpus(format!(
            "cannot read corpus directory {}: {e}",
            corpus_dir.display()
        ))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Corpus(e.to_string()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();

    from_paths(&paths, cleaned_dir)
}

/// Build corpus files from explicit paths, rejecting output name clashes
pub fn from_paths(paths: &[PathBuf], cleaned_dir: &Path) -> Result<Vec<CorpusFile>> {
    let mut files = Vec::with_capacity(paths.len());
    let mut outputs: HashMap<PathBuf, String> = HashMap::new();

    for path in paths {
        let file = CorpusFile::new(path, cleaned_dir)?;
        if let Some(first) = outputs.insert(file.output_path.clone(), file.key.clone()) {
            return Err(EngineError::OutputCollision {
                first,
                second: file.key,
                output: file.output_path,
            });
        }
        files.push(file);
    }

    Ok(files)
}

/// Hex SHA-256 of `text`
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
