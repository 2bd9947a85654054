//! Input handling module

pub mod glob_resolver;

pub use glob_resolver::resolve_patterns;

use crate::error::CliError;
use anyhow::Result;
use std::path::Path;
use tanqih_core::{corpus, CorpusFile};

/// Corpus files for a run: explicit patterns, or the corpus directory
pub fn collect_inputs(
    patterns: &[String],
    corpus_dir: &Path,
    extension: &str,
    cleaned_dir: &Path,
) -> Result<Vec<CorpusFile>> {
    let files = if patterns.is_empty() {
        corpus::discover(corpus_dir, extension, cleaned_dir)?
    } else {
        corpus::from_paths(&resolve_patterns(patterns)?, cleaned_dir)?
    };

    if files.is_empty() {
        return Err(CliError::NoInputFiles(corpus_dir.display().to_string()).into());
    }
    Ok(files)
}
