//! Progress reporting module

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tanqih_core::{CorpusFile, FileOutcome, FileStatus, ProgressObserver};

/// Progress bar over the corpus size in bytes
pub struct ProgressReporter {
    progress_bar: ProgressBar,
    totals: Mutex<HashMap<String, usize>>,
}

impl ProgressReporter {
    /// Create a new progress reporter; `quiet` hides the bar
    pub fn new(quiet: bool) -> Self {
        let progress_bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} (eta {eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        Self {
            progress_bar,
            totals: Mutex::new(HashMap::new()),
        }
    }

    /// Finish progress reporting
    pub fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    fn total_chunks(&self, file: &CorpusFile) -> usize {
        self.totals
            .lock()
            .map(|totals| totals.get(&file.key).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ProgressObserver for ProgressReporter {
    fn run_started(&self, files: &[CorpusFile]) {
        self.progress_bar
            .set_length(files.iter().map(|f| f.size).sum());
        self.progress_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    fn file_started(
        &self,
        file: &CorpusFile,
        total_chunks: usize,
        resume_from: usize,
        resumed_bytes: u64,
    ) {
        if let Ok(mut totals) = self.totals.lock() {
            totals.insert(file.key.clone(), total_chunks);
        }
        self.progress_bar.inc(resumed_bytes);
        if resume_from > 0 {
            self.progress_bar.println(format!(
                "Resuming {} at chunk {}/{}",
                display_name(file),
                resume_from + 1,
                total_chunks
            ));
        }
    }

    fn chunk_started(&self, file: &CorpusFile, index: usize) {
        self.progress_bar.set_message(format!(
            "{} chunk {}/{}",
            display_name(file),
            index + 1,
            self.total_chunks(file)
        ));
    }

    fn chunk_finished(&self, _file: &CorpusFile, _index: usize, input_bytes: usize) {
        self.progress_bar.inc(input_bytes as u64);
    }

    fn file_finished(&self, file: &CorpusFile, outcome: &FileOutcome) {
        if outcome.skipped {
            self.progress_bar.inc(file.size);
            return;
        }
        match outcome.status {
            FileStatus::Completed => self
                .progress_bar
                .println(format!("✓ {}", display_name(file))),
            FileStatus::PartiallyFailed => self.progress_bar.println(format!(
                "✗ {}: chunks {:?} failed",
                display_name(file),
                outcome.failed_chunks
            )),
            FileStatus::Aborted => self.progress_bar.println(format!(
                "✗ {}: {}",
                display_name(file),
                outcome.error.as_deref().unwrap_or("aborted")
            )),
            FileStatus::Pending | FileStatus::InProgress => {}
        }
    }
}

fn display_name(file: &CorpusFile) -> String {
    file.path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.key.clone())
}
