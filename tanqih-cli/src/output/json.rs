//! JSON report formatter

use super::ReportFormatter;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tanqih_core::{FileProgress, RunSummary};

/// JSON formatter - one pretty-printed document per report
pub struct JsonFormatter<W: Write> {
    writer: W,
}

/// Data structure for one file in a run report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeData<'a> {
    /// File key
    pub file: &'a str,
    /// Output path
    pub output_path: &'a Path,
    /// Status label
    pub status: &'static str,
    /// Chunks written
    pub chunks_done: usize,
    /// Chunks in the file
    pub chunks_total: usize,
    /// Chunk indices that need a re-run
    pub failed_chunks: &'a [usize],
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    /// Words cleaned in this run
    pub words_cleaned: usize,
    /// Already complete before the run
    pub skipped: bool,
}

/// Data structure for a run report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryData<'a> {
    /// The run stopped early
    pub interrupted: bool,
    /// Words cleaned in this run
    pub words_cleaned: usize,
    /// Per-file outcomes
    pub files: Vec<OutcomeData<'a>>,
}

impl<W: Write> JsonFormatter<W> {
    /// Create a new JSON formatter
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, value)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> ReportFormatter for JsonFormatter<W> {
    fn status(&mut self, progress: &[FileProgress]) -> Result<()> {
        self.write(&progress)
    }

    fn summary(&mut self, summary: &RunSummary) -> Result<()> {
        let data = SummaryData {
            interrupted: summary.interrupted,
            words_cleaned: summary.words_cleaned(),
            files: summary
                .outcomes
                .iter()
                .map(|o| OutcomeData {
                    file: &o.file,
                    output_path: &o.output_path,
                    status: o.status.as_str(),
                    chunks_done: o.chunks_done,
                    chunks_total: o.chunks_total,
                    failed_chunks: &o.failed_chunks,
                    error: o.error.as_deref(),
                    words_cleaned: o.words_cleaned,
                    skipped: o.skipped,
                })
                .collect(),
        };
        self.write(&data)
    }
}
