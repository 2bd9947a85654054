//! Plain text report formatter

use super::ReportFormatter;
use anyhow::Result;
use std::io::Write;
use tanqih_core::{FileOutcome, FileProgress, RunSummary};

/// Plain text formatter - one line per file
pub struct TextFormatter<W: Write> {
    writer: W,
}

impl<W: Write> TextFormatter<W> {
    /// Create a new text formatter
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn outcome_line(&mut self, outcome: &FileOutcome) -> Result<()> {
        write!(
            self.writer,
            "  {:<17} {:>5}/{:<5} {}",
            outcome.status.as_str(),
            outcome.chunks_done,
            outcome.chunks_total,
            outcome.file
        )?;
        if !outcome.failed_chunks.is_empty() {
            write!(self.writer, "  failed chunks {:?}", outcome.failed_chunks)?;
        }
        if let Some(error) = &outcome.error {
            write!(self.writer, "  ({error})")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}

impl<W: Write> ReportFormatter for TextFormatter<W> {
    fn status(&mut self, progress: &[FileProgress]) -> Result<()> {
        if progress.is_empty() {
            writeln!(self.writer, "No progress recorded yet.")?;
            return Ok(());
        }

        for file in progress {
            write!(
                self.writer,
                "{:<17} {:>5}/{:<5} {}",
                file.status.as_str(),
                file.chunks_done,
                file.chunks_total,
                file.file
            )?;
            if !file.failed_chunks.is_empty() {
                write!(self.writer, "  failed chunks {:?}", file.failed_chunks)?;
            }
            writeln!(self.writer)?;
        }

        let done = progress.iter().filter(|p| p.chunks_done == p.chunks_total).count();
        writeln!(self.writer, "{done}/{} files complete", progress.len())?;
        self.writer.flush()?;
        Ok(())
    }

    fn summary(&mut self, summary: &RunSummary) -> Result<()> {
        let skipped = summary.outcomes.iter().filter(|o| o.skipped).count();
        writeln!(
            self.writer,
            "Completed: {} ({} already done)",
            summary.completed().count(),
            skipped
        )?;
        for (label, outcomes) in [
            ("Partially failed", summary.partially_failed().collect::<Vec<_>>()),
            ("Aborted", summary.aborted().collect()),
            ("Unfinished", summary.unfinished().collect()),
        ] {
            if outcomes.is_empty() {
                continue;
            }
            writeln!(self.writer, "{label}: {}", outcomes.len())?;
            for outcome in outcomes {
                self.outcome_line(outcome)?;
            }
        }
        writeln!(self.writer, "Words cleaned: {}", summary.words_cleaned())?;
        if summary.interrupted {
            writeln!(self.writer, "Interrupted; run again to resume.")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
