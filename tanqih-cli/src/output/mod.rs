//! Report formatting module

use anyhow::Result;
use tanqih_core::{FileProgress, RunSummary};

/// Trait for report formatters
pub trait ReportFormatter {
    /// Render per-file progress from the state file
    fn status(&mut self, progress: &[FileProgress]) -> Result<()>;

    /// Render the outcome of a run
    fn summary(&mut self, summary: &RunSummary) -> Result<()>;
}

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON document
    Json,
}

impl OutputFormat {
    /// Formatter writing to stdout
    pub fn stdout(self) -> Box<dyn ReportFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter::new(std::io::stdout())),
            OutputFormat::Json => Box::new(JsonFormatter::new(std::io::stdout())),
        }
    }
}

pub mod json;
pub mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;
