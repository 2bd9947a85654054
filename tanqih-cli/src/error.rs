//! Error handling for the CLI application

use std::fmt;

/// Operator-facing errors raised by the CLI itself
#[derive(Debug)]
pub enum CliError {
    /// No input files matched
    NoInputFiles(String),
    /// Invalid file pattern
    InvalidPattern(String),
    /// Configuration error
    ConfigError(String),
    /// The cleaning service needs an API key and none was given
    MissingApiKey,
    /// No progress recorded for a file
    UnknownFile(String),
    /// Some files still need another run
    IncompleteRun(usize),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::IncompleteRun(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NoInputFiles(source) => write!(f, "No input files found in {source}"),
            CliError::InvalidPattern(pattern) => write!(f, "Invalid file pattern: {pattern}"),
            CliError::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
            CliError::MissingApiKey => write!(
                f,
                "GOOGLE_API_KEY is not set (use --api-key, the environment, a .env file, or --dry-run)"
            ),
            CliError::UnknownFile(file) => write!(f, "No progress recorded for {file}"),
            CliError::IncompleteRun(count) => {
                write!(f, "{count} file(s) need another run to finish")
            }
        }
    }
}

impl std::error::Error for CliError {}

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, anyhow::Error>;
