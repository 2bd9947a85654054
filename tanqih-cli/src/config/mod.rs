//! Configuration module
//!
//! `tanqih.toml` holds defaults for every run. Command line flags and
//! environment variables override it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tanqih_core::{EngineConfig, EngineConfigBuilder, RetryPolicy};

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tanqih.toml";

/// CLI configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct CliConfig {
    /// Where inputs, outputs and progress live
    #[serde(default)]
    pub paths: PathsConfig,

    /// Chunking and concurrency
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Cleaning service
    #[serde(default)]
    pub service: ServiceConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

/// File system locations
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned for input files
    pub corpus_dir: PathBuf,
    /// Directory receiving `cleaned_<name>` outputs
    pub cleaned_dir: PathBuf,
    /// Progress file
    pub state_file: PathBuf,
    /// Optional log file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("corpus"),
            cleaned_dir: PathBuf::from("cleaned_corpus"),
            state_file: PathBuf::from("processing_state.json"),
            log_file: None,
        }
    }
}

/// Chunking and concurrency settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Upper bound on chunk length in characters
    pub max_chunk_chars: usize,
    /// Boundary search window, percent of the chunk size
    pub lookback_percent: u8,
    /// Written after every cleaned chunk
    pub chunk_separator: String,
    /// Files processed at once (0 = one per CPU)
    pub workers: usize,
    /// Extension of corpus files
    pub extension: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 15_000,
            lookback_percent: 10,
            chunk_separator: "\n".to_string(),
            workers: 1,
            extension: "txt".to_string(),
        }
    }
}

/// Cleaning service settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Gemini model name
    pub model: String,
    /// API base URL
    pub endpoint: String,
    /// Timeout for one call in seconds
    pub timeout_secs: u64,
    /// Prompt template with a `{text}` placeholder; built-in prompt if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
            prompt_file: None,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Calls per chunk, including the first
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Randomize delays by ±10%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl CliConfig {
    /// Load `explicit`, or `tanqih.toml` if present, or the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    log::debug!("using {}", default.display());
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Build the engine configuration
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        let workers = match self.processing.workers {
            0 => num_cpus::get(),
            n => n,
        };
        let retry = RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        };

        EngineConfigBuilder::new()
            .max_chunk_chars(self.processing.max_chunk_chars)
            .lookback_percent(self.processing.lookback_percent)
            .chunk_separator(self.processing.chunk_separator.as_str())
            .workers(workers)
            .call_timeout(Duration::from_secs(self.service.timeout_secs))
            .retry(retry)
            .build()
            .context("Invalid configuration")
    }
}
