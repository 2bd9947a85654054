//! CLI command implementations

use crate::config::CliConfig;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod generate_config;
pub mod reset;
pub mod run;
pub mod status;

/// Resumable chunked cleaning of Arabic text corpora
#[derive(Debug, Parser)]
#[command(name = "tanqih", version)]
pub struct Cli {
    /// Options shared by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: ./tanqih.toml if present)
    #[arg(short, long, global = true, value_name = "FILE", env = "TANQIH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Progress file
    #[arg(long, global = true, value_name = "FILE", env = "TANQIH_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Write logs to this file; warnings and errors still reach the terminal
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Load the configuration with the shared overrides applied
    pub fn load_config(&self) -> Result<CliConfig> {
        let mut config = CliConfig::load(self.config.as_deref())?;
        if let Some(state_file) = &self.state_file {
            config.paths.state_file = state_file.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.paths.log_file = Some(log_file.clone());
        }
        Ok(config)
    }

    /// Set up logging for `config`
    pub fn init_logging(&self, config: &CliConfig) -> Result<()> {
        crate::logging::init_logging(self.verbose, self.quiet, config.paths.log_file.as_deref())
    }
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean the corpus, resuming where the last run stopped
    Run(run::RunArgs),

    /// Show per-file progress from the state file
    Status(status::StatusArgs),

    /// Forget the progress of files so they are cleaned from scratch
    Reset(reset::ResetArgs),

    /// Write a configuration file with the defaults
    GenerateConfig(generate_config::GenerateConfigArgs),
}

impl Commands {
    /// Execute the selected command
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        match self {
            Commands::Run(args) => args.execute(global),
            Commands::Status(args) => args.execute(global),
            Commands::Reset(args) => args.execute(global),
            Commands::GenerateConfig(args) => args.execute(),
        }
    }
}
