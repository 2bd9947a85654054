//! Reset command implementation

use super::GlobalArgs;
use crate::error::CliError;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use tanqih_core::StateStore;

/// Arguments for the reset command
#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Files to forget, as listed by `tanqih status`
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<String>,

    /// Also delete the cleaned output of each file
    #[arg(long)]
    pub delete_output: bool,
}

impl ResetArgs {
    /// Execute the reset command
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        global.init_logging(&config)?;

        let mut store = StateStore::load(&config.paths.state_file)?;
        if let Some(missing) = self.files.iter().find(|f| store.record(f).is_none()) {
            return Err(CliError::UnknownFile(missing.clone()).into());
        }

        for file in &self.files {
            let output = store.record(file).map(|r| r.output_path.clone());
            store.reset_file(file)?;
            log::info!("reset progress for {file}");

            match output {
                Some(path) if self.delete_output && path.exists() => {
                    fs::remove_file(&path)
                        .with_context(|| format!("Failed to delete {}", path.display()))?;
                    println!("Reset {file} (deleted {})", path.display());
                }
                _ => println!("Reset {file}"),
            }
        }
        Ok(())
    }
}
