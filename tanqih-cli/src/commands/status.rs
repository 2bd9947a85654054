//! Status command implementation

use super::GlobalArgs;
use crate::output::OutputFormat;
use anyhow::Result;
use clap::Args;
use tanqih_core::StateStore;

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl StatusArgs {
    /// Execute the status command
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        global.init_logging(&config)?;

        let store = StateStore::load(&config.paths.state_file)?;
        log::debug!(
            "read progress from {} ({:?})",
            store.path().display(),
            store.load_outcome()
        );
        self.format.stdout().status(&store.progress())
    }
}
