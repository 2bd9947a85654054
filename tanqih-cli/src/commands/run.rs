//! Run command implementation

use super::GlobalArgs;
use crate::config::CliConfig;
use crate::error::CliError;
use crate::input::collect_inputs;
use crate::output::OutputFormat;
use crate::progress::ProgressReporter;
use crate::service::{GeminiService, PromptTemplate};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tanqih_core::{
    CancelFlag, CleaningService, EchoService, LoadOutcome, ProcessingEngine, StateStore,
};

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Input files or patterns (default: every file in the corpus directory)
    #[arg(short, long, value_name = "FILE/PATTERN")]
    pub input: Vec<String>,

    /// Directory scanned for corpus files
    #[arg(long, value_name = "DIR", env = "TANQIH_CORPUS_DIR")]
    pub corpus_dir: Option<PathBuf>,

    /// Directory for cleaned output
    #[arg(short, long, value_name = "DIR", env = "TANQIH_CLEANED_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum characters per chunk
    #[arg(long, value_name = "CHARS")]
    pub max_chunk_chars: Option<usize>,

    /// Files processed at once (0 = one per CPU)
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Gemini model name
    #[arg(short, long, env = "TANQIH_MODEL")]
    pub model: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Echo chunks back instead of calling the service
    #[arg(long)]
    pub dry_run: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Execute the run command
    pub fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let mut config = global.load_config()?;
        self.apply_overrides(&mut config);
        global.init_logging(&config)?;

        log::info!("Starting corpus cleaning");
        let engine_config = config.to_engine_config()?;
        let files = collect_inputs(
            &self.input,
            &config.paths.corpus_dir,
            &config.processing.extension,
            &config.paths.cleaned_dir,
        )?;

        let store = StateStore::load(&config.paths.state_file)?;
        if let LoadOutcome::Corrupt { backup, .. } = store.load_outcome() {
            eprintln!(
                "Warning: progress file was unreadable; saved it to {} and starting over",
                backup.display()
            );
        }

        let service = self.service(&config)?;
        let reporter = Arc::new(ProgressReporter::new(global.quiet));
        let engine = ProcessingEngine::new(engine_config, service, store)?
            .with_observer(reporter.clone());
        install_interrupt_handler(engine.cancel_flag());

        let summary = engine.run(&files)?;
        reporter.finish();
        self.format.stdout().summary(&summary)?;

        let pending = summary.outcomes.iter().filter(|o| o.needs_rerun()).count();
        if pending > 0 {
            return Err(CliError::IncompleteRun(pending).into());
        }
        Ok(())
    }

    /// Apply command line and environment overrides to `config`
    fn apply_overrides(&self, config: &mut CliConfig) {
        if let Some(dir) = &self.corpus_dir {
            config.paths.corpus_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.paths.cleaned_dir = dir.clone();
        }
        if let Some(chars) = self.max_chunk_chars {
            config.processing.max_chunk_chars = chars;
        }
        if let Some(workers) = self.workers {
            config.processing.workers = workers;
        }
        if let Some(model) = &self.model {
            config.service.model = model.clone();
        }
    }

    fn service(&self, config: &CliConfig) -> Result<Box<dyn CleaningService>> {
        if self.dry_run {
            log::info!("dry run: chunks are echoed back unchanged");
            return Ok(Box::new(EchoService));
        }

        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(CliError::MissingApiKey)?;
        let prompt = match &config.service.prompt_file {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };
        let service = GeminiService::new(
            &config.service.endpoint,
            &config.service.model,
            api_key,
            prompt,
        )
        .context("Failed to set up the Gemini client")?;
        Ok(Box::new(service))
    }
}

/// First Ctrl-C finishes the in-flight chunk; the second exits at once
fn install_interrupt_handler(cancel: CancelFlag) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            eprintln!("Interrupted again; exiting now.");
            std::process::exit(130);
        }
        cancel.cancel();
        eprintln!("Interrupt received; stopping after the current chunk (Ctrl-C again to quit now).");
    });
    if let Err(e) = result {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }
}
