//! Logger setup

use anyhow::{Context, Result};
use log::Level;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Initialize `env_logger` from the verbosity count
///
/// `RUST_LOG` overrides the level. With a log file, records go there
/// (at `info` or more); warnings and errors are still echoed to stderr
/// unless `quiet` is set.
pub fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    if quiet && log_file.is_none() {
        return Ok(());
    }

    let log_level = match (verbose, log_file.is_some()) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.format(move |buf, record| {
            if echoes_to_terminal(record.level(), quiet) {
                eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
            }
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    }

    builder.try_init().context("Failed to initialize logging")
}

/// Whether a record written to the log file is also shown on stderr
fn echoes_to_terminal(level: Level, quiet: bool) -> bool {
    !quiet && level <= Level::Warn
}
