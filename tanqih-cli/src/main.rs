//! tanqih command line entry point

use clap::Parser;
use std::process::ExitCode;
use tanqih_cli::commands::Cli;
use tanqih_cli::CliError;

fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command.execute(&cli.global) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<CliError>()
                .map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}
