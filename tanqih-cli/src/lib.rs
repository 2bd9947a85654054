//! Tanqih CLI library
//!
//! This library provides the command-line interface for the tanqih
//! resumable corpus cleaner.

pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod output;
pub mod progress;
pub mod service;

pub use error::{CliError, CliResult};
