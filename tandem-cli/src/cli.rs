//! CLI argument parsing definitions

use clap::Parser;
use std::path::PathBuf;

/// Serves instructions from a Tandem host against a JavaScript delegate.
///
/// Prints the port it listens on as the first stdout line.
#[derive(Parser, Debug)]
#[command(name = "tandem-worker", author, version, about, long_about = None)]
pub struct Cli {
    /// Request a debugging session (implies debug mode)
    #[arg(long)]
    pub inspect: bool,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Delegate script to load
    #[arg(value_name = "DELEGATE")]
    pub delegate: PathBuf,

    /// Worker options as a JSON object
    #[arg(value_name = "OPTIONS_JSON")]
    pub options: Option<String>,
}
