//! CLI argument parsing for Stepwatch

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented timing tree (default)
    Text,
    /// Wire JSON list
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "stepwatch")]
#[command(version)]
#[command(about = "Inspect and merge profiler sessions across instances", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a remote instance's exported sessions and render them
    Fetch {
        /// Export URL of the remote instance (e.g. http://host/profiler/export)
        url: String,

        /// Also fetch sessions correlated with each imported session
        #[arg(long = "drill-down")]
        drill_down: bool,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,

        /// Local buffer capacity (default: 100)
        #[arg(long = "capacity", value_name = "N", default_value = "100")]
        capacity: usize,

        /// Per-request timeout in milliseconds (default: 30000)
        #[arg(long = "timeout-ms", value_name = "MS", default_value = "30000")]
        timeout_ms: u64,
    },

    /// Render a saved session (or session list) JSON file
    Show {
        /// File written by the json-dir sink or an export
        file: PathBuf,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
