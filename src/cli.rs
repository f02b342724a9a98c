//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch a log file and react to matching lines
#[derive(Parser)]
#[command(
    name = "tailwatch",
    version,
    about = "Continuously watches a single file and reacts to regex-matched lines",
    long_about = "Follows a growing file, matches every new line against configured regex rules, \
                  and runs each rule's shell command at most once per debounce interval.",
    subcommand_negates_reqs = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// File to watch for new lines
    #[arg(value_name = "FILE", required = true)]
    pub file: Option<PathBuf>,

    /// Testing mode: read existing content once and run no commands
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate default configuration file
    Init {
        /// Path where to create the configuration file
        #[arg(long, short = 'p')]
        path: Option<PathBuf>,
    },
    /// Validate configuration file
    Check,
    /// Display version information
    Version,
}
