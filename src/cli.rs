//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// YAML-configured logger with hot-reloaded log level
#[derive(Parser)]
#[command(
    name = "hotlog",
    version,
    about = "YAML-configured logger with hot-reloaded log level",
    long_about = "Loads config.yaml from the working directory, logs to the console and a \
                  size-rotated file, and re-applies log.level whenever the file changes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Emit JSON records instead of human-readable lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Fail instead of writing a default config file when none exists
    #[arg(long, global = true)]
    pub no_auto_create: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Log one line per level at startup and after every config change, until Ctrl-C
    Run {
        /// Make dpanic records panic
        #[arg(long)]
        development: bool,
    },
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
