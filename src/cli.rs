//! Command-line interface.
//!
//! The positional port is kept as a raw string so that non-numeric text can
//! be downgraded to a warning by [`crate::config::resolve_port`] instead of
//! aborting argument parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines. Default.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(
    name = "shell-bridge",
    about = "Bridge a single TCP client to a local shell",
    version,
    long_about = None
)]
pub struct Cli {
    /// TCP port to listen on (default 9933).
    #[arg(allow_negative_numbers = true)]
    pub port: Option<String>,

    /// Path to an optional TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
