//! CLI argument parsing for fusedvm

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format of the reconstructed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented attribute tree with ongoing values (default)
    Text,
    /// JSON document for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "fusedvm")]
#[command(version)]
#[command(
    about = "Fused kernel state of hosts, virtual machines and containers",
    long_about = None
)]
pub struct Cli {
    /// Experiment description (TOML, one [[trace]] table per host)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Time-ordered events of every trace, one JSON object per line
    #[arg(short, long, value_name = "FILE")]
    pub events: PathBuf,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Include every interval of every attribute, not only the ongoing value
    #[arg(long)]
    pub history: bool,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}
