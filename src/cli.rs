//! CLI argument parsing for timeguard

use crate::config::{Phase, DEFAULT_ENTRY_BLOCK};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the phase report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary on stderr (default)
    Text,
    /// JSON report on stdout
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "timeguard")]
#[command(version)]
#[command(
    about = "Timing instrumentation against controlled-channel single-stepping",
    long_about = None
)]
pub struct Cli {
    /// Program to process (JSON control-flow IR)
    #[arg(value_name = "PROGRAM")]
    pub program: PathBuf,

    /// Write the instrumented program here
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Configuration file (default: nearest tconfig.txt above the working directory)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted data files (default: the config's directory)
    #[arg(long = "data-dir", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Run this phase instead of the one selected by the configured mode
    #[arg(long = "phase", value_enum)]
    pub phase: Option<Phase>,

    /// Neither read nor write the trace observation cache
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Widest checkpoint (distinct contexts) that still gets a detection call
    #[arg(long = "max-arity", value_name = "N", default_value_t = 4,
          value_parser = clap::value_parser!(u8).range(1..=4))]
    pub max_arity: u8,

    /// Block name that always qualifies as a checkpoint
    #[arg(long = "entry-block", value_name = "NAME", default_value = DEFAULT_ENTRY_BLOCK)]
    pub entry_block: String,

    /// Report format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
