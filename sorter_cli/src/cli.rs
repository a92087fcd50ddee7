//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sorter", version, about = "Asparagus spear sorter")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sensor weight CSV (header `channel,weight`), overrides `[scanner] weights`
    #[arg(long, value_name = "FILE")]
    pub weights: Option<PathBuf>,

    /// Machine-readable output: JSON log lines and a JSON summary
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to `[logging] level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sort spears until Ctrl-C or the cycle limit
    Run {
        /// Stop after this many conveyor cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Print position, queue and drift every N cycles
        #[arg(long, value_name = "N")]
        status: Option<u64>,
        /// Print main-loop latency stats on exit
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        /// Use the simulated conveyor even when built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Abort with an error when the conveyor stops moving
        #[arg(long, action = ArgAction::SetTrue)]
        exit_on_stall: bool,
        /// Stall threshold in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 2000)]
        stall_ms: u64,
    },
    /// Build the line once and push one simulated tray through it
    SelfCheck,
    /// Print the effective configuration and outlet table
    ShowConfig,
    /// Persist the effective outlet table to the outlet store
    SaveOutlets {
        /// Store file; defaults to `[store] path`
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,
    },
}
