//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// GPIO Timer - four-lane race timer for a DerbyNet server
#[derive(Parser, Debug)]
#[command(
    name = "gpio-timer",
    author,
    version,
    about = "GPIO lane timer for DerbyNet",
    long_about = "Times heats on a four-lane track wired to GPIO lines.\n\n\
                  Logs in to a DerbyNet server as the timer, waits for heat \n\
                  announcements, times the race from the start gate and \n\
                  reports the lane results."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "GPIO_TIMER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "GPIO_TIMER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the server and time heats
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the pin map and server endpoints
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "timer.toml", env = "GPIO_TIMER_CONFIG")]
    pub config: PathBuf,

    /// Override the server base URL from configuration
    #[arg(long, env = "GPIO_TIMER_SERVER")]
    pub server: Option<String>,

    /// Use simulated sensors that fire on their own
    #[arg(long, env = "GPIO_TIMER_SIMULATE")]
    pub simulate: bool,

    /// Stop after this many finished heats (0 = unlimited)
    #[arg(long, default_value = "0", env = "GPIO_TIMER_HEATS")]
    pub heats: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "GPIO_TIMER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "timer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "timer.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
