//! # GPIO Timer CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and validation
//! - Race loop lifecycle against a DerbyNet server
//! - Graceful shutdown with a termination notice

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::{LogRouter, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_timer, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let (router, log_rx) = LogRouter::new();
    let router = router.keep_local(derbynet::FORWARDER_TARGET);
    init_logging(&cli, router.clone())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "GPIO Timer starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_timer(args, router, log_rx).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli, router: LogRouter) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(
        ObservabilityConfig {
            log_format: cli.log_format.into(),
            metrics_port: None,
            default_log_level: default_log_level.to_string(),
        },
        router,
    )
}
