//! # Observability
//!
//! Tracing setup, log routing and Prometheus metrics for the timer.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact) writing through a [`LogRouter`]
//! - Remote log diversion, toggled by the server
//! - Prometheus exporter and race metrics
//!
//! ## Usage
//!
//! ```ignore
//! let (router, log_rx) = LogRouter::new();
//! observability::init_with_config(ObservabilityConfig::default(), router.clone())?;
//!
//! // Later, the protocol session flips diversion through `LogSink`
//! session.with_log_sink(Arc::new(router));
//! ```

pub mod metrics;
pub mod router;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    record_arm_failure, record_heartbeat, record_heat_aborted, record_heat_finished,
    record_heat_started, RaceMetricsAggregator, RaceSummary, RunningStats, StatsSummary,
};
pub use crate::router::{LogRecord, LogRouter, RoutedWriter};

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Filter used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human readable, multi-line
    Pretty,
    /// Single line
    #[default]
    Compact,
}

/// Install the global subscriber and, if configured, the Prometheus exporter.
///
/// Every record is written through `router`, so it lands either locally or
/// on the remote log queue, never both.
pub fn init_with_config(config: ObservabilityConfig, router: LogRouter) -> Result<()> {
    // 1. Initialize Tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(router)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer().pretty().with_writer(router).with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer().compact().with_writer(router).with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    // 2. Initialize Prometheus exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus exporter
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
