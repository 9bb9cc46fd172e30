//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{GpioConfig, LogSink, TimerConfig};
use derbynet::{HttpTransport, LogForwarder, ProtocolSession};
use gpio_timer::{build_ident, ControllerConfig, RaceController, TERMINATION_REASON};
use observability::{LogRecord, LogRouter};
use sensors::{LaneArray, LineProvider, MockLineProvider, MockProviderConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::load_config;
use crate::cli::RunArgs;
use crate::error::CliError;

/// Time allowed for queued remote log records after the race loop stops
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Execute the `run` command
pub async fn run_timer(
    args: &RunArgs,
    router: LogRouter,
    log_rx: mpsc::UnboundedReceiver<LogRecord>,
) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let mut config = load_config(&args.config)?;

    // Apply CLI overrides
    if let Some(ref server) = args.server {
        info!(server = %server, "Overriding server URL from CLI");
        config.server.base_url = server.clone();
        config_loader::ConfigLoader::validate(&config).context("Invalid --server override")?;
    }

    info!(
        action_url = %config.server.action_url(),
        gate = %config.gpio.gate.label(),
        simulate = args.simulate,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    // Hardware first: a missing chip should fail before the server hears from us
    let provider = line_provider(args.simulate, &config.gpio)?;
    let lanes = LaneArray::from_config(provider.as_ref(), &config.gpio, &config.race)
        .context("Failed to set up lane sensors")?;

    let transport =
        HttpTransport::new(&config.server).context("Failed to create HTTP client")?;
    let log_sink: Arc<dyn LogSink> = Arc::new(router);
    let session = Arc::new(
        ProtocolSession::new(transport, &config.server, config.identity.clone())
            .with_log_sink(Arc::clone(&log_sink)),
    );
    let forwarder = LogForwarder::spawn(Arc::clone(&session), log_rx, Arc::clone(&log_sink));

    if let Err(e) = introduce(&session, &config).await {
        // No-op unless the login went through
        let _ = session.terminate(TERMINATION_REASON).await;
        log_sink.divert(false);
        forwarder.shutdown(LOG_DRAIN_GRACE).await;
        return Err(e);
    }

    let controller = RaceController::new(
        Arc::clone(&session),
        lanes,
        ControllerConfig {
            race: config.race.clone(),
            max_heats: (args.heats > 0).then_some(args.heats),
        },
    );
    let mut race_task = tokio::spawn(controller.run());

    info!("Timer running, waiting for heats...");

    let finished = tokio::select! {
        result = &mut race_task => Some(result),
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping timer...");
            None
        }
    };

    if let Err(e) = session.terminate(TERMINATION_REASON).await {
        warn!(error = %e, "Failed to send termination notice");
    }
    let result = match finished {
        Some(result) => result,
        None => race_task.await,
    };
    let mut stats = result.context("Race task failed")?;

    // Anything logged from here on stays local
    log_sink.divert(false);
    stats.log_forwarding = Some(forwarder.metrics().snapshot());
    forwarder.shutdown(LOG_DRAIN_GRACE).await;

    info!(
        heats_finished = stats.heats_finished(),
        duration_secs = stats.duration.as_secs_f64(),
        "GPIO Timer finished"
    );
    stats.print_summary();

    Ok(())
}

/// Log in, then HELLO and IDENTIFIED
async fn introduce(session: &ProtocolSession<HttpTransport>, config: &TimerConfig) -> Result<()> {
    session
        .authenticate()
        .await
        .map_err(|e| CliError::login(config.server.action_url(), e.to_string()))?;
    session.send_hello().await.context("HELLO failed")?;
    session
        .send_identification(&build_ident())
        .await
        .context("IDENTIFIED failed")?;
    Ok(())
}

fn line_provider(simulate: bool, gpio: &GpioConfig) -> Result<Box<dyn LineProvider>> {
    if simulate {
        info!("Running with SIMULATED sensors");
        return Ok(Box::new(MockLineProvider::with_config(
            MockProviderConfig::simulated(gpio.gate.clone()),
        )));
    }
    hardware_provider()
}

#[cfg(feature = "real-gpio")]
fn hardware_provider() -> Result<Box<dyn LineProvider>> {
    Ok(Box::new(sensors::GpioLineProvider))
}

#[cfg(not(feature = "real-gpio"))]
fn hardware_provider() -> Result<Box<dyn LineProvider>> {
    Err(CliError::hardware("built without the real-gpio feature; use --simulate").into())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
