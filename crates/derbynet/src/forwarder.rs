//! LogForwarder - posts diverted log records through the session
//!
//! Records arrive as complete formatted lines on an unbounded queue and are
//! posted one by one, in order. A record the server refuses is written to
//! local output instead. Nothing logged from this module may be diverted
//! again, otherwise a failing post would feed itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use contracts::LogSink;
use tracing::{debug, error, instrument, warn};

use crate::metrics::ForwarderMetrics;
use crate::session::ProtocolSession;
use crate::transport::Transport;

/// Log target of this module; log routers must keep it local
pub const FORWARDER_TARGET: &str = module_path!();

/// Handle to a running log forwarder
pub struct LogForwarder {
    metrics: Arc<ForwarderMetrics>,
    worker_handle: JoinHandle<()>,
}

impl LogForwarder {
    /// Spawn the worker; it stops once every sender of `rx` is dropped.
    ///
    /// Records whose post fails go to `fallback`'s local output.
    pub fn spawn<T>(
        session: Arc<ProtocolSession<T>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        fallback: Arc<dyn LogSink>,
    ) -> Self
    where
        T: Transport + Send + 'static,
    {
        let metrics = Arc::new(ForwarderMetrics::new());
        let worker_metrics = Arc::clone(&metrics);

        let worker_handle = tokio::spawn(async move {
            forward_worker(session, rx, fallback, worker_metrics).await;
        });

        Self {
            metrics,
            worker_handle,
        }
    }

    pub fn metrics(&self) -> &Arc<ForwarderMetrics> {
        &self.metrics
    }

    /// Give queued records up to `grace` to drain, then stop the worker
    #[instrument(name = "log_forwarder_shutdown", skip(self))]
    pub async fn shutdown(mut self, grace: Duration) {
        match tokio::time::timeout(grace, &mut self.worker_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = ?e, "log forwarder task panicked"),
            Err(_) => {
                self.worker_handle.abort();
                debug!("log forwarder stopped with records pending");
            }
        }
    }
}

/// Worker task that posts queued records
async fn forward_worker<T>(
    session: Arc<ProtocolSession<T>>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    fallback: Arc<dyn LogSink>,
    metrics: Arc<ForwarderMetrics>,
) where
    T: Transport + Send,
{
    debug!("log forwarder started");

    while let Some(record) = rx.recv().await {
        let attempted = record.len();
        let body = String::from_utf8_lossy(&record).into_owned();

        match session.post_log(body).await {
            Ok(accepted) => metrics.record_posted(accepted),
            Err(e) => {
                metrics.record_failure();
                warn!(attempted, error = %e, "log post failed, writing record locally");
                fallback.write_local(&record);
            }
        }
    }

    debug!("log forwarder stopped");
}
