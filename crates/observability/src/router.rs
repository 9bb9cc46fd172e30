//! LogRouter - `MakeWriter` that sends each record to exactly one place
//!
//! Every formatted record is buffered by its writer and handed over when the
//! writer is dropped: either to local output or to the remote log queue,
//! depending on the diversion flag at the time the record started. Targets
//! registered as local-only (the forwarder itself, the HTTP stack) never
//! leave the process.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use contracts::LogSink;
use tokio::sync::mpsc;
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;

/// Complete formatted log record
pub type LogRecord = Vec<u8>;

/// Targets that always stay local, matched by prefix
const DEFAULT_LOCAL_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls", "cookie_store"];

type LocalWriter = Arc<Mutex<Box<dyn Write + Send>>>;

struct RouterInner {
    diverted: AtomicBool,
    tx: mpsc::UnboundedSender<LogRecord>,
    local: LocalWriter,
    local_targets: Vec<String>,
}

/// Routes log records to stdout or to the remote log queue
#[derive(Clone)]
pub struct LogRouter {
    inner: Arc<RouterInner>,
}

impl LogRouter {
    /// Router writing locally to stdout; the receiver feeds the log forwarder
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        Self::with_local_writer(io::stdout())
    }

    /// Router with a custom local writer
    pub fn with_local_writer(
        local: impl Write + Send + 'static,
    ) -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Self {
            inner: Arc::new(RouterInner {
                diverted: AtomicBool::new(false),
                tx,
                local: Arc::new(Mutex::new(Box::new(local))),
                local_targets: DEFAULT_LOCAL_TARGETS.iter().map(|t| t.to_string()).collect(),
            }),
        };
        (router, rx)
    }

    /// Add a target prefix whose records always stay local.
    ///
    /// Must be called before the router is cloned into a subscriber.
    pub fn keep_local(mut self, target: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.local_targets.push(target.into());
        }
        self
    }

    fn is_local_target(&self, target: &str) -> bool {
        self.inner
            .local_targets
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()))
    }

    fn writer(&self, diverted: bool) -> RoutedWriter {
        RoutedWriter {
            buf: Vec::new(),
            diverted,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LogSink for LogRouter {
    fn divert(&self, enabled: bool) {
        self.inner.diverted.store(enabled, Ordering::SeqCst);
    }

    fn is_diverted(&self) -> bool {
        self.inner.diverted.load(Ordering::SeqCst)
    }

    fn write_local(&self, record: &[u8]) {
        self.inner.write_local(record);
    }
}

impl RouterInner {
    fn write_local(&self, record: &[u8]) {
        if let Ok(mut local) = self.local.lock() {
            let _ = local.write_all(record);
            let _ = local.flush();
        }
    }
}

impl<'a> MakeWriter<'a> for LogRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(self.is_diverted())
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let diverted = self.is_diverted() && !self.is_local_target(meta.target());
        self.writer(diverted)
    }
}

/// Writer for one record
pub struct RoutedWriter {
    buf: Vec<u8>,
    diverted: bool,
    inner: Arc<RouterInner>,
}

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RoutedWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let record = std::mem::take(&mut self.buf);
        let record = if self.diverted {
            match self.inner.tx.send(record) {
                Ok(()) => return,
                // Forwarder gone: the record goes out locally instead
                Err(mpsc::error::SendError(record)) => record,
            }
        } else {
            record
        };

        self.inner.write_local(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt;

    /// Shared in-memory local output
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LogRecord>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(String::from_utf8_lossy(&record).trim_end().to_string());
        }
        out
    }

    fn subscriber(router: LogRouter) -> impl tracing::Subscriber + Send + Sync {
        fmt()
            .with_writer(router)
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    #[test]
    fn test_each_record_goes_to_exactly_one_place() {
        let capture = Capture::default();
        let (router, mut rx) = LogRouter::with_local_writer(capture.clone());
        let control = router.clone();

        with_default(subscriber(router), || {
            tracing::info!("one");
            control.divert(true);
            tracing::info!("two");
            tracing::info!("three");
            control.divert(false);
            tracing::info!("four");
        });

        let local = capture.lines();
        let remote = drain(&mut rx);
        assert_eq!(local.len(), 2);
        assert!(local[0].ends_with("one"));
        assert!(local[1].ends_with("four"));
        assert_eq!(remote.len(), 2);
        assert!(remote[0].ends_with("two"));
        assert!(remote[1].ends_with("three"));
    }

    #[test]
    fn test_local_targets_never_diverted() {
        let capture = Capture::default();
        let (router, mut rx) = LogRouter::with_local_writer(capture.clone());
        let router = router.keep_local("derbynet::forwarder");
        let control = router.clone();
        control.divert(true);

        with_default(subscriber(router), || {
            tracing::warn!(target: "derbynet::forwarder", "log post failed");
            tracing::debug!(target: "hyper_util::client", "connecting");
            tracing::info!(target: "gpio_timer::race", "heat started");
        });

        assert_eq!(capture.lines().len(), 2);
        let remote = drain(&mut rx);
        assert_eq!(remote.len(), 1);
        assert!(remote[0].ends_with("heat started"));
    }

    #[test]
    fn test_write_local_ignores_diversion() {
        let capture = Capture::default();
        let (router, mut rx) = LogRouter::with_local_writer(capture.clone());
        router.divert(true);

        router.write_local(b"refused by server\n");

        assert_eq!(capture.lines(), vec!["refused by server".to_string()]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_closed_queue_falls_back_to_local() {
        let capture = Capture::default();
        let (router, rx) = LogRouter::with_local_writer(capture.clone());
        drop(rx);
        router.divert(true);

        with_default(subscriber(router), || {
            tracing::info!("kept");
        });

        let local = capture.lines();
        assert_eq!(local.len(), 1);
        assert!(local[0].ends_with("kept"));
    }
}
