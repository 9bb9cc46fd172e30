//! Protocol metrics
//!
//! Log forwarding keeps local counters for the exit summary; protocol events
//! also go to the `metrics` recorder (Prometheus when installed).

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

/// Counters for the remote log forwarder
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    /// Records posted successfully
    posted_count: AtomicU64,
    /// Bytes the server acknowledged (or attempted, when the reply was unreadable)
    posted_bytes: AtomicU64,
    /// Records whose post failed
    failure_count: AtomicU64,
}

impl ForwarderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted_count(&self) -> u64 {
        self.posted_count.load(Ordering::Relaxed)
    }

    pub fn posted_bytes(&self) -> u64 {
        self.posted_bytes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Record a delivered log post
    pub fn record_posted(&self, bytes: usize) {
        self.posted_count.fetch_add(1, Ordering::Relaxed);
        self.posted_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("timer_log_bytes_posted_total").increment(bytes as u64);
    }

    /// Record a failed log post
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        counter!("timer_log_post_failures_total").increment(1);
    }

    pub fn snapshot(&self) -> ForwarderSnapshot {
        ForwarderSnapshot {
            posted_count: self.posted_count(),
            posted_bytes: self.posted_bytes(),
            failure_count: self.failure_count(),
        }
    }
}

/// Snapshot of forwarder metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderSnapshot {
    pub posted_count: u64,
    pub posted_bytes: u64,
    pub failure_count: u64,
}

/// Outbound timer message
pub fn record_message_sent(message: &'static str) {
    counter!("timer_messages_sent_total", "message" => message).increment(1);
}

/// Request that never got a reply
pub fn record_transport_error(message: &'static str) {
    counter!("timer_transport_errors_total", "message" => message).increment(1);
}

/// `failure` element reported by the server
pub fn record_server_failure(code: &str) {
    counter!("timer_server_failures_total", "code" => code.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarder_counters() {
        let metrics = ForwarderMetrics::new();
        metrics.record_posted(10);
        metrics.record_posted(5);
        metrics.record_failure();

        assert_eq!(
            metrics.snapshot(),
            ForwarderSnapshot {
                posted_count: 2,
                posted_bytes: 15,
                failure_count: 1,
            }
        );
    }
}
