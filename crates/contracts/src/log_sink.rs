//! LogSink trait - diagnostic output routing capability
//!
//! The protocol session flips this when the server asks for remote logs.

/// Switch between local diagnostic output and the remote log endpoint.
pub trait LogSink: Send + Sync {
    /// Route subsequent log records to the remote endpoint (`true`) or back to
    /// local output (`false`).
    fn divert(&self, enabled: bool);

    /// Whether records currently go to the remote endpoint
    fn is_diverted(&self) -> bool;

    /// Write an already formatted record to local output, whatever the
    /// diversion state. Used for records the remote endpoint refused.
    fn write_local(&self, record: &[u8]);
}
