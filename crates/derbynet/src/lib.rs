//! # DerbyNet
//!
//! Race server protocol client.
//!
//! Responsibilities:
//! - Log in and keep the session cookie
//! - Send timer messages (HELLO, IDENTIFIED, HEARTBEAT, STARTED, FINISHED, ...)
//! - Decode and dispatch every reply document
//! - Divert diagnostic output to the server's log endpoint on request

pub mod error;
pub mod forwarder;
pub mod messages;
pub mod metrics;
pub mod response;
pub mod session;
pub mod transport;

pub use error::{DerbyNetError, Result};
pub use forwarder::{LogForwarder, FORWARDER_TARGET};
pub use messages::{login_fields, FormFields, TimerMessage};
pub use metrics::{ForwarderMetrics, ForwarderSnapshot};
pub use response::{parse_log_reply, ActionResponse, ResponseElement};
pub use session::{ProtocolSession, SessionPhase, SessionState};
pub use transport::{HttpTransport, LocalTransport, MockServer, MockTransport, Transport};
