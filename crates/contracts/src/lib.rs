//! # Contracts
//!
//! Shared types and traits for the timer crates. Hardware adapters, the
//! protocol client and the controller only meet through this crate.
//!
//! ## Time Model
//! - Edge transitions are stamped with a monotonic `Instant` at callback time
//! - Elapsed race times are reported in seconds (f64), 0.0 meaning "no time"

mod config;
mod edge;
mod edge_line;
mod error;
mod heat;
mod log_sink;

pub use config::*;
pub use edge::*;
pub use edge_line::{EdgeCallback, EdgeLine};
pub use error::*;
pub use heat::*;
pub use log_sink::LogSink;
