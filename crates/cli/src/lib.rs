//! # GPIO Timer
//!
//! Race control for a four-lane track wired to GPIO lines and reporting to a
//! DerbyNet server. The binary wires configuration, logging and signals
//! around [`race::RaceController`].

pub mod race;

pub use race::{ControllerConfig, HeartbeatCounts, HeatOutcome, HeatResult, RaceController, RaceStats};

/// Build id sent with IDENTIFIED
pub fn build_ident() -> String {
    format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// MALFUNCTION text sent when the timer shuts down
pub const TERMINATION_REASON: &str = "GPIO Timer is terminating.  Sorry!";
