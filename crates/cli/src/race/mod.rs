//! Race orchestration module.

mod controller;
mod stats;

pub use controller::{spawn_heartbeat, ControllerConfig, HeartbeatCounts, HeatOutcome, RaceController};
pub use stats::{HeatResult, RaceStats};
