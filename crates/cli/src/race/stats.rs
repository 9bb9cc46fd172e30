//! Race statistics and exit summary.

use std::time::Duration;

use derbynet::ForwarderSnapshot;
use observability::RaceMetricsAggregator;

use super::controller::{HeartbeatCounts, HeatOutcome};

/// One heat as the controller handled it
#[derive(Debug, Clone, PartialEq)]
pub struct HeatResult {
    pub round_id: u32,
    pub heat: u32,
    pub outcome: HeatOutcome,
}

/// Statistics from a timer run
#[derive(Debug, Clone, Default)]
pub struct RaceStats {
    /// Every heat the controller picked up, in order
    pub results: Vec<HeatResult>,

    /// Total duration of the run
    pub duration: Duration,

    /// Heartbeat loop results
    pub heartbeats: HeartbeatCounts,

    /// Remote log forwarding, if a forwarder ran
    pub log_forwarding: Option<ForwarderSnapshot>,

    /// Lane time aggregator
    pub race: RaceMetricsAggregator,
}

impl RaceStats {
    /// Heats whose results reached the server
    pub fn heats_finished(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, HeatOutcome::Finished(_)))
            .count() as u64
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        print!("{}", self.race.summary());

        if let Some(logs) = &self.log_forwarding {
            println!(
                "Remote log: {} records, {} bytes, {} failed posts",
                logs.posted_count, logs.posted_bytes, logs.failure_count
            );
        }
        println!();
    }
}
