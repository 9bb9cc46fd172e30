//! Race metrics
//!
//! Counters and histograms for the race loop, plus an in-memory aggregator
//! used for the summary printed at exit.

use contracts::{LaneMask, LaneTimes, LANE_COUNT};
use metrics::{counter, gauge, histogram};

/// Heat armed and gate opened
pub fn record_heat_started(round_id: u32, heat: u32) {
    counter!("timer_heats_started_total").increment(1);
    gauge!("timer_current_round_id").set(round_id as f64);
    gauge!("timer_current_heat").set(heat as f64);
}

/// Results reported; records each lane time and each occupied lane that
/// produced no reading
pub fn record_heat_finished(times: &LaneTimes, mask: LaneMask) {
    counter!("timer_heats_finished_total").increment(1);

    for (idx, time) in times.iter().enumerate() {
        let lane = (idx + 1).to_string();
        if *time > 0.0 {
            histogram!("timer_lane_time_seconds", "lane" => lane).record(*time);
        } else if mask.contains(idx) {
            counter!("timer_lanes_missing_total", "lane" => lane).increment(1);
        }
    }
}

/// Heat abandoned (server abort, gate timeout, report failure)
pub fn record_heat_aborted(reason: &'static str) {
    counter!("timer_heats_aborted_total", "reason" => reason).increment(1);
}

/// One heartbeat round trip
pub fn record_heartbeat(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("timer_heartbeats_total", "status" => status).increment(1);
}

/// Sensor could not be armed
pub fn record_arm_failure() {
    counter!("timer_arm_failures_total").increment(1);
}

/// In-memory race aggregator
#[derive(Debug, Clone, Default)]
pub struct RaceMetricsAggregator {
    pub heats_started: u64,
    pub heats_finished: u64,
    pub heats_aborted: u64,
    pub heartbeats_ok: u64,
    pub heartbeats_failed: u64,
    pub arm_failures: u64,
    /// Lane time statistics, lane 1 first
    pub lane_stats: [RunningStats; LANE_COUNT],
    /// Occupied lanes that never reported, lane 1 first
    pub lanes_missing: [u64; LANE_COUNT],
}

impl RaceMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heat_started(&mut self) {
        self.heats_started += 1;
    }

    pub fn heat_finished(&mut self, times: &LaneTimes, mask: LaneMask) {
        self.heats_finished += 1;
        for (idx, time) in times.iter().enumerate() {
            if *time > 0.0 {
                self.lane_stats[idx].push(*time);
            } else if mask.contains(idx) {
                self.lanes_missing[idx] += 1;
            }
        }
    }

    pub fn heat_aborted(&mut self) {
        self.heats_aborted += 1;
    }

    pub fn arm_failure(&mut self) {
        self.arm_failures += 1;
    }

    pub fn summary(&self) -> RaceSummary {
        RaceSummary {
            heats_started: self.heats_started,
            heats_finished: self.heats_finished,
            heats_aborted: self.heats_aborted,
            heartbeats_ok: self.heartbeats_ok,
            heartbeats_failed: self.heartbeats_failed,
            arm_failures: self.arm_failures,
            lanes: std::array::from_fn(|i| StatsSummary::from(&self.lane_stats[i])),
            lanes_missing: self.lanes_missing,
        }
    }
}

/// Race summary
#[derive(Debug, Clone, Default)]
pub struct RaceSummary {
    pub heats_started: u64,
    pub heats_finished: u64,
    pub heats_aborted: u64,
    pub heartbeats_ok: u64,
    pub heartbeats_failed: u64,
    pub arm_failures: u64,
    pub lanes: [StatsSummary; LANE_COUNT],
    pub lanes_missing: [u64; LANE_COUNT],
}

impl std::fmt::Display for RaceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Race Summary ===")?;
        writeln!(
            f,
            "Heats: {} started, {} finished, {} aborted",
            self.heats_started, self.heats_finished, self.heats_aborted
        )?;
        writeln!(
            f,
            "Heartbeats: {} ok, {} failed",
            self.heartbeats_ok, self.heartbeats_failed
        )?;
        if self.arm_failures > 0 {
            writeln!(f, "Arm failures: {}", self.arm_failures)?;
        }
        for (idx, stats) in self.lanes.iter().enumerate() {
            writeln!(
                f,
                "Lane {} (s): {} missing={}",
                idx + 1,
                stats,
                self.lanes_missing[idx]
            )?;
        }
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
