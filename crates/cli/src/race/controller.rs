//! RaceController - drives the track from heat announcements
//!
//! Two tasks share one protocol session: the heartbeat loop keeps the server
//! informed (and collects its replies), the race loop waits for a heat, arms
//! the sensors, times the race and reports it. An abort or termination seen
//! on the session's heat channel cancels whatever wait the race loop is in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{HeatDescriptor, LaneTimes, RaceConfig};
use derbynet::{DerbyNetError, ProtocolSession, Transport};
use observability::{
    record_arm_failure, record_heartbeat, record_heat_aborted, record_heat_finished,
    record_heat_started,
};
use sensors::{compute_elapsed, LaneArray};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::stats::{HeatResult, RaceStats};

/// Controller configuration
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Timing budgets
    pub race: RaceConfig,

    /// Stop after this many finished heats (None = until terminated)
    pub max_heats: Option<u64>,
}

/// How one announced heat ended
#[derive(Debug, Clone, PartialEq)]
pub enum HeatOutcome {
    /// Results reported to the server
    Finished(LaneTimes),
    /// Server aborted the heat, or the session terminated
    Aborted,
    /// The gate never opened within the gate timeout
    GateTimeout,
    /// Sensors could not be armed
    ArmFailed,
    /// FINISHED could not be delivered
    ReportFailed,
}

/// Heartbeat loop results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatCounts {
    pub ok: u64,
    pub failed: u64,
}

/// Race loop over one session and one lane array
pub struct RaceController<T> {
    session: Arc<ProtocolSession<T>>,
    lanes: LaneArray,
    config: ControllerConfig,
    stats: RaceStats,
}

impl<T> RaceController<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(session: Arc<ProtocolSession<T>>, lanes: LaneArray, config: ControllerConfig) -> Self {
        Self {
            session,
            lanes,
            config,
            stats: RaceStats::default(),
        }
    }

    /// Run the heartbeat and race loops until the session terminates or the
    /// heat limit is reached
    #[instrument(name = "race_controller", skip(self), fields(max_heats = ?self.config.max_heats))]
    pub async fn run(mut self) -> RaceStats {
        let start_time = Instant::now();
        let (stop_tx, stop_rx) = watch::channel(false);
        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.session),
            self.config.race.heartbeat_interval(),
            stop_rx,
        );

        info!("race loop started");
        while !self.should_stop() {
            let Some(heat) = self
                .session
                .next_heat(self.config.race.heat_wait_timeout())
                .await
            else {
                continue;
            };

            let outcome = self.run_heat(&heat).await;
            info!(
                round_id = heat.round_id,
                heat = heat.heat_number,
                ?outcome,
                "heat complete"
            );
            self.stats.results.push(HeatResult {
                round_id: heat.round_id,
                heat: heat.heat_number,
                outcome,
            });
        }

        self.lanes.close();
        let _ = stop_tx.send(true);
        match heartbeat.await {
            Ok(counts) => {
                self.stats.race.heartbeats_ok = counts.ok;
                self.stats.race.heartbeats_failed = counts.failed;
                self.stats.heartbeats = counts;
            }
            Err(e) => error!(error = ?e, "heartbeat task panicked"),
        }

        self.stats.duration = start_time.elapsed();
        info!(
            heats_finished = self.stats.heats_finished(),
            duration_secs = self.stats.duration.as_secs_f64(),
            "race loop stopped"
        );
        self.stats
    }

    fn should_stop(&self) -> bool {
        if self.session.is_terminating() {
            return true;
        }
        match self.config.max_heats {
            Some(max) if self.stats.heats_finished() >= max => {
                info!(heats = max, "heat limit reached");
                true
            }
            _ => false,
        }
    }

    /// Arm, time and report one heat
    #[instrument(
        name = "race_heat",
        skip(self, heat),
        fields(round_id = heat.round_id, heat = heat.heat_number, class = %heat.class_name)
    )]
    async fn run_heat(&mut self, heat: &HeatDescriptor) -> HeatOutcome {
        let mut updates = self.session.subscribe_heat();
        // Withdrawn between the announcement and the subscription
        if self.session.current_heat().await.as_ref() != Some(heat) {
            return self.aborted("server");
        }

        if let Err(e) = self.arm() {
            error!(error = %e, "failed to arm sensors");
            record_arm_failure();
            self.stats.race.arm_failure();
            return HeatOutcome::ArmFailed;
        }
        info!(lane_mask = heat.lane_mask.0, "armed, waiting for the gate");

        let gate_timeout = self.config.race.gate_timeout();
        let gate = tokio::select! {
            gate = self.lanes.wait_for_gate(gate_timeout) => gate,
            _ = heat_withdrawn(&mut updates, heat) => return self.aborted("server"),
        };
        let Some(gate) = gate else {
            warn!(?gate_timeout, "gate did not open");
            return self.aborted_with(HeatOutcome::GateTimeout, "gate_timeout");
        };

        record_heat_started(heat.round_id, heat.heat_number);
        self.stats.race.heat_started();
        match self.session.report_started().await {
            Ok(()) => {}
            Err(DerbyNetError::Terminating) => return self.aborted("terminating"),
            // The race is on regardless; FINISHED still carries the results
            Err(e) => warn!(error = %e, "failed to report start"),
        }

        let deadline = Instant::now() + self.config.race.lane_deadline();
        let events = tokio::select! {
            events = self.lanes.wait_for_lanes_in(heat.lane_mask, deadline) => events,
            _ = heat_withdrawn(&mut updates, heat) => return self.aborted("server"),
        };

        let times = compute_elapsed(Some(&gate), &events);
        debug!(?times, "lane times");

        match self.session.report_finished(times).await {
            Ok(()) => {
                record_heat_finished(&times, heat.lane_mask);
                self.stats.race.heat_finished(&times, heat.lane_mask);
                HeatOutcome::Finished(times)
            }
            Err(DerbyNetError::NoActiveHeat) => self.aborted("server"),
            Err(DerbyNetError::Terminating) => self.aborted("terminating"),
            Err(e) => {
                error!(error = %e, "failed to report results");
                self.aborted_with(HeatOutcome::ReportFailed, "report_failed")
            }
        }
    }

    fn arm(&mut self) -> sensors::Result<()> {
        self.lanes.arm_gate()?;
        self.lanes.arm_lanes()?;
        Ok(())
    }

    fn aborted(&mut self, reason: &'static str) -> HeatOutcome {
        self.aborted_with(HeatOutcome::Aborted, reason)
    }

    fn aborted_with(&mut self, outcome: HeatOutcome, reason: &'static str) -> HeatOutcome {
        record_heat_aborted(reason);
        self.stats.race.heat_aborted();
        outcome
    }
}

/// Resolves once the session's heat differs from `heat`
async fn heat_withdrawn(updates: &mut watch::Receiver<HeatDescriptor>, heat: &HeatDescriptor) {
    loop {
        if updates.changed().await.is_err() {
            // Session gone; nothing can withdraw the heat any more
            std::future::pending::<()>().await;
        }
        if *updates.borrow_and_update() != *heat {
            return;
        }
    }
}

/// Spawn the heartbeat loop.
///
/// Sends HEARTBEAT every `interval` until `stop` changes or the session
/// terminates; the current request always completes first.
pub fn spawn_heartbeat<T>(
    session: Arc<ProtocolSession<T>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<HeartbeatCounts>
where
    T: Transport + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut counts = HeartbeatCounts::default();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }
            if session.is_terminating() {
                break;
            }

            match session.send_heartbeat().await {
                Ok(()) => {
                    counts.ok += 1;
                    record_heartbeat(true);
                }
                Err(DerbyNetError::Terminating) => break,
                Err(e) => {
                    counts.failed += 1;
                    record_heartbeat(false);
                    warn!(error = %e, "heartbeat failed");
                }
            }
        }

        debug!(ok = counts.ok, failed = counts.failed, "heartbeat loop stopped");
        counts
    })
}
