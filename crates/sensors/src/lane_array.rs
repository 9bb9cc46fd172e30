//! LaneArray - the start gate plus four finish-line sensors
//!
//! Arms the sensors for a heat, waits for the gate, then waits for every
//! occupied lane concurrently under one shared deadline.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use contracts::{Edge, EdgeEvent, GpioConfig, LaneMask, LaneTimes, RaceConfig, LANE_COUNT};
use tracing::{debug, info, instrument, warn};

use crate::edge_sensor::{ArmHandle, EdgeSensor, WaitOutcome};
use crate::error::{Result, SensorError};
use crate::provider::LineProvider;

/// Per-lane events of one heat, lane 1 first
pub type LaneEvents = [Option<EdgeEvent>; LANE_COUNT];

/// Gate and lane sensors of one track
pub struct LaneArray {
    gate: EdgeSensor,
    lanes: [EdgeSensor; LANE_COUNT],
    edge: Edge,
    debounce: Duration,
    lane_events: LaneEvents,
}

impl LaneArray {
    /// Build from already constructed sensors.
    ///
    /// # Errors
    /// `LaneMapping` if two sensors share a line
    pub fn new(
        gate: EdgeSensor,
        lanes: [EdgeSensor; LANE_COUNT],
        edge: Edge,
        debounce: Duration,
    ) -> Result<Self> {
        let array = Self {
            gate,
            lanes,
            edge,
            debounce,
            lane_events: [None; LANE_COUNT],
        };
        array.validate_mapping()?;
        Ok(array)
    }

    /// Build the sensors from the pin map through a line provider
    #[instrument(name = "lane_array_from_config", skip_all, fields(backend = provider.backend()))]
    pub fn from_config(
        provider: &dyn LineProvider,
        gpio: &GpioConfig,
        race: &RaceConfig,
    ) -> Result<Self> {
        if gpio.lanes.len() != LANE_COUNT {
            return Err(SensorError::lane_mapping(format!(
                "expected {LANE_COUNT} lane pins, got {}",
                gpio.lanes.len()
            )));
        }

        let gate = EdgeSensor::new("gate", provider.line(&gpio.gate, &gpio.consumer)?);
        let mut lanes = Vec::with_capacity(LANE_COUNT);
        for (idx, pin) in gpio.lanes.iter().enumerate() {
            let line = provider.line(pin, &gpio.consumer)?;
            lanes.push(EdgeSensor::new(format!("lane{}", idx + 1), line));
        }
        let lanes: [EdgeSensor; LANE_COUNT] = lanes
            .try_into()
            .map_err(|_| SensorError::lane_mapping("lane sensor count mismatch"))?;

        let array = Self::new(gate, lanes, race.edge, race.debounce())?;
        info!(
            gate = %array.gate.label(),
            lanes = ?array.lanes.iter().map(EdgeSensor::label).collect::<Vec<_>>(),
            edge = %array.edge,
            "lane array ready"
        );
        Ok(array)
    }

    /// Every sensor must sit on its own line
    pub fn validate_mapping(&self) -> Result<()> {
        let mut seen = HashSet::new();
        seen.insert(self.gate.label());
        for sensor in &self.lanes {
            let label = sensor.label();
            if !seen.insert(label.clone()) {
                return Err(SensorError::lane_mapping(format!(
                    "{} shares line {label} with another sensor",
                    sensor.name()
                )));
            }
        }
        Ok(())
    }

    pub fn gate(&self) -> &EdgeSensor {
        &self.gate
    }

    pub fn lanes(&self) -> &[EdgeSensor; LANE_COUNT] {
        &self.lanes
    }

    /// Gate event of the current cycle, if seen
    pub fn gate_event(&self) -> Option<EdgeEvent> {
        self.gate.event()
    }

    /// Lane events collected by the last lane wait
    pub fn lane_events(&self) -> LaneEvents {
        self.lane_events
    }

    /// Reset and arm the gate sensor
    pub fn arm_gate(&mut self) -> Result<ArmHandle> {
        self.validate_mapping()?;
        self.gate.reset();
        self.gate.arm(self.edge, self.debounce)
    }

    /// Reset and arm all four lane sensors, clearing prior times.
    ///
    /// If any lane fails to arm, the lanes armed so far are closed again.
    pub fn arm_lanes(&mut self) -> Result<Vec<ArmHandle>> {
        self.validate_mapping()?;
        self.lane_events = [None; LANE_COUNT];

        let mut handles = Vec::with_capacity(LANE_COUNT);
        for idx in 0..LANE_COUNT {
            self.lanes[idx].reset();
            match self.lanes[idx].arm(self.edge, self.debounce) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(lane = idx + 1, error = %e, "lane arm failed, rolling back");
                    for sensor in &mut self.lanes[..idx] {
                        sensor.close();
                    }
                    return Err(e);
                }
            }
        }
        debug!(count = handles.len(), "lanes armed");
        Ok(handles)
    }

    /// Wait for the start gate; `None` waits indefinitely
    pub async fn wait_for_gate(&mut self, timeout: Option<Duration>) -> Option<EdgeEvent> {
        match self.gate.wait_for(timeout).await {
            WaitOutcome::Fired(event) => Some(event),
            outcome => {
                debug!(?outcome, "gate did not fire");
                None
            }
        }
    }

    /// Wait for all four lanes until `deadline`
    pub async fn wait_for_lanes(&mut self, deadline: Instant) -> LaneEvents {
        self.wait_for_lanes_in(LaneMask::ALL, deadline).await
    }

    /// Wait for the lanes present in `mask` until `deadline`.
    ///
    /// Waits run concurrently; lanes outside the mask report `None`
    /// without waiting.
    #[instrument(name = "lane_array_wait", skip(self, deadline), fields(mask = mask.0))]
    pub async fn wait_for_lanes_in(&mut self, mask: LaneMask, deadline: Instant) -> LaneEvents {
        let [l1, l2, l3, l4] = &mut self.lanes;
        let (e1, e2, e3, e4) = tokio::join!(
            wait_lane(l1, mask.contains(0), deadline),
            wait_lane(l2, mask.contains(1), deadline),
            wait_lane(l3, mask.contains(2), deadline),
            wait_lane(l4, mask.contains(3), deadline),
        );
        self.lane_events = [e1, e2, e3, e4];

        let fired = self.lane_events.iter().filter(|e| e.is_some()).count();
        debug!(fired, expected = mask.occupied(), "lane wait complete");
        self.lane_events
    }

    /// Close every sensor
    pub fn close(&mut self) {
        self.gate.close();
        for sensor in &mut self.lanes {
            sensor.close();
        }
    }
}

impl std::fmt::Debug for LaneArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneArray")
            .field("gate", &self.gate)
            .field("lanes", &self.lanes)
            .field("edge", &self.edge)
            .field("debounce", &self.debounce)
            .finish()
    }
}

async fn wait_lane(sensor: &mut EdgeSensor, occupied: bool, deadline: Instant) -> Option<EdgeEvent> {
    if !occupied {
        return None;
    }
    sensor.wait_until(deadline).await.event()
}

/// Elapsed seconds per lane from the gate event.
///
/// A lane reads 0.0 if it never fired, if there is no gate event, or if the
/// lane fired before the gate.
pub fn compute_elapsed(gate: Option<&EdgeEvent>, lanes: &LaneEvents) -> LaneTimes {
    let mut times = [0.0; LANE_COUNT];
    let Some(gate) = gate else {
        return times;
    };
    for (time, lane) in times.iter_mut().zip(lanes) {
        if let Some(lane) = lane {
            if lane.fired_at >= gate.fired_at {
                *time = lane.fired_at.duration_since(gate.fired_at).as_secs_f64();
            }
        }
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_provider::MockLineProvider;
    use contracts::{EdgeLine, PinConfig};

    fn mock_array() -> (LaneArray, MockLineProvider, GpioConfig) {
        let provider = MockLineProvider::new();
        let gpio = GpioConfig::default();
        let race = RaceConfig {
            debounce_us: 0,
            ..RaceConfig::default()
        };
        let array = LaneArray::from_config(&provider, &gpio, &race).unwrap();
        (array, provider, gpio)
    }

    #[test]
    fn test_compute_elapsed() {
        let gate = EdgeEvent::now(28);
        let lane = |ms: u64| {
            Some(EdgeEvent {
                sensor_id: 24,
                fired_at: gate.fired_at + Duration::from_millis(ms),
            })
        };
        let times = compute_elapsed(Some(&gate), &[lane(2500), None, lane(3250), lane(0)]);
        assert!((times[0] - 2.5).abs() < 1e-9);
        assert_eq!(times[1], 0.0);
        assert!((times[2] - 3.25).abs() < 1e-9);
        assert_eq!(times[3], 0.0);
    }

    #[test]
    fn test_compute_elapsed_without_gate() {
        let times = compute_elapsed(None, &[Some(EdgeEvent::now(24)), None, None, None]);
        assert_eq!(times, [0.0; LANE_COUNT]);
    }

    #[test]
    fn test_lane_before_gate_reads_zero() {
        let lane = EdgeEvent::now(24);
        let gate = EdgeEvent {
            sensor_id: 28,
            fired_at: lane.fired_at + Duration::from_millis(5),
        };
        let times = compute_elapsed(Some(&gate), &[Some(lane), None, None, None]);
        assert_eq!(times[0], 0.0);
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let provider = MockLineProvider::new();
        let mut gpio = GpioConfig::default();
        gpio.lanes[2] = PinConfig::new("gpiochip2", 24);
        let err = LaneArray::from_config(&provider, &gpio, &RaceConfig::default()).unwrap_err();
        assert!(matches!(err, SensorError::LaneMapping { .. }));
    }

    #[test]
    fn test_debug_lists_sensors() {
        let (array, _provider, _gpio) = mock_array();
        let dump = format!("{array:?}");
        assert!(dump.starts_with("LaneArray"));
        assert!(dump.contains("gate"));
        assert_eq!(dump.matches("EdgeSensor").count(), 1 + LANE_COUNT);
    }

    #[tokio::test]
    async fn test_gate_then_all_lanes() {
        let (mut array, provider, gpio) = mock_array();
        array.arm_gate().unwrap();
        array.arm_lanes().unwrap();

        provider.get(&gpio.gate).unwrap().trigger();
        let gate = array
            .wait_for_gate(Some(Duration::from_secs(1)))
            .await
            .expect("gate fired");

        for pin in &gpio.lanes {
            provider.get(pin).unwrap().trigger();
        }
        let events = array
            .wait_for_lanes(Instant::now() + Duration::from_secs(1))
            .await;
        assert!(events.iter().all(Option::is_some));
        assert_eq!(array.gate_event(), Some(gate));

        let times = compute_elapsed(Some(&gate), &events);
        assert!(times.iter().all(|&t| t >= 0.0));
    }

    #[tokio::test]
    async fn test_lane_that_never_fires_bounded_by_deadline() {
        let (mut array, provider, gpio) = mock_array();
        array.arm_lanes().unwrap();

        for (idx, pin) in gpio.lanes.iter().enumerate() {
            if idx != 2 {
                provider.get(pin).unwrap().trigger();
            }
        }

        let started = Instant::now();
        let events = array
            .wait_for_lanes(started + Duration::from_millis(50))
            .await;
        let waited = started.elapsed();

        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(500));
        assert!(events[0].is_some());
        assert!(events[1].is_some());
        assert!(events[2].is_none());
        assert!(events[3].is_some());
    }

    #[tokio::test]
    async fn test_mask_skips_empty_lanes() {
        let (mut array, provider, gpio) = mock_array();
        array.arm_lanes().unwrap();

        // Lane 1 empty; lanes 2-4 race
        for pin in &gpio.lanes[1..] {
            provider.get(pin).unwrap().trigger();
        }
        let started = Instant::now();
        let events = array
            .wait_for_lanes_in(LaneMask(14), started + Duration::from_secs(5))
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(events[0].is_none());
        assert!(events[1..].iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn test_gate_timeout() {
        let (mut array, _provider, _gpio) = mock_array();
        array.arm_gate().unwrap();
        assert!(array
            .wait_for_gate(Some(Duration::from_millis(20)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_rearm_clears_previous_heat() {
        let (mut array, provider, gpio) = mock_array();
        array.arm_lanes().unwrap();
        provider.get(&gpio.lanes[0]).unwrap().trigger();
        let first = array
            .wait_for_lanes(Instant::now() + Duration::from_millis(20))
            .await;
        assert!(first[0].is_some());

        array.arm_lanes().unwrap();
        assert_eq!(array.lane_events(), [None; LANE_COUNT]);
        let second = array
            .wait_for_lanes(Instant::now() + Duration::from_millis(20))
            .await;
        assert!(second[0].is_none());
    }

    #[tokio::test]
    async fn test_arm_failure_rolls_back() {
        let (mut array, provider, gpio) = mock_array();
        provider.get(&gpio.lanes[3]).unwrap().set_fail_requests(true);

        let err = array.arm_lanes().unwrap_err();
        assert!(matches!(err, SensorError::HardwareUnavailable { .. }));
        for pin in &gpio.lanes[..3] {
            assert!(!provider.get(pin).unwrap().is_requested());
        }
    }

    #[tokio::test]
    async fn test_close_releases_lines() {
        let (mut array, provider, gpio) = mock_array();
        array.arm_gate().unwrap();
        array.arm_lanes().unwrap();
        array.close();
        array.close();

        assert!(!provider.get(&gpio.gate).unwrap().is_requested());
        for pin in &gpio.lanes {
            assert_eq!(provider.get(pin).unwrap().release_count(), 1);
        }
    }
}
