//! EdgeSensor - one physical line armed for a single transition
//!
//! Each arm cycle owns a one-shot notification slot. The hardware callback
//! only performs an atomic `Armed -> Fired` claim; the winner publishes the
//! event, every later transition of the same cycle is dropped.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::{Edge, EdgeCallback, EdgeEvent, EdgeLine, SensorState};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Result, SensorError};

/// Result of waiting on a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The sensor fired during this arm cycle
    Fired(EdgeEvent),
    /// The timeout or deadline passed first
    TimedOut,
    /// The sensor is not armed (idle or closed)
    NotArmed,
}

impl WaitOutcome {
    pub fn event(self) -> Option<EdgeEvent> {
        match self {
            WaitOutcome::Fired(event) => Some(event),
            WaitOutcome::TimedOut | WaitOutcome::NotArmed => None,
        }
    }
}

/// Receipt returned by a successful `arm`
#[derive(Debug, Clone)]
pub struct ArmHandle {
    pub sensor: String,
    pub offset: u32,
    pub edge: Edge,
    pub armed_at: Instant,
}

/// State shared between the sensor and the callback of one arm cycle
struct ArmCycle {
    sensor: String,
    offset: u32,
    state: AtomicU8,
    slot: Mutex<Option<oneshot::Sender<EdgeEvent>>>,
    duplicates: AtomicU64,
}

impl ArmCycle {
    fn new(sensor: &str, offset: u32) -> Self {
        Self {
            sensor: sensor.to_string(),
            offset,
            state: AtomicU8::new(SensorState::Idle.as_u8()),
            slot: Mutex::new(None),
            duplicates: AtomicU64::new(0),
        }
    }

    fn state(&self) -> SensorState {
        SensorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn on_edge(&self, event: EdgeEvent) {
        if event.sensor_id != self.offset {
            warn!(
                sensor = %self.sensor,
                expected = self.offset,
                got = event.sensor_id,
                "edge from unexpected line offset ignored"
            );
            return;
        }

        match self.state.compare_exchange(
            SensorState::Armed.as_u8(),
            SensorState::Fired.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                // Only the claim winner reaches the slot
                if let Some(tx) = self.slot.lock().unwrap().take() {
                    let _ = tx.send(event);
                }
                trace!(sensor = %self.sensor, offset = self.offset, "edge recorded");
            }
            Err(current) if current == SensorState::Fired.as_u8() => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                trace!(sensor = %self.sensor, "duplicate edge dropped");
            }
            Err(current) => {
                trace!(
                    sensor = %self.sensor,
                    state = ?SensorState::from_u8(current),
                    "edge outside armed window ignored"
                );
            }
        }
    }
}

/// One edge-triggered input.
///
/// Waiting needs `&mut self`, so there is exactly one waiter per sensor.
pub struct EdgeSensor {
    name: String,
    line: Arc<dyn EdgeLine>,
    cycle: Arc<ArmCycle>,
    rx: Option<oneshot::Receiver<EdgeEvent>>,
    event: Option<EdgeEvent>,
}

impl EdgeSensor {
    /// Create an idle sensor on `line`
    pub fn new(name: impl Into<String>, line: Arc<dyn EdgeLine>) -> Self {
        let name = name.into();
        let cycle = Arc::new(ArmCycle::new(&name, line.offset()));
        Self {
            name,
            line,
            cycle,
            rx: None,
            event: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> u32 {
        self.line.offset()
    }

    pub fn label(&self) -> String {
        self.line.label()
    }

    pub fn state(&self) -> SensorState {
        self.cycle.state()
    }

    /// Event recorded in the current cycle, if the waiter has seen it
    pub fn event(&self) -> Option<EdgeEvent> {
        self.event
    }

    /// Transitions dropped because the sensor had already fired this cycle
    pub fn duplicates_dropped(&self) -> u64 {
        self.cycle.duplicates.load(Ordering::Relaxed)
    }

    /// Request the line for one edge direction.
    ///
    /// # Errors
    /// - `InvalidState` unless the sensor is idle
    /// - `HardwareUnavailable` if the line cannot be claimed
    pub fn arm(&mut self, edge: Edge, debounce: Duration) -> Result<ArmHandle> {
        let state = self.state();
        if state != SensorState::Idle {
            return Err(SensorError::InvalidState {
                sensor: self.name.clone(),
                state,
                operation: "arm",
            });
        }

        let (tx, rx) = oneshot::channel();
        *self.cycle.slot.lock().unwrap() = Some(tx);
        self.rx = Some(rx);
        self.event = None;
        self.cycle
            .state
            .store(SensorState::Armed.as_u8(), Ordering::Release);

        let cycle = Arc::clone(&self.cycle);
        let callback: EdgeCallback = Arc::new(move |event| cycle.on_edge(event));

        if let Err(e) = self.line.request(edge, debounce, callback) {
            self.cycle
                .state
                .store(SensorState::Idle.as_u8(), Ordering::Release);
            self.cycle.slot.lock().unwrap().take();
            self.rx = None;
            return Err(SensorError::hardware_unavailable(&self.name, e.to_string()));
        }

        debug!(
            sensor = %self.name,
            line = %self.line.label(),
            %edge,
            debounce_us = debounce.as_micros() as u64,
            "sensor armed"
        );

        Ok(ArmHandle {
            sensor: self.name.clone(),
            offset: self.line.offset(),
            edge,
            armed_at: Instant::now(),
        })
    }

    /// Wait for the sensor to fire; `None` waits indefinitely
    pub async fn wait_for(&mut self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.wait(deadline).await
    }

    /// Wait for the sensor to fire until an absolute deadline
    pub async fn wait_until(&mut self, deadline: Instant) -> WaitOutcome {
        self.wait(Some(deadline)).await
    }

    async fn wait(&mut self, deadline: Option<Instant>) -> WaitOutcome {
        if let Some(event) = self.event {
            return WaitOutcome::Fired(event);
        }
        let Some(rx) = self.rx.as_mut() else {
            return WaitOutcome::NotArmed;
        };

        let received = match deadline {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                match tokio::time::timeout_at(deadline, rx).await {
                    Ok(received) => received,
                    Err(_) => return WaitOutcome::TimedOut,
                }
            }
            None => rx.await,
        };

        self.rx = None;
        match received {
            Ok(event) => {
                self.event = Some(event);
                WaitOutcome::Fired(event)
            }
            Err(_) => WaitOutcome::NotArmed,
        }
    }

    /// Release the line. Safe to call any number of times, in any state.
    pub fn close(&mut self) {
        let previous = SensorState::from_u8(
            self.cycle
                .state
                .swap(SensorState::Closed.as_u8(), Ordering::AcqRel),
        );
        self.cycle.slot.lock().unwrap().take();
        self.rx = None;

        if matches!(previous, SensorState::Armed | SensorState::Fired) {
            self.line.release();
            debug!(sensor = %self.name, ?previous, "sensor closed");
        }
    }

    /// Close and start a fresh idle cycle, forgetting the recorded event
    pub fn reset(&mut self) {
        self.close();
        self.cycle = Arc::new(ArmCycle::new(&self.name, self.line.offset()));
        self.event = None;
    }
}

impl Drop for EdgeSensor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EdgeSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSensor")
            .field("name", &self.name)
            .field("line", &self.line.label())
            .field("state", &self.state())
            .field("event", &self.event)
            .finish()
    }
}
