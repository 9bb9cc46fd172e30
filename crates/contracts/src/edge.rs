//! Edge transitions and sensor lifecycle states.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Edge direction a sensor is armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Low to high transition
    #[default]
    Rising,
    /// High to low transition
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("rising"),
            Edge::Falling => f.write_str("falling"),
        }
    }
}

/// One recorded transition.
///
/// `sensor_id` is the line offset on its chip. `fired_at` is on the monotonic
/// clock: the kernel's interrupt timestamp for hardware lines, the delivery
/// time otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub sensor_id: u32,
    pub fired_at: Instant,
}

impl EdgeEvent {
    /// Event stamped with the current instant
    pub fn now(sensor_id: u32) -> Self {
        Self {
            sensor_id,
            fired_at: Instant::now(),
        }
    }
}

/// Sensor lifecycle.
///
/// `Idle -> Armed -> Fired`, any state `-> Closed`, and `Closed -> Idle` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorState {
    Idle = 0,
    Armed = 1,
    Fired = 2,
    Closed = 3,
}

impl SensorState {
    /// Decode from the atomic representation; unknown values read as Closed
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SensorState::Idle,
            1 => SensorState::Armed,
            2 => SensorState::Fired,
            _ => SensorState::Closed,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
