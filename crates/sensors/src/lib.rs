//! # Sensors
//!
//! Edge-triggered inputs of the race track.
//!
//! Responsibilities:
//! - Arm a line for one transition and wait with an optional timeout
//! - Record at most one event per arm cycle
//! - Coordinate the start gate and the four lane sensors
//! - Provide mock lines for tests and simulated races
//!
//! ## Feature Flags
//!
//! - `real-gpio`: Enable gpio-cdev lines (requires /dev/gpiochipN)

pub mod debounce;
pub mod edge_sensor;
pub mod error;
pub mod kernel_clock;
pub mod lane_array;
pub mod mock_line;
pub mod mock_provider;
pub mod provider;

#[cfg(feature = "real-gpio")]
pub mod gpio_line;

pub use contracts::{Edge, EdgeEvent, EdgeLine, LaneTimes, SensorState};
pub use debounce::Debouncer;
pub use edge_sensor::{ArmHandle, EdgeSensor, WaitOutcome};
pub use error::{Result, SensorError};
pub use lane_array::{compute_elapsed, LaneArray, LaneEvents};
pub use mock_line::{MockLine, MockLineConfig};
pub use mock_provider::{MockLineProvider, MockProviderConfig};
pub use provider::LineProvider;

#[cfg(feature = "real-gpio")]
pub use gpio_line::{GpioLine, GpioLineProvider};
