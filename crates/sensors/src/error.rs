//! Sensor error types

use contracts::{ContractError, SensorState};
use thiserror::Error;

/// Sensor specific error
#[derive(Debug, Error)]
pub enum SensorError {
    /// The underlying line could not be claimed
    #[error("hardware unavailable for '{sensor}': {message}")]
    HardwareUnavailable { sensor: String, message: String },

    /// Operation not allowed in the current lifecycle state
    #[error("sensor '{sensor}' cannot {operation} while {state:?}")]
    InvalidState {
        sensor: String,
        state: SensorState,
        operation: &'static str,
    },

    /// Lane to line mapping is inconsistent
    #[error("invalid lane mapping: {message}")]
    LaneMapping { message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SensorError {
    /// Create hardware unavailable error
    pub fn hardware_unavailable(sensor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareUnavailable {
            sensor: sensor.into(),
            message: message.into(),
        }
    }

    /// Create lane mapping error
    pub fn lane_mapping(message: impl Into<String>) -> Self {
        Self::LaneMapping {
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SensorError>;
