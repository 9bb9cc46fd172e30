//! Config validation
//!
//! Rules:
//! - exactly four lanes
//! - lane pins unique and distinct from the gate pin
//! - intervals and budgets > 0
//! - server URL uses http or https
//! - identity strings present

use std::collections::HashSet;

use contracts::{ContractError, TimerConfig, LANE_COUNT};

/// Validate a TimerConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &TimerConfig) -> Result<(), ContractError> {
    validate_server(config)?;
    validate_identity(config)?;
    validate_race(config)?;
    validate_pins(config)?;
    Ok(())
}

fn validate_server(config: &TimerConfig) -> Result<(), ContractError> {
    let server = &config.server;
    if !(server.base_url.starts_with("http://") || server.base_url.starts_with("https://")) {
        return Err(ContractError::config_validation(
            "server.base_url",
            format!("expected an http(s) URL, got '{}'", server.base_url),
        ));
    }
    if server.username.is_empty() {
        return Err(ContractError::config_validation(
            "server.username",
            "username cannot be empty",
        ));
    }
    if server.request_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "server.request_timeout_ms",
            "request_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_identity(config: &TimerConfig) -> Result<(), ContractError> {
    if config.identity.timer.is_empty() {
        return Err(ContractError::config_validation(
            "identity.timer",
            "timer id cannot be empty",
        ));
    }
    if config.identity.device_id.is_empty() {
        return Err(ContractError::config_validation(
            "identity.device_id",
            "device id cannot be empty",
        ));
    }
    Ok(())
}

fn validate_race(config: &TimerConfig) -> Result<(), ContractError> {
    let race = &config.race;
    let positive = [
        ("race.heartbeat_interval_ms", race.heartbeat_interval_ms),
        ("race.heat_wait_timeout_ms", race.heat_wait_timeout_ms),
        ("race.lane_deadline_ms", race.lane_deadline_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ContractError::config_validation(
                field,
                format!("{field} must be > 0"),
            ));
        }
    }
    Ok(())
}

fn validate_pins(config: &TimerConfig) -> Result<(), ContractError> {
    let gpio = &config.gpio;
    if gpio.lanes.len() != LANE_COUNT {
        return Err(ContractError::config_validation(
            "gpio.lanes",
            format!("expected {LANE_COUNT} lanes, got {}", gpio.lanes.len()),
        ));
    }

    let mut seen = HashSet::new();
    seen.insert(&gpio.gate);
    for (idx, pin) in gpio.lanes.iter().enumerate() {
        if !seen.insert(pin) {
            return Err(ContractError::config_validation(
                format!("gpio.lanes[{idx}]"),
                format!("duplicate pin {}", pin.label()),
            ));
        }
    }
    Ok(())
}
