//! TimerConfig - Config Loader output
//!
//! Describes the complete timer setup: server endpoints, identity strings,
//! race timing budgets and the GPIO pin map.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Edge;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete timer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Race server endpoints and credentials
    #[serde(default)]
    pub server: ServerConfig,

    /// How the timer introduces itself
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Timing budgets
    #[serde(default)]
    pub race: RaceConfig,

    /// Pin map
    #[serde(default)]
    pub gpio: GpioConfig,
}

/// Race server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Scheme and host, e.g. `http://192.168.0.236`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the action endpoint relative to `base_url`
    #[serde(default = "default_action_path")]
    pub action_path: String,

    /// Path of the timer log endpoint relative to `base_url`
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Login role name
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password (the Timer role normally has none)
    #[serde(default)]
    pub password: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn action_url(&self) -> String {
        join_url(&self.base_url, &self.action_path)
    }

    pub fn log_url(&self) -> String {
        join_url(&self.base_url, &self.log_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            action_path: default_action_path(),
            log_path: default_log_path(),
            username: default_username(),
            password: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn default_base_url() -> String {
    "http://192.168.0.236".to_string()
}

fn default_action_path() -> String {
    "action.php".to_string()
}

fn default_log_path() -> String {
    "post-timer-log.php".to_string()
}

fn default_username() -> String {
    "Timer".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

/// Identity strings sent with IDENTIFIED and FLAGS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Timer implementation id (`timer=`)
    #[serde(default = "default_timer_id")]
    pub timer: String,

    /// Human readable timer name (`human=`)
    #[serde(default = "default_human")]
    pub human: String,

    /// Device id used for the `device-<id>` FLAGS field
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Detected ports reported with FLAGS
    #[serde(default)]
    pub ports: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            timer: default_timer_id(),
            human: default_human(),
            device_id: default_device_id(),
            ports: String::new(),
        }
    }
}

fn default_timer_id() -> String {
    "github.com/Nescient/gpio-timer".to_string()
}

fn default_human() -> String {
    "GPIO Timer".to_string()
}

fn default_device_id() -> String {
    "github.com Nescient gpio-timer".to_string()
}

/// Race loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Interval between HEARTBEAT messages
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Single `wait_for_heat` timeout; the race loop retries
    #[serde(default = "default_heat_wait_timeout_ms")]
    pub heat_wait_timeout_ms: u64,

    /// Gate wait timeout, 0 = wait indefinitely
    #[serde(default)]
    pub gate_timeout_ms: u64,

    /// Budget for all lanes to finish after the gate opens
    #[serde(default = "default_lane_deadline_ms")]
    pub lane_deadline_ms: u64,

    /// Minimum time between accepted transitions on one line
    #[serde(default = "default_debounce_us")]
    pub debounce_us: u64,

    /// Edge the gate and lane sensors trigger on
    #[serde(default)]
    pub edge: Edge,
}

impl RaceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heat_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.heat_wait_timeout_ms)
    }

    /// `None` when the gate wait should block indefinitely
    pub fn gate_timeout(&self) -> Option<Duration> {
        (self.gate_timeout_ms > 0).then(|| Duration::from_millis(self.gate_timeout_ms))
    }

    pub fn lane_deadline(&self) -> Duration {
        Duration::from_millis(self.lane_deadline_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_micros(self.debounce_us)
    }
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heat_wait_timeout_ms: default_heat_wait_timeout_ms(),
            gate_timeout_ms: 0,
            lane_deadline_ms: default_lane_deadline_ms(),
            debounce_us: default_debounce_us(),
            edge: Edge::Rising,
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_heat_wait_timeout_ms() -> u64 {
    10_000
}

fn default_lane_deadline_ms() -> u64 {
    20_000
}

fn default_debounce_us() -> u64 {
    1000
}

/// One GPIO line: chip name and line offset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinConfig {
    pub chip: String,
    pub line: u32,
}

impl PinConfig {
    pub fn new(chip: impl Into<String>, line: u32) -> Self {
        Self {
            chip: chip.into(),
            line,
        }
    }

    /// Device path for the chip (`gpiochip2` -> `/dev/gpiochip2`)
    pub fn chip_path(&self) -> String {
        if self.chip.starts_with('/') {
            self.chip.clone()
        } else {
            format!("/dev/{}", self.chip)
        }
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.chip, self.line)
    }
}

/// Gate and lane pin map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioConfig {
    #[serde(default = "default_gate_pin")]
    pub gate: PinConfig,

    /// Lane 1 first
    #[serde(default = "default_lane_pins")]
    pub lanes: Vec<PinConfig>,

    /// Consumer label reported to the kernel when claiming lines
    #[serde(default = "default_consumer")]
    pub consumer: String,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            gate: default_gate_pin(),
            lanes: default_lane_pins(),
            consumer: default_consumer(),
        }
    }
}

fn default_gate_pin() -> PinConfig {
    PinConfig::new("gpiochip1", 28)
}

fn default_lane_pins() -> Vec<PinConfig> {
    vec![
        PinConfig::new("gpiochip2", 24),
        PinConfig::new("gpiochip2", 25),
        PinConfig::new("gpiochip2", 20),
        PinConfig::new("gpiochip2", 21),
    ]
}

fn default_consumer() -> String {
    "gpio-timer".to_string()
}
