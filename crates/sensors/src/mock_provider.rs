//! Mock line provider
//!
//! Hands out `MockLine`s and keeps them addressable by pin so tests and the
//! simulator can trigger transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{EdgeLine, PinConfig};
use tracing::instrument;

use crate::error::Result;
use crate::mock_line::{MockLine, MockLineConfig};
use crate::provider::LineProvider;

/// Mock provider configuration
#[derive(Debug, Clone, Default)]
pub struct MockProviderConfig {
    /// Config for the gate pin (matched by `gate_pin`)
    pub gate: MockLineConfig,
    /// Config for every other pin
    pub lanes: MockLineConfig,
    /// Pin that receives the gate config
    pub gate_pin: Option<PinConfig>,
}

impl MockProviderConfig {
    /// Gate opens one to two seconds after arming; cars finish
    /// within 2.5 to 4.5 seconds of the lanes being armed.
    pub fn simulated(gate_pin: PinConfig) -> Self {
        Self {
            gate: MockLineConfig::auto_fire(Duration::from_millis(1000), Duration::from_millis(2000)),
            lanes: MockLineConfig::auto_fire(Duration::from_millis(2500), Duration::from_millis(4500)),
            gate_pin: Some(gate_pin),
        }
    }
}

/// Mock line provider
#[derive(Default)]
pub struct MockLineProvider {
    config: MockProviderConfig,
    lines: Mutex<HashMap<PinConfig, Arc<MockLine>>>,
}

impl MockLineProvider {
    /// Provider whose lines only fire on `trigger()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with configuration
    pub fn with_config(config: MockProviderConfig) -> Self {
        Self {
            config,
            lines: Mutex::new(HashMap::new()),
        }
    }

    /// Line previously handed out for `pin`
    pub fn get(&self, pin: &PinConfig) -> Option<Arc<MockLine>> {
        self.lines.lock().unwrap().get(pin).cloned()
    }

    /// Number of lines handed out
    pub fn line_count(&self) -> usize {
        self.lines.lock().unwrap().len()
    }
}

impl LineProvider for MockLineProvider {
    fn backend(&self) -> &'static str {
        "mock"
    }

    #[instrument(name = "mock_provider_line", skip(self, _consumer), fields(pin = %pin.label()))]
    fn line(&self, pin: &PinConfig, _consumer: &str) -> Result<Arc<dyn EdgeLine>> {
        let mut lines = self.lines.lock().unwrap();
        let line = lines
            .entry(pin.clone())
            .or_insert_with(|| {
                let config = if self.config.gate_pin.as_ref() == Some(pin) {
                    self.config.gate.clone()
                } else {
                    self.config.lanes.clone()
                };
                Arc::new(MockLine::with_config(&pin.chip, pin.line, config))
            })
            .clone();
        Ok(line)
    }
}
