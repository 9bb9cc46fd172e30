//! Config parsing
//!
//! Supports TOML (primary) and JSON.

use contracts::{ContractError, TimerConfig};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML config
pub fn parse_toml(content: &str) -> Result<TimerConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON config
pub fn parse_json(content: &str) -> Result<TimerConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<TimerConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Edge;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[server]
base_url = "http://derby.local"

[race]
lane_deadline_ms = 15000
edge = "falling"

[gpio]
gate = { chip = "gpiochip1", line = 28 }
lanes = [
  { chip = "gpiochip2", line = 24 },
  { chip = "gpiochip2", line = 25 },
  { chip = "gpiochip2", line = 20 },
  { chip = "gpiochip2", line = 21 },
]
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.base_url, "http://derby.local");
        assert_eq!(config.race.lane_deadline_ms, 15000);
        assert_eq!(config.race.edge, Edge::Falling);
        assert_eq!(config.gpio.lanes.len(), 4);
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.identity.human, "GPIO Timer");
        assert_eq!(config.gpio.lanes.len(), 4);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "identity": { "timer": "bench-timer", "human": "Bench" },
            "race": { "heartbeat_interval_ms": 1000 }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert_eq!(result.unwrap().identity.timer, "bench-timer");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
