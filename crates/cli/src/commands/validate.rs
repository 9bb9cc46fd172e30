//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::TimerConfig;
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    action_url: String,
    log_url: String,
    gate: String,
    lanes: Vec<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    action_url: config.server.action_url(),
                    log_url: config.server.log_url(),
                    gate: config.gpio.gate.label(),
                    lanes: config.gpio.lanes.iter().map(|p| p.label()).collect(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{e:#}")),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &TimerConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let race = &config.race;

    if race.gate_timeout().is_none() {
        warnings.push("race.gate_timeout_ms is 0 - the gate wait never times out".to_string());
    }

    if race.heartbeat_interval_ms >= config.server.request_timeout_ms.saturating_mul(4) {
        warnings.push(format!(
            "race.heartbeat_interval_ms ({}) is long compared to the request timeout ({} ms)",
            race.heartbeat_interval_ms, config.server.request_timeout_ms
        ));
    }

    if !config.server.base_url.starts_with("https://") && !config.server.password.is_empty() {
        warnings.push("server.password is sent over plain http".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Action URL: {}", summary.action_url);
            println!("  Log URL: {}", summary.log_url);
            println!("  Gate: {}", summary.gate);
            println!("  Lanes: {}", summary.lanes.join(", "));
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
