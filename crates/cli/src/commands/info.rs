//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::TimerConfig;
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    server: ServerInfo,
    identity: IdentityInfo,
    pins: PinInfo,
    race: RaceInfo,
}

#[derive(Serialize)]
struct ServerInfo {
    action_url: String,
    log_url: String,
    username: String,
    request_timeout_ms: u64,
}

#[derive(Serialize)]
struct IdentityInfo {
    timer: String,
    human: String,
    device_id: String,
}

#[derive(Serialize)]
struct PinInfo {
    consumer: String,
    gate: String,
    /// Lane 1 first
    lanes: Vec<String>,
}

#[derive(Serialize)]
struct RaceInfo {
    edge: String,
    heartbeat_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    gate_timeout_ms: Option<u64>,
    lane_deadline_ms: u64,
    debounce_us: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &TimerConfig) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", config.version),
        server: ServerInfo {
            action_url: config.server.action_url(),
            log_url: config.server.log_url(),
            username: config.server.username.clone(),
            request_timeout_ms: config.server.request_timeout_ms,
        },
        identity: IdentityInfo {
            timer: config.identity.timer.clone(),
            human: config.identity.human.clone(),
            device_id: config.identity.device_id.clone(),
        },
        pins: PinInfo {
            consumer: config.gpio.consumer.clone(),
            gate: config.gpio.gate.label(),
            lanes: config.gpio.lanes.iter().map(|p| p.label()).collect(),
        },
        race: RaceInfo {
            edge: config.race.edge.to_string(),
            heartbeat_interval_ms: config.race.heartbeat_interval_ms,
            gate_timeout_ms: config.race.gate_timeout().map(|t| t.as_millis() as u64),
            lane_deadline_ms: config.race.lane_deadline_ms,
            debounce_us: config.race.debounce_us,
        },
    }
}

fn print_config_info(config: &TimerConfig) {
    println!("GPIO Timer Configuration\n");

    println!("Server");
    println!("   ├─ Action: {}", config.server.action_url());
    println!("   ├─ Log: {}", config.server.log_url());
    println!("   └─ Role: {}", config.server.username);

    println!("\nIdentity");
    println!("   ├─ Timer: {}", config.identity.timer);
    println!("   └─ Name: {}", config.identity.human);

    let gpio = &config.gpio;
    println!("\nPins ({})", gpio.consumer);
    println!("   ├─ Gate: {} ({})", gpio.gate.label(), gpio.gate.chip_path());
    for (i, pin) in gpio.lanes.iter().enumerate() {
        let prefix = if i == gpio.lanes.len() - 1 { "└─" } else { "├─" };
        println!("   {} Lane {}: {} ({})", prefix, i + 1, pin.label(), pin.chip_path());
    }

    let race = &config.race;
    println!("\nRace");
    println!("   ├─ Edge: {}", race.edge);
    println!("   ├─ Heartbeat: {} ms", race.heartbeat_interval_ms);
    match race.gate_timeout() {
        Some(timeout) => println!("   ├─ Gate timeout: {} ms", timeout.as_millis()),
        None => println!("   ├─ Gate timeout: none"),
    }
    println!("   ├─ Lane deadline: {} ms", race.lane_deadline_ms);
    println!("   └─ Debounce: {} µs", race.debounce_us);

    println!();
}
