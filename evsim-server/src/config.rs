//! Server configuration
//!
//! Defaults suit a local dashboard. A JSON file named by `EVSIM_CONFIG` may
//! override any subset of fields, and `EVSIM_BIND` overrides the listen
//! address last.

use anyhow::{Context, Result};
use evsim_core::{presets, units::*, VehicleConfig};
use evsim_engine::{RouteOptions, SimulatorOptions};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Dashboard telemetry cadence
    pub telemetry_interval_ms: u64,

    /// Route simulation cadence
    pub route_interval_ms: u64,

    pub default_route_speed_kmh: f64,

    pub route_battery_total: f64,

    /// Preset id used until a vehicle is selected
    pub default_vehicle: String,

    /// Snapshots buffered per SSE subscriber before it starts lagging
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            telemetry_interval_ms: 500,
            route_interval_ms: 80,
            default_route_speed_kmh: 28.0,
            route_battery_total: 100.0,
            default_vehicle: "scooter".to_string(),
            broadcast_capacity: 100,
        }
    }
}

impl ServerConfig {
    /// Load from the environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("EVSIM_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_json(&text).with_context(|| format!("Invalid config file {}", path))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(bind) = std::env::var("EVSIM_BIND") {
            config.bind_addr = bind
                .parse()
                .with_context(|| format!("Invalid EVSIM_BIND address: {}", bind))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.telemetry_interval_ms > 0, "telemetry_interval_ms must be positive");
        anyhow::ensure!(self.route_interval_ms > 0, "route_interval_ms must be positive");
        anyhow::ensure!(self.broadcast_capacity > 0, "broadcast_capacity must be positive");
        anyhow::ensure!(
            self.default_route_speed_kmh.is_finite() && self.default_route_speed_kmh >= 0.0,
            "default_route_speed_kmh must be a non-negative number"
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.route_battery_total),
            "route_battery_total must be between 0 and 100"
        );
        presets::find(&self.default_vehicle)?;
        Ok(())
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn default_vehicle_config(&self) -> VehicleConfig {
        presets::find(&self.default_vehicle)
            .map(|p| p.config)
            .unwrap_or_default()
    }

    pub fn simulator_options(&self) -> SimulatorOptions {
        SimulatorOptions::default()
    }

    pub fn route_options(&self) -> RouteOptions {
        RouteOptions {
            interval: Duration::from_millis(self.route_interval_ms),
            speed: KilometersPerHour(self.default_route_speed_kmh),
            battery_total: Percent::new(self.route_battery_total),
            ..RouteOptions::default()
        }
    }
}
