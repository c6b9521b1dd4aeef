//! Dashboard data model
//!
//! Defines the vehicle configuration both engines are built from and the
//! snapshot types handed to subscribers. Snapshots are plain values: a
//! listener holding one cannot reach back into engine state.

use crate::error::ConfigError;
use crate::geo::GeoPoint;
use crate::units::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static vehicle parameters, fixed for the lifetime of a simulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleConfig {
    /// Battery capacity (informational only, not used by the physics)
    pub battery_capacity: KilowattHours,

    /// Top speed
    pub max_speed: KilometersPerHour,

    /// Maximum payload
    pub payload: Kilograms,

    /// Range at full charge
    pub range: Kilometers,
}

impl VehicleConfig {
    pub fn new(battery_capacity_kwh: f64, max_speed_kmh: f64, payload_kg: f64, range_km: f64) -> Self {
        Self {
            battery_capacity: KilowattHours(battery_capacity_kwh),
            max_speed: KilometersPerHour(max_speed_kmh),
            payload: Kilograms(payload_kg),
            range: Kilometers(range_km),
        }
    }

    /// Reject configurations the physics cannot run with
    ///
    /// Top speed and range divide or scale every tick, so both must be finite
    /// and strictly positive. Payload and capacity only need to be finite and
    /// non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NotPositive { field, value })
            }
        }

        fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Negative { field, value })
            }
        }

        positive("maxSpeed", self.max_speed.0)?;
        positive("range", self.range.0)?;
        non_negative("payload", self.payload.0)?;
        non_negative("batteryCapacity", self.battery_capacity.0)?;
        Ok(())
    }
}

impl Default for VehicleConfig {
    /// The urban scooter, used when no vehicle has been selected
    fn default() -> Self {
        Self::new(1.2, 40.0, 120.0, 50.0)
    }
}

/// Instantaneous telemetry for one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryState {
    /// When this snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Number of ticks applied so far
    pub tick: u64,

    pub speed: KilometersPerHour,

    /// State of charge, 0 to 100
    pub battery_level: Percent,

    /// Range left at the current charge
    pub estimated_range: Kilometers,

    pub motor_temperature: Celsius,

    /// Carried load, half the configured maximum
    pub payload_weight: Kilograms,

    /// Odometer, never decreases
    pub total_distance: Kilometers,

    pub power_usage: Kilowatts,

    /// Power recovered while braking, zero otherwise
    pub regeneration: Kilowatts,

    /// Number of brake applications (rising edges only)
    pub brakes_applied: u32,
}

impl TelemetryState {
    /// Resting state for a freshly built vehicle
    pub fn initial(config: &VehicleConfig) -> Self {
        Self {
            timestamp: Utc::now(),
            tick: 0,
            speed: KilometersPerHour(0.0),
            battery_level: Percent::FULL,
            estimated_range: config.range,
            motor_temperature: Celsius(25.0),
            payload_weight: Kilograms(config.payload.0 * 0.5),
            total_distance: Kilometers(0.0),
            power_usage: Kilowatts(0.0),
            regeneration: Kilowatts(0.0),
            brakes_applied: 0,
        }
    }
}

/// What the drive controls currently ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Accelerating,
    Braking,
    Coasting,
}

impl DriveMode {
    /// Braking always wins over the accelerator
    pub fn from_controls(accelerating: bool, braking: bool) -> Self {
        match (accelerating, braking) {
            (_, true) => DriveMode::Braking,
            (true, false) => DriveMode::Accelerating,
            (false, false) => DriveMode::Coasting,
        }
    }
}

/// Lifecycle of a route simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePhase {
    Idle,
    Running,
    Completed,
}

/// Battery level at or below which the route stats flag a warning
pub const LOW_BATTERY_THRESHOLD: f64 = 30.0;

/// Observable state of a route simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub phase: RoutePhase,

    /// Current vehicle position, `None` while idle
    pub vehicle_position: Option<GeoPoint>,

    pub distance_covered: Kilometers,

    pub speed: KilometersPerHour,

    pub battery: Percent,

    pub low_battery: bool,
}

impl RouteSnapshot {
    pub fn idle(speed: KilometersPerHour, battery_total: Percent) -> Self {
        Self {
            phase: RoutePhase::Idle,
            vehicle_position: None,
            distance_covered: Kilometers(0.0),
            speed,
            battery: battery_total,
            low_battery: battery_total.0 <= LOW_BATTERY_THRESHOLD,
        }
    }
}
