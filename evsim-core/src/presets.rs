//! Built-in vehicle catalogue

use crate::error::ConfigError;
use crate::model::VehicleConfig;
use crate::units::*;
use serde::Serialize;

/// A selectable vehicle with its base configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehiclePreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub config: VehicleConfig,
}

const PRESETS: [VehiclePreset; 4] = [
    VehiclePreset {
        id: "hoverboard",
        name: "NeoGlide Hoverboard",
        description: "Agile personal transporter with advanced stabilization",
        config: VehicleConfig {
            battery_capacity: KilowattHours(0.5),
            max_speed: KilometersPerHour(25.0),
            payload: Kilograms(100.0),
            range: Kilometers(20.0),
        },
    },
    VehiclePreset {
        id: "scooter",
        name: "UrbanZip Scooter",
        description: "High-performance urban commuter with extended range",
        config: VehicleConfig {
            battery_capacity: KilowattHours(1.2),
            max_speed: KilometersPerHour(40.0),
            payload: Kilograms(120.0),
            range: Kilometers(50.0),
        },
    },
    VehiclePreset {
        id: "deliverybot",
        name: "CargoBot Delivery",
        description: "Autonomous delivery robot with intelligent obstacle avoidance",
        config: VehicleConfig {
            battery_capacity: KilowattHours(2.5),
            max_speed: KilometersPerHour(20.0),
            payload: Kilograms(200.0),
            range: Kilometers(80.0),
        },
    },
    // Test rig used by the safety drills
    VehiclePreset {
        id: "safety-rig",
        name: "Safety Test Rig",
        description: "Instrumented platform for emergency braking drills",
        config: VehicleConfig {
            battery_capacity: KilowattHours(1.5),
            max_speed: KilometersPerHour(45.0),
            payload: Kilograms(120.0),
            range: Kilometers(60.0),
        },
    },
];

pub fn all() -> &'static [VehiclePreset] {
    &PRESETS
}

pub fn find(id: &str) -> Result<&'static VehiclePreset, ConfigError> {
    PRESETS
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ConfigError::UnknownVehicle(id.to_string()))
}
