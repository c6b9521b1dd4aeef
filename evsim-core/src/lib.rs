//! EV Simulation Dashboard Core Library
//!
//! This crate provides the data model shared by the telemetry and route
//! simulation engines: unit newtypes, vehicle configuration and presets,
//! snapshot types and geographic helpers.

pub mod error;
pub mod geo;
pub mod model;
pub mod presets;
pub mod units;

pub use error::ConfigError;
pub use geo::{haversine, GeoPoint, Polyline};
pub use model::{DriveMode, RoutePhase, RouteSnapshot, TelemetryState, VehicleConfig};
pub use presets::VehiclePreset;
