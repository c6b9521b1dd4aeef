//! Type-safe wrappers for physical units
//!
//! Newtype wrappers around f64 so that speeds, distances, temperatures and
//! power figures cannot be mixed up across the dashboard model.
//!
//! All unit types serialize with 4 decimal places to keep SSE payloads small.

use serde::{Deserialize, Serialize};

/// Milliseconds in one hour, used to turn km/h into km per tick
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// Round f64 to 4 decimal places for compact JSON serialization
pub fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Kilometers per hour
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct KilometersPerHour(#[serde(serialize_with = "round4")] pub f64);

impl KilometersPerHour {
    /// Distance covered at this speed over `ms` milliseconds
    pub fn distance_over_ms(&self, ms: f64) -> Kilometers {
        Kilometers(self.0 * ms / MS_PER_HOUR)
    }
}

/// Kilometers
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kilometers(#[serde(serialize_with = "round4")] pub f64);

/// Celsius
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Celsius(#[serde(serialize_with = "round4")] pub f64);

/// Kilowatts (instantaneous power flow)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kilowatts(#[serde(serialize_with = "round4")] pub f64);

/// Kilowatt-hours (battery capacity)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct KilowattHours(#[serde(serialize_with = "round4")] pub f64);

/// Kilograms
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kilograms(#[serde(serialize_with = "round4")] pub f64);

/// Percent on a 0 to 100 scale (battery state of charge)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Percent(#[serde(serialize_with = "round4")] pub f64);

impl Percent {
    pub const FULL: Percent = Percent(100.0);

    /// Create a new percentage, clamping to [0.0, 100.0]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// Get as a fraction (0.0 to 1.0)
    pub fn as_fraction(&self) -> f64 {
        self.0 / 100.0
    }
}
