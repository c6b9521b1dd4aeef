//! Geographic helpers: points, great-circle distance and polyline walking
//!
//! Coordinates are WGS84 decimal degrees. No range validation is performed;
//! callers are expected to pass real coordinates.

use crate::units::Kilometers;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Linear interpolation in lat/lon space (not geodesic)
    pub fn lerp(&self, to: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (to.lat - self.lat) * t,
            lon: self.lon + (to.lon - self.lon) * t,
        }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points
pub fn haversine(a: &GeoPoint, b: &GeoPoint) -> Kilometers {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    Kilometers(EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt()))
}

/// A path of two or more points with precomputed segment lengths
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<GeoPoint>,
    /// Distance from the first point to each point, same length as `points`
    cumulative: Vec<f64>,
}

impl Polyline {
    /// Build a polyline. Returns `None` for fewer than two points or any
    /// non-finite coordinate.
    pub fn new(points: Vec<GeoPoint>) -> Option<Self> {
        if points.len() < 2 || points.iter().any(|p| !p.is_finite()) {
            return None;
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += haversine(&pair[0], &pair[1]).0;
            cumulative.push(total);
        }

        Some(Self { points, cumulative })
    }

    /// Straight two-point line
    pub fn straight(origin: GeoPoint, destination: GeoPoint) -> Option<Self> {
        Self::new(vec![origin, destination])
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn origin(&self) -> GeoPoint {
        self.points[0]
    }

    pub fn destination(&self) -> GeoPoint {
        self.points[self.points.len() - 1]
    }

    pub fn total_distance(&self) -> Kilometers {
        Kilometers(self.cumulative[self.cumulative.len() - 1])
    }

    /// Position at `fraction` (0.0 to 1.0) of the total length, interpolated
    /// linearly inside the containing segment
    pub fn point_at_fraction(&self, fraction: f64) -> GeoPoint {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction >= 1.0 {
            return self.destination();
        }

        let total = self.total_distance().0;
        if total <= 0.0 {
            return self.origin();
        }

        let target = total * fraction;
        // First segment whose end lies beyond the target distance
        let seg = self
            .cumulative
            .iter()
            .skip(1)
            .position(|&d| d > target)
            .unwrap_or(self.points.len() - 2);

        let start = self.cumulative[seg];
        let len = self.cumulative[seg + 1] - start;
        let t = if len > 0.0 { (target - start) / len } else { 0.0 };
        self.points[seg].lerp(&self.points[seg + 1], t)
    }
}
