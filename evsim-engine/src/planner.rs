//! Origin/destination picking for the route simulation

use evsim_core::{GeoPoint, Polyline};
use serde::{Deserialize, Serialize};

/// Which endpoint the next map pick sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickTarget {
    Origin,
    Destination,
}

/// Route endpoints plus an optional externally resolved path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePlanner {
    origin: Option<GeoPoint>,
    destination: Option<GeoPoint>,
    pending_pick: Option<PickTarget>,
    resolved: Option<Polyline>,
}

impl RoutePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<GeoPoint> {
        self.origin
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    pub fn pending_pick(&self) -> Option<PickTarget> {
        self.pending_pick
    }

    /// Arm the next [`pick`](Self::pick) for `target`
    pub fn begin_pick(&mut self, target: PickTarget) {
        self.pending_pick = Some(target);
    }

    pub fn cancel_pick(&mut self) {
        self.pending_pick = None;
    }

    /// Assign a map point to the armed endpoint. Returns the endpoint that was
    /// set, or `None` when nothing was armed.
    pub fn pick(&mut self, point: GeoPoint) -> Option<PickTarget> {
        let target = self.pending_pick.take()?;
        self.set(target, point);
        Some(target)
    }

    /// Set an endpoint directly. Any resolved path is discarded.
    pub fn set(&mut self, target: PickTarget, point: GeoPoint) {
        match target {
            PickTarget::Origin => self.origin = Some(point),
            PickTarget::Destination => self.destination = Some(point),
        }
        self.resolved = None;
    }

    /// Use a routed polyline instead of the straight line
    ///
    /// It must start at the current origin. Anything shorter than two points,
    /// or a path from elsewhere, falls back to the straight line.
    pub fn set_resolved_path(&mut self, points: Vec<GeoPoint>) -> bool {
        let resolved = Polyline::new(points).filter(|p| Some(p.origin()) == self.origin);
        let accepted = resolved.is_some();
        self.resolved = resolved;
        accepted
    }

    /// Resolved path if any, else the straight line between the endpoints
    pub fn path(&self) -> Option<Polyline> {
        if let Some(resolved) = &self.resolved {
            return Some(resolved.clone());
        }
        Polyline::straight(self.origin?, self.destination?)
    }

    /// Both endpoints set and not the same point
    pub fn can_start(&self) -> bool {
        match (self.origin, self.destination) {
            (Some(o), Some(d)) => o != d,
            _ => false,
        }
    }
}
