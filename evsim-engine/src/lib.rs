//! Simulation engines for the EV dashboard
//!
//! Two independent engines: a telemetry simulator that evolves a vehicle's
//! physical state from drive controls, and a route simulation that moves a
//! vehicle along a path. They share no state.

pub mod listeners;
pub mod planner;
pub mod route;
pub mod scenario;
pub mod telemetry;

pub use listeners::{ListenerRegistry, Subscription};
pub use planner::{PickTarget, RoutePlanner};
pub use route::{RouteOptions, RouteRun, RouteSimulation, TickOutcome};
pub use scenario::{DrillReport, DrillStatus, DrillTimings, EmergencyBrakingDrill};
pub use telemetry::{SimulatorOptions, TelemetryModel, TelemetrySimulator};
