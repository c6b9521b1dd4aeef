//! Application state management

use crate::config::ServerConfig;
use evsim_core::{RouteSnapshot, TelemetryState, VehicleConfig};
use evsim_engine::{EmergencyBrakingDrill, RoutePlanner, RouteSimulation, TelemetrySimulator};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// Dashboard simulator; replaced wholesale when the vehicle changes
    pub telemetry: Arc<RwLock<TelemetrySimulator>>,

    /// Preset id of the current vehicle (None for a custom config)
    pub vehicle_id: Arc<RwLock<Option<String>>>,

    /// Broadcast channel for telemetry snapshots
    /// Multiple consumers can subscribe to receive snapshots
    pub telemetry_tx: broadcast::Sender<TelemetryState>,

    pub route: RouteSimulation,

    pub planner: Arc<RwLock<RoutePlanner>>,

    /// Broadcast channel for route snapshots
    pub route_tx: broadcast::Sender<RouteSnapshot>,

    pub drill: EmergencyBrakingDrill,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let (telemetry_tx, _) = broadcast::channel(config.broadcast_capacity);
        let (route_tx, _) = broadcast::channel(config.broadcast_capacity);

        let telemetry = build_simulator(&config, config.default_vehicle_config(), &telemetry_tx);

        let route = RouteSimulation::new(config.route_options());
        let tx = route_tx.clone();
        let _forward = route.subscribe(move |snapshot| {
            // No receivers is not an error
            let _ = tx.send(*snapshot);
        });
        route.on_end(|sim| {
            info!("Route completed");
            sim.set_active(false);
        });

        Self {
            vehicle_id: Arc::new(RwLock::new(Some(config.default_vehicle.clone()))),
            config: Arc::new(config),
            telemetry: Arc::new(RwLock::new(telemetry)),
            telemetry_tx,
            route,
            planner: Arc::new(RwLock::new(RoutePlanner::new())),
            route_tx,
            drill: EmergencyBrakingDrill::default(),
        }
    }

    /// Start the dashboard telemetry ticker. Needs a tokio runtime.
    pub async fn start(&self) {
        let telemetry = self.telemetry.read().await;
        telemetry.start(self.config.telemetry_interval());
    }

    /// Current simulator handle
    pub async fn simulator(&self) -> TelemetrySimulator {
        self.telemetry.read().await.clone()
    }

    /// Swap in a fresh simulator for `config`
    ///
    /// The old simulator is stopped and any drill against it is cancelled. The
    /// new one starts ticking if the old one was.
    pub async fn select_vehicle(&self, id: Option<String>, config: VehicleConfig) {
        self.drill.cancel();

        let replacement = build_simulator(&self.config, config, &self.telemetry_tx);
        let mut telemetry = self.telemetry.write().await;
        let was_running = telemetry.is_running();
        telemetry.stop();
        if was_running {
            replacement.start(self.config.telemetry_interval());
        }
        *telemetry = replacement;
        drop(telemetry);

        info!("Vehicle changed to {}", id.as_deref().unwrap_or("custom"));
        *self.vehicle_id.write().await = id;
    }

    /// Subscribe to telemetry snapshots
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryState> {
        self.telemetry_tx.subscribe()
    }

    /// Subscribe to route snapshots
    pub fn subscribe_route(&self) -> broadcast::Receiver<RouteSnapshot> {
        self.route_tx.subscribe()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

fn build_simulator(
    config: &ServerConfig,
    vehicle: VehicleConfig,
    tx: &broadcast::Sender<TelemetryState>,
) -> TelemetrySimulator {
    let simulator = TelemetrySimulator::with_options(vehicle, config.simulator_options());
    let tx = tx.clone();
    let _forward = simulator.subscribe(move |state| {
        let _ = tx.send(*state);
    });
    simulator
}
