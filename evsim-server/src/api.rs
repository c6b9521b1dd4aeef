//! REST API and SSE routes

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use evsim_core::{
    presets, DriveMode, GeoPoint, RouteSnapshot, TelemetryState, VehicleConfig, VehiclePreset,
};
use evsim_engine::{DrillReport, PickTarget};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicle", post(select_vehicle))
        .route("/api/telemetry", get(get_telemetry))
        .route("/api/telemetry/stream", get(telemetry_stream))
        .route("/api/telemetry/control", post(telemetry_control))
        // Route simulation
        .route("/api/route", get(get_route))
        .route("/api/route/stream", get(route_stream))
        .route("/api/route/pick", post(route_pick))
        .route("/api/route/point", post(route_point))
        .route("/api/route/path", post(route_path))
        .route("/api/route/start", post(route_start))
        .route("/api/route/stop", post(route_stop))
        .route("/api/route/speed", put(route_speed))
        // Safety drills
        .route("/api/safety", get(safety_report))
        .route("/api/safety/emergency-braking", post(start_emergency_braking))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Vehicle Endpoints ===

async fn list_vehicles() -> Json<&'static [VehiclePreset]> {
    Json(presets::all())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectVehicleRequest {
    Preset { id: String },
    Custom { config: VehicleConfig },
}

async fn select_vehicle(
    State(state): State<AppState>,
    Json(request): Json<SelectVehicleRequest>,
) -> ApiResult<TelemetryResponse> {
    let (id, config) = match request {
        SelectVehicleRequest::Preset { id } => {
            let preset = presets::find(&id).map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
            (Some(id), preset.config)
        }
        SelectVehicleRequest::Custom { config } => {
            config
                .validate()
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            (None, config)
        }
    };

    state.select_vehicle(id, config).await;
    Ok(Json(telemetry_response(&state).await))
}

// === Telemetry Endpoints ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryResponse {
    vehicle_id: Option<String>,
    config: VehicleConfig,
    running: bool,
    drive_mode: DriveMode,
    regeneration_level: f64,
    state: TelemetryState,
}

async fn telemetry_response(state: &AppState) -> TelemetryResponse {
    let simulator = state.simulator().await;
    TelemetryResponse {
        vehicle_id: state.vehicle_id.read().await.clone(),
        config: simulator.config(),
        running: simulator.is_running(),
        drive_mode: simulator.drive_mode(),
        regeneration_level: simulator.regeneration_level(),
        state: simulator.snapshot(),
    }
}

async fn get_telemetry(State(state): State<AppState>) -> Json<TelemetryResponse> {
    Json(telemetry_response(&state).await)
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlRequest {
    Accelerate { active: bool },
    Brake { active: bool },
    Regeneration { level: f64 },
    Obstacle,
}

async fn telemetry_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Json<TelemetryResponse> {
    let simulator = state.simulator().await;
    match request {
        ControlRequest::Accelerate { active } => simulator.set_accelerating(active),
        ControlRequest::Brake { active } => simulator.set_braking(active),
        ControlRequest::Regeneration { level } => simulator.set_regeneration_level(level),
        ControlRequest::Obstacle => simulator.inject_obstacle(),
    }
    Json(telemetry_response(&state).await)
}

async fn telemetry_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    snapshot_stream(state.subscribe())
}

// === Route Endpoints ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteResponse {
    origin: Option<GeoPoint>,
    destination: Option<GeoPoint>,
    pending_pick: Option<PickTarget>,
    path: Vec<GeoPoint>,
    can_start: bool,
    active: bool,
    snapshot: RouteSnapshot,
}

async fn route_response(state: &AppState) -> RouteResponse {
    let planner = state.planner.read().await;
    RouteResponse {
        origin: planner.origin(),
        destination: planner.destination(),
        pending_pick: planner.pending_pick(),
        path: planner
            .path()
            .map(|p| p.points().to_vec())
            .unwrap_or_default(),
        can_start: planner.can_start(),
        active: state.route.is_active(),
        snapshot: state.route.snapshot(),
    }
}

async fn get_route(State(state): State<AppState>) -> Json<RouteResponse> {
    Json(route_response(&state).await)
}

async fn route_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    snapshot_stream(state.subscribe_route())
}

#[derive(Deserialize)]
struct PickRequest {
    /// None cancels a pending pick
    target: Option<PickTarget>,
}

async fn route_pick(
    State(state): State<AppState>,
    Json(request): Json<PickRequest>,
) -> Json<RouteResponse> {
    {
        let mut planner = state.planner.write().await;
        match request.target {
            Some(target) => planner.begin_pick(target),
            None => planner.cancel_pick(),
        }
    }
    Json(route_response(&state).await)
}

#[derive(Deserialize)]
struct PointRequest {
    lat: f64,
    lon: f64,
    /// Set this endpoint directly instead of the armed pick
    target: Option<PickTarget>,
}

async fn route_point(
    State(state): State<AppState>,
    Json(request): Json<PointRequest>,
) -> ApiResult<RouteResponse> {
    let point = GeoPoint::new(request.lat, request.lon);
    if !point.is_finite() {
        return Err((StatusCode::BAD_REQUEST, "Coordinates must be finite".to_string()));
    }

    {
        let mut planner = state.planner.write().await;
        match request.target {
            Some(target) => planner.set(target, point),
            None => {
                planner.pick(point).ok_or((
                    StatusCode::CONFLICT,
                    "No endpoint is waiting for a pick".to_string(),
                ))?;
            }
        }
        sync_active_path(&state, &planner);
    }
    Ok(Json(route_response(&state).await))
}

#[derive(Deserialize)]
struct PathRequest {
    points: Vec<GeoPoint>,
}

async fn route_path(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<RouteResponse> {
    {
        let mut planner = state.planner.write().await;
        if !planner.set_resolved_path(request.points) {
            return Err((
                StatusCode::BAD_REQUEST,
                "Path needs at least two finite points starting at the origin".to_string(),
            ));
        }
        sync_active_path(&state, &planner);
    }
    Ok(Json(route_response(&state).await))
}

/// A running route follows endpoint edits
fn sync_active_path(state: &AppState, planner: &evsim_engine::RoutePlanner) {
    if !state.route.is_active() {
        return;
    }
    if let Some(path) = planner.path() {
        state.route.set_path(path.points().to_vec());
    }
}

async fn route_start(State(state): State<AppState>) -> ApiResult<RouteResponse> {
    {
        let planner = state.planner.read().await;
        if state.route.is_active() {
            return Err((StatusCode::CONFLICT, "Route is already running".to_string()));
        }
        let path = match planner.path() {
            Some(path) if planner.can_start() => path,
            _ => {
                return Err((
                    StatusCode::CONFLICT,
                    "Set distinct origin and destination first".to_string(),
                ))
            }
        };
        state.route.set_path(path.points().to_vec());
        state.route.set_active(true);
    }
    tracing::info!("Route started");
    Ok(Json(route_response(&state).await))
}

async fn route_stop(State(state): State<AppState>) -> Json<RouteResponse> {
    state.route.set_active(false);
    Json(route_response(&state).await)
}

#[derive(Deserialize)]
struct SpeedRequest {
    speed: f64,
}

async fn route_speed(
    State(state): State<AppState>,
    Json(request): Json<SpeedRequest>,
) -> ApiResult<RouteResponse> {
    if !request.speed.is_finite() || request.speed < 0.0 {
        return Err((StatusCode::BAD_REQUEST, "Speed must be a non-negative number".to_string()));
    }
    state.route.set_speed(request.speed);
    Ok(Json(route_response(&state).await))
}

// === Safety Endpoints ===

async fn safety_report(State(state): State<AppState>) -> Json<DrillReport> {
    Json(state.drill.report())
}

async fn start_emergency_braking(State(state): State<AppState>) -> ApiResult<DrillReport> {
    let simulator = state.simulator().await;
    if !state.drill.start(simulator) {
        return Err((StatusCode::CONFLICT, "A drill is already running".to_string()));
    }
    Ok(Json(state.drill.report()))
}

// === Streams ===

fn snapshot_stream<T>(
    rx: broadcast::Receiver<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(snapshot) => match serde_json::to_string(&snapshot) {
                Ok(json) => Some(Ok(Event::default().data(json))),
                Err(e) => {
                    tracing::error!("Failed to serialize snapshot: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Broadcast stream error: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
