//! Integration tests for the evsim-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use evsim_server::{api::create_router, config::ServerConfig, state::AppState};
use http_body_util::BodyExt;
use hyper::Request;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper: build a router with fresh AppState
fn app() -> axum::Router {
    create_router(AppState::new(ServerConfig::default()))
}

/// Helper: build a router with AppState returned for further manipulation
fn app_with_state() -> (axum::Router, AppState) {
    let state = AppState::new(ServerConfig::default());
    let router = create_router(state.clone());
    (router, state)
}

/// Helper: collect response body into string
async fn body_string(body: Body) -> String {
    let collected = body.collect().await.unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap()
}

async fn get(app: &axum::Router, uri: &str) -> (u16, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, body_string(response.into_body()).await)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Value) -> (u16, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, body_string(response.into_body()).await)
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).expect("response should be JSON")
}

// ==================== Vehicles ====================

#[tokio::test]
async fn test_get_vehicles_lists_presets() {
    let (status, body) = get(&app(), "/api/vehicles").await;
    assert_eq!(status, 200);

    let presets = parse(&body);
    let ids: Vec<&str> = presets
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["hoverboard", "scooter", "deliverybot", "safety-rig"]);
    assert_eq!(presets[1]["config"]["maxSpeed"], 40.0);
}

#[tokio::test]
async fn test_select_preset_vehicle() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/vehicle", json!({ "id": "hoverboard" })).await;
    assert_eq!(status, 200, "body: {}", body);

    let (_, body) = get(&app, "/api/telemetry").await;
    let telemetry = parse(&body);
    assert_eq!(telemetry["vehicleId"], "hoverboard");
    assert_eq!(telemetry["config"]["maxSpeed"], 25.0);
    assert_eq!(telemetry["state"]["batteryLevel"], 100.0);
}

#[tokio::test]
async fn test_select_unknown_vehicle_returns_404() {
    let (status, _) = send(&app(), "POST", "/api/vehicle", json!({ "id": "tank" })).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_select_custom_vehicle_validates_config() {
    let app = app();
    let invalid = json!({ "config": {
        "batteryCapacity": 1.0, "maxSpeed": 0.0, "payload": 50.0, "range": 10.0
    }});
    let (status, body) = send(&app, "POST", "/api/vehicle", invalid).await;
    assert_eq!(status, 400);
    assert!(body.contains("maxSpeed"), "body: {}", body);

    let valid = json!({ "config": {
        "batteryCapacity": 2.0, "maxSpeed": 30.0, "payload": 80.0, "range": 35.0
    }});
    let (status, body) = send(&app, "POST", "/api/vehicle", valid).await;
    assert_eq!(status, 200);
    let telemetry = parse(&body);
    assert_eq!(telemetry["vehicleId"], Value::Null);
    assert_eq!(telemetry["state"]["estimatedRange"], 35.0);
    assert_eq!(telemetry["state"]["payloadWeight"], 40.0);
}

#[tokio::test]
async fn test_vehicle_change_keeps_ticker_running() {
    let (app, state) = app_with_state();
    state.start().await;
    assert!(state.simulator().await.is_running());

    send(&app, "POST", "/api/vehicle", json!({ "id": "deliverybot" })).await;
    let (_, body) = get(&app, "/api/telemetry").await;
    assert_eq!(parse(&body)["running"], true);
    state.simulator().await.stop();
}

// ==================== Telemetry ====================

#[tokio::test]
async fn test_get_telemetry_starts_at_rest() {
    let (status, body) = get(&app(), "/api/telemetry").await;
    assert_eq!(status, 200);

    let telemetry = parse(&body);
    assert_eq!(telemetry["vehicleId"], "scooter");
    assert_eq!(telemetry["running"], false);
    assert_eq!(telemetry["driveMode"], "coasting");
    assert_eq!(telemetry["regenerationLevel"], 0.5);
    assert_eq!(telemetry["state"]["speed"], 0.0);
    assert_eq!(telemetry["state"]["brakesApplied"], 0);
}

#[tokio::test]
async fn test_control_accelerate_and_brake() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/telemetry/control",
        json!({ "action": "accelerate", "active": true }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body)["driveMode"], "accelerating");

    let brake = json!({ "action": "brake", "active": true });
    send(&app, "POST", "/api/telemetry/control", brake.clone()).await;
    let (_, body) = send(&app, "POST", "/api/telemetry/control", brake).await;
    let telemetry = parse(&body);
    assert_eq!(telemetry["driveMode"], "braking");
    assert_eq!(telemetry["state"]["brakesApplied"], 1);
}

#[tokio::test]
async fn test_control_regeneration_is_clamped() {
    let (_, body) = send(
        &app(),
        "POST",
        "/api/telemetry/control",
        json!({ "action": "regeneration", "level": 5.0 }),
    )
    .await;
    assert_eq!(parse(&body)["regenerationLevel"], 1.0);
}

#[tokio::test]
async fn test_control_obstacle_applies_brake() {
    let (_, body) = send(
        &app(),
        "POST",
        "/api/telemetry/control",
        json!({ "action": "obstacle" }),
    )
    .await;
    let telemetry = parse(&body);
    assert_eq!(telemetry["driveMode"], "braking");
    assert_eq!(telemetry["state"]["brakesApplied"], 1);
}

#[tokio::test]
async fn test_control_unknown_action_is_rejected() {
    let (status, _) = send(
        &app(),
        "POST",
        "/api/telemetry/control",
        json!({ "action": "teleport" }),
    )
    .await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_telemetry_stream_is_event_stream() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/telemetry/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(
        content_type.contains("text/event-stream"),
        "Expected text/event-stream, got: {}",
        content_type
    );
}

#[tokio::test]
async fn test_ticks_reach_broadcast_subscribers() {
    let state = AppState::new(ServerConfig {
        telemetry_interval_ms: 10,
        ..ServerConfig::default()
    });
    let mut rx = state.subscribe();
    state.start().await;

    let snapshot = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("tick within timeout")
        .unwrap();
    assert_eq!(snapshot.tick, 1);
    state.simulator().await.stop();
}

// ==================== Route ====================

#[tokio::test]
async fn test_route_starts_idle() {
    let (status, body) = get(&app(), "/api/route").await;
    assert_eq!(status, 200);

    let route = parse(&body);
    assert_eq!(route["canStart"], false);
    assert_eq!(route["active"], false);
    assert_eq!(route["snapshot"]["phase"], "idle");
    assert_eq!(route["snapshot"]["speed"], 28.0);
    assert_eq!(route["snapshot"]["vehiclePosition"], Value::Null);
}

#[tokio::test]
async fn test_route_start_without_endpoints_conflicts() {
    let (status, _) = send(&app(), "POST", "/api/route/start", json!({})).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_point_without_pick_conflicts() {
    let (status, _) = send(&app(), "POST", "/api/route/point", json!({ "lat": 1.0, "lon": 2.0 })).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_pick_endpoints_and_run_route() {
    let app = app();

    let (_, body) = send(&app, "POST", "/api/route/pick", json!({ "target": "origin" })).await;
    assert_eq!(parse(&body)["pendingPick"], "origin");
    send(&app, "POST", "/api/route/point", json!({ "lat": 0.0, "lon": 0.0 })).await;

    send(&app, "POST", "/api/route/pick", json!({ "target": "destination" })).await;
    let (status, body) =
        send(&app, "POST", "/api/route/point", json!({ "lat": 0.0, "lon": 0.01 })).await;
    assert_eq!(status, 200);
    let route = parse(&body);
    assert_eq!(route["canStart"], true);
    assert_eq!(route["pendingPick"], Value::Null);
    assert_eq!(route["path"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "POST", "/api/route/start", json!({})).await;
    assert_eq!(status, 200);
    let route = parse(&body);
    assert_eq!(route["active"], true);
    assert_eq!(route["snapshot"]["phase"], "running");
    // Along the equator, so the latitude holds even if a tick has already run
    assert_eq!(route["snapshot"]["vehiclePosition"]["lat"], 0.0);

    let (status, _) = send(&app, "POST", "/api/route/start", json!({})).await;
    assert_eq!(status, 409, "second start while running");

    let (_, body) = send(&app, "POST", "/api/route/stop", json!({})).await;
    let route = parse(&body);
    assert_eq!(route["active"], false);
    assert_eq!(route["snapshot"]["phase"], "idle");
}

#[tokio::test]
async fn test_resolved_path_must_start_at_origin() {
    let app = app();
    send(&app, "POST", "/api/route/point", json!({ "lat": 0.0, "lon": 0.0, "target": "origin" })).await;
    send(&app, "POST", "/api/route/point", json!({ "lat": 0.1, "lon": 0.1, "target": "destination" })).await;

    let routed = json!({ "points": [
        { "lat": 0.0, "lon": 0.0 },
        { "lat": 0.05, "lon": 0.0 },
        { "lat": 0.1, "lon": 0.1 }
    ]});
    let (status, body) = send(&app, "POST", "/api/route/path", routed).await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body)["path"].as_array().unwrap().len(), 3);

    let elsewhere = json!({ "points": [{ "lat": 9.0, "lon": 9.0 }, { "lat": 0.1, "lon": 0.1 }] });
    let (status, _) = send(&app, "POST", "/api/route/path", elsewhere).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_route_speed_update() {
    let app = app();
    let (status, _) = send(&app, "PUT", "/api/route/speed", json!({ "speed": -5.0 })).await;
    assert_eq!(status, 400);

    let (status, body) = send(&app, "PUT", "/api/route/speed", json!({ "speed": 40.0 })).await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body)["snapshot"]["speed"], 40.0);
}

// ==================== Safety ====================

#[tokio::test]
async fn test_emergency_braking_drill_lifecycle() {
    let app = app();
    let (_, body) = get(&app, "/api/safety").await;
    let report = parse(&body);
    assert_eq!(report["status"], "idle");
    assert_eq!(report["safetyScore"], 85);

    let (status, body) = send(&app, "POST", "/api/safety/emergency-braking", json!({})).await;
    assert_eq!(status, 200);
    let report = parse(&body);
    assert_eq!(report["status"], "running");
    assert!(report["startedAt"].is_string());

    let (status, _) = send(&app, "POST", "/api/safety/emergency-braking", json!({})).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_vehicle_change_cancels_drill() {
    let (app, state) = app_with_state();
    send(&app, "POST", "/api/safety/emergency-braking", json!({})).await;
    send(&app, "POST", "/api/vehicle", json!({ "id": "safety-rig" })).await;

    assert_eq!(state.drill.report().status, evsim_engine::DrillStatus::Idle);
}
