//! Integration tests for the TelemetrySimulator timer lifecycle
//!
//! All tests run on a paused tokio clock, so sleeps advance virtual time and
//! tick counts are exact.

use evsim_core::{model::*, presets};
use evsim_engine::{SimulatorOptions, TelemetrySimulator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn simulator(max_speed: f64) -> TelemetrySimulator {
    TelemetrySimulator::with_options(
        VehicleConfig::new(1.2, max_speed, 120.0, 50.0),
        SimulatorOptions::deterministic(),
    )
}

fn counter(sim: &TelemetrySimulator) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let _sub = sim.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn test_new_simulator_is_at_rest() {
    let sim = TelemetrySimulator::new(presets::find("scooter").unwrap().config);
    let state = sim.snapshot();

    assert!(!sim.is_running());
    assert_eq!(state.speed.0, 0.0);
    assert_eq!(state.battery_level.0, 100.0);
    assert_eq!(state.estimated_range.0, 50.0);
    assert_eq!(state.motor_temperature.0, 25.0);
    assert_eq!(state.payload_weight.0, 60.0);
    assert_eq!(state.total_distance.0, 0.0);
    assert_eq!(state.power_usage.0, 0.0);
    assert_eq!(state.regeneration.0, 0.0);
    assert_eq!(state.brakes_applied, 0);
}

#[test]
fn test_stop_when_not_running_is_noop() {
    let sim = simulator(40.0);
    sim.stop();
    sim.stop();
    assert!(!sim.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_ticks_notify_every_subscriber() {
    let sim = simulator(40.0);
    let first = counter(&sim);
    let second = counter(&sim);

    sim.start(Duration::from_millis(500));
    sleep(Duration::from_millis(2600)).await;

    assert_eq!(first.load(Ordering::SeqCst), 5);
    assert_eq!(second.load(Ordering::SeqCst), 5);
    assert_eq!(sim.snapshot().tick, 5);
}

#[tokio::test(start_paused = true)]
async fn test_restart_does_not_double_ticks() {
    let sim = simulator(40.0);
    let count = counter(&sim);

    sim.start(Duration::from_millis(500));
    sim.start(Duration::from_millis(500));
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(sim.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_ticks() {
    let sim = simulator(40.0);
    let count = counter(&sim);

    sim.start(Duration::from_millis(100));
    sleep(Duration::from_millis(350)).await;
    sim.stop();
    let seen = count.load(Ordering::SeqCst);
    sleep(Duration::from_secs(5)).await;

    assert_eq!(seen, 3);
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert!(!sim.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_delivery() {
    let sim = simulator(40.0);
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let sub = sim.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    sim.start(Duration::from_millis(100));
    sleep(Duration::from_millis(250)).await;
    sub.unsubscribe();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_is_a_copy() {
    let sim = simulator(40.0);
    let seen: Arc<Mutex<Vec<TelemetryState>>> = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let _sub = sim.subscribe(move |state| {
        let mut copy = *state;
        copy.speed.0 = 9999.0;
        s.lock().unwrap().push(copy);
    });

    sim.set_accelerating(true);
    sim.start(Duration::from_secs(1));
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(sim.snapshot().speed.0, 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_speed_and_battery_stay_in_bounds_with_noise() {
    let sim = TelemetrySimulator::with_options(
        VehicleConfig::new(0.5, 25.0, 100.0, 20.0),
        SimulatorOptions {
            seed: Some(11),
            ..SimulatorOptions::default()
        },
    );
    let violations = Arc::new(AtomicUsize::new(0));
    let v = Arc::clone(&violations);
    let _sub = sim.subscribe(move |state| {
        let speed_ok = (0.0..=25.0).contains(&state.speed.0);
        let battery_ok = (0.0..=100.0).contains(&state.battery_level.0);
        if !speed_ok || !battery_ok {
            v.fetch_add(1, Ordering::SeqCst);
        }
    });

    sim.start(Duration::from_millis(100));
    sim.set_accelerating(true);
    sleep(Duration::from_secs(3)).await;
    sim.set_braking(true);
    sleep(Duration::from_secs(1)).await;
    sim.set_braking(false);
    sim.set_accelerating(false);
    sleep(Duration::from_secs(3)).await;
    sim.stop();

    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_total_distance_never_decreases() {
    let sim = simulator(40.0);
    let last = Arc::new(Mutex::new(0.0_f64));
    let decreased = Arc::new(AtomicUsize::new(0));
    let (l, d) = (Arc::clone(&last), Arc::clone(&decreased));
    let _sub = sim.subscribe(move |state| {
        let mut last = l.lock().unwrap();
        if state.total_distance.0 < *last {
            d.fetch_add(1, Ordering::SeqCst);
        }
        *last = state.total_distance.0;
    });

    sim.set_accelerating(true);
    sim.start(Duration::from_millis(200));
    sleep(Duration::from_secs(2)).await;
    sim.set_accelerating(false);
    sim.set_braking(true);
    sleep(Duration::from_secs(2)).await;
    sim.stop();

    assert_eq!(decreased.load(Ordering::SeqCst), 0);
    assert!(*last.lock().unwrap() > 0.0);
}

#[test]
fn test_brake_count_edge_triggered() {
    let sim = simulator(40.0);
    sim.set_braking(true);
    sim.set_braking(true);
    assert_eq!(sim.snapshot().brakes_applied, 1);
}

#[test]
fn test_regeneration_level_clamped() {
    let sim = simulator(40.0);
    sim.set_regeneration_level(5.0);
    assert_eq!(sim.regeneration_level(), 1.0);
    sim.set_regeneration_level(-3.0);
    assert_eq!(sim.regeneration_level(), 0.1);
}

#[tokio::test(start_paused = true)]
async fn test_obstacle_halves_speed_and_releases_brake() {
    let sim = simulator(40.0);
    sim.set_accelerating(true);
    sim.start(Duration::from_secs(1));
    sleep(Duration::from_millis(10_500)).await;
    sim.stop();
    sim.set_accelerating(false);
    assert_eq!(sim.snapshot().speed.0, 40.0);

    sim.inject_obstacle();
    let state = sim.snapshot();
    assert_eq!(state.speed.0, 20.0);
    assert_eq!(state.brakes_applied, 1);
    assert!(sim.is_braking());
    assert_eq!(sim.drive_mode(), DriveMode::Braking);

    sleep(Duration::from_millis(1900)).await;
    assert!(sim.is_braking(), "brake should still be held before the delay");

    sleep(Duration::from_millis(200)).await;
    assert!(!sim.is_braking());
    assert_eq!(sim.snapshot().speed.0, 20.0);
    assert_eq!(sim.snapshot().brakes_applied, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_obstacle_release() {
    let sim = simulator(40.0);
    sim.inject_obstacle();
    assert!(sim.is_braking());

    sim.stop();
    assert!(!sim.is_braking());

    // A later driver brake must survive the cancelled release
    sim.set_braking(true);
    sleep(Duration::from_secs(3)).await;
    assert!(sim.is_braking());
    assert_eq!(sim.snapshot().brakes_applied, 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_obstacle_restarts_release_delay() {
    let sim = simulator(40.0);
    sim.inject_obstacle();
    sleep(Duration::from_millis(1500)).await;
    sim.inject_obstacle();
    sleep(Duration::from_millis(1000)).await;
    assert!(sim.is_braking());
    sleep(Duration::from_millis(1100)).await;
    assert!(!sim.is_braking());
    assert_eq!(sim.snapshot().brakes_applied, 2);
}

#[tokio::test(start_paused = true)]
async fn test_instances_are_independent() {
    let a = simulator(40.0);
    let b = simulator(40.0);
    let a_count = counter(&a);
    let b_count = counter(&b);

    a.set_accelerating(true);
    a.start(Duration::from_millis(500));
    b.start(Duration::from_millis(1000));
    sleep(Duration::from_millis(2100)).await;

    assert_eq!(a_count.load(Ordering::SeqCst), 4);
    assert_eq!(b_count.load(Ordering::SeqCst), 2);
    assert_eq!(a.snapshot().speed.0, 16.0);
    assert_eq!(b.snapshot().speed.0, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_still_ticks() {
    let sim = TelemetrySimulator::new(VehicleConfig::new(1.0, -5.0, 100.0, 20.0));
    let count = counter(&sim);
    sim.set_accelerating(true);
    sim.start(Duration::from_millis(100));
    sleep(Duration::from_millis(1050)).await;

    assert!(sim.is_running());
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert_eq!(sim.snapshot().tick, 10);
    assert_eq!(sim.config(), VehicleConfig::default());
    assert!((0.0..=40.0).contains(&sim.snapshot().speed.0));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_stops_timer() {
    let sim = simulator(40.0);
    let count = counter(&sim);
    sim.start(Duration::from_millis(100));
    sleep(Duration::from_millis(250)).await;
    drop(sim);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_snapshot_serializes_to_camel_case_json() {
    let sim = simulator(40.0);
    let json = serde_json::to_value(sim.snapshot()).expect("snapshot should serialize");
    assert_eq!(json["batteryLevel"], 100.0);
    assert_eq!(json["brakesApplied"], 0);
    assert!(json.get("motorTemperature").is_some());
}
