//! Telemetry simulator for a single electric vehicle
//!
//! [`TelemetryModel`] holds the physical state and applies one tick at a time
//! from the current controls. [`TelemetrySimulator`] drives a model from a
//! tokio interval and publishes a snapshot to every subscriber after each tick.

use crate::listeners::{lock, ListenerRegistry, Subscription};
use chrono::Utc;
use evsim_core::{model::*, units::*};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Power draw at top speed
const PEAK_POWER_KW: f64 = 3.0;
/// Regenerated power ceiling before the strength factor
const PEAK_REGEN_KW: f64 = 3.0;
/// Battery loss per tick while standing still
const IDLE_DRAIN: f64 = 0.01;
/// Charge recovered per tick at top speed and full regeneration
const REGEN_CHARGE: f64 = 0.05;
/// Minimum speed for braking to put charge back
const REGEN_MIN_SPEED: f64 = 5.0;
const AMBIENT_TEMP: f64 = 25.0;
/// Motor temperature rise at top speed
const TEMP_RISE: f64 = 50.0;
/// Weight of the previous temperature in the smoothing step
const TEMP_SMOOTHING: f64 = 0.95;

const TEMP_NOISE_SCALE: f64 = 0.5;
const POWER_NOISE_SCALE: f64 = 0.2;

const MIN_REGEN_LEVEL: f64 = 0.1;
const MAX_REGEN_LEVEL: f64 = 1.0;
const DEFAULT_REGEN_LEVEL: f64 = 0.5;

/// Tunables for a simulator instance
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorOptions {
    /// Sensor jitter as a fraction of the value (0 disables noise)
    pub noise_level: f64,

    /// Battery percent lost per tick per 2 kW of net draw
    pub drain_rate: f64,

    /// How long an injected obstacle holds the brake
    pub obstacle_release: Duration,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            noise_level: 0.1,
            drain_rate: 0.05,
            obstacle_release: Duration::from_secs(2),
            seed: None,
        }
    }
}

impl SimulatorOptions {
    /// No sensor noise, fixed seed
    pub fn deterministic() -> Self {
        Self {
            noise_level: 0.0,
            seed: Some(0),
            ..Self::default()
        }
    }
}

// =============================================================================
// TelemetryModel
// =============================================================================

/// Vehicle physics and controls, advanced explicitly with [`step`](Self::step)
pub struct TelemetryModel {
    config: VehicleConfig,
    state: TelemetryState,
    accelerating: bool,
    braking: bool,
    last_braking: bool,
    regeneration_level: f64,
    noise_level: f64,
    drain_rate: f64,
    rng: StdRng,
}

impl TelemetryModel {
    /// Build a model at rest. An invalid config is replaced by the default
    /// vehicle so the physics always has a positive finite top speed.
    pub fn new(config: VehicleConfig, options: &SimulatorOptions) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid vehicle config ({}), using the default vehicle", e);
                VehicleConfig::default()
            }
        };
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            state: TelemetryState::initial(&config),
            accelerating: false,
            braking: false,
            last_braking: false,
            regeneration_level: DEFAULT_REGEN_LEVEL,
            noise_level: options.noise_level,
            drain_rate: options.drain_rate,
            rng,
        }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    /// Copy of the current state
    pub fn state(&self) -> TelemetryState {
        TelemetryState {
            timestamp: Utc::now(),
            ..self.state
        }
    }

    pub fn set_accelerating(&mut self, accelerating: bool) {
        self.accelerating = accelerating;
    }

    /// Counts a brake application only on the released-to-pressed edge
    pub fn set_braking(&mut self, braking: bool) {
        if braking && !self.last_braking {
            self.state.brakes_applied += 1;
        }
        self.braking = braking;
        self.last_braking = braking;
    }

    /// Clamp to [0.1, 1.0]; NaN falls to the minimum
    pub fn set_regeneration_level(&mut self, level: f64) {
        self.regeneration_level = level.max(MIN_REGEN_LEVEL).min(MAX_REGEN_LEVEL);
    }

    pub fn regeneration_level(&self) -> f64 {
        self.regeneration_level
    }

    pub fn is_accelerating(&self) -> bool {
        self.accelerating
    }

    pub fn is_braking(&self) -> bool {
        self.braking
    }

    pub fn drive_mode(&self) -> DriveMode {
        DriveMode::from_controls(self.accelerating, self.braking)
    }

    /// Emergency stop: brake, halve speed, count it
    ///
    /// The pedal edge tracker is left alone, so a later `set_braking(true)`
    /// from the driver still counts as its own application.
    pub fn apply_obstacle(&mut self) {
        self.braking = true;
        self.state.speed = KilometersPerHour((self.state.speed.0 * 0.5).max(0.0));
        self.state.brakes_applied += 1;
    }

    /// Lift the brake held by an obstacle
    pub fn release_obstacle_brake(&mut self) {
        self.braking = false;
    }

    /// Advance by one tick covering `elapsed` of travel time
    pub fn step(&mut self, elapsed: Duration) {
        let max_speed = self.config.max_speed.0;
        let mut speed = self.state.speed.0;

        speed = match self.drive_mode() {
            DriveMode::Accelerating => (speed + max_speed / 10.0).min(max_speed),
            DriveMode::Braking => (speed - max_speed / 5.0).max(0.0),
            DriveMode::Coasting => (speed - 1.0).max(0.0),
        };

        let normalized = speed / max_speed;
        let power = normalized.powi(2) * PEAK_POWER_KW;

        let regeneration = if self.braking {
            (speed / 10.0).min(PEAK_REGEN_KW) * self.regeneration_level
        } else {
            0.0
        };
        let net_power = (power - regeneration).max(0.0);

        let mut battery_change = if speed > 0.0 {
            -self.drain_rate * (net_power / 2.0)
        } else {
            -IDLE_DRAIN
        };
        if self.braking && speed > REGEN_MIN_SPEED {
            battery_change += REGEN_CHARGE * self.regeneration_level * normalized;
        }
        let battery = Percent::new(self.state.battery_level.0 + battery_change);

        let target_temp = AMBIENT_TEMP + TEMP_RISE * normalized;
        let temperature =
            self.state.motor_temperature.0 * TEMP_SMOOTHING + target_temp * (1.0 - TEMP_SMOOTHING);

        let travelled = KilometersPerHour(speed).distance_over_ms(elapsed.as_secs_f64() * 1000.0);

        // Sensor jitter persists into the next tick's starting values
        let speed = (speed + self.noise(speed, 1.0)).max(0.0).min(max_speed);
        let temperature = temperature + self.noise(temperature, TEMP_NOISE_SCALE);
        let power = (power + self.noise(power, POWER_NOISE_SCALE)).max(0.0);

        self.state = TelemetryState {
            timestamp: Utc::now(),
            tick: self.state.tick + 1,
            speed: KilometersPerHour(speed),
            battery_level: battery,
            estimated_range: Kilometers(self.config.range.0 * battery.as_fraction()),
            motor_temperature: Celsius(temperature),
            payload_weight: self.state.payload_weight,
            total_distance: Kilometers(self.state.total_distance.0 + travelled.0),
            power_usage: Kilowatts(power),
            regeneration: Kilowatts(regeneration),
            brakes_applied: self.state.brakes_applied,
        };
    }

    /// Uniform jitter of up to `noise_level * scale` of `value` either way
    fn noise(&mut self, value: f64, scale: f64) -> f64 {
        if self.noise_level == 0.0 {
            return 0.0;
        }
        let amount = value * self.noise_level * scale;
        (self.rng.gen::<f64>() - 0.5) * 2.0 * amount
    }
}

// =============================================================================
// TelemetrySimulator
// =============================================================================

struct Core {
    model: TelemetryModel,
    ticker: Option<CancellationToken>,
    release: Option<CancellationToken>,
}

impl Core {
    fn cancel_release(&mut self) {
        if let Some(release) = self.release.take() {
            release.cancel();
            self.model.release_obstacle_brake();
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    listeners: ListenerRegistry<TelemetryState>,
    obstacle_release: Duration,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(ticker) = core.ticker.take() {
            ticker.cancel();
        }
        if let Some(release) = core.release.take() {
            release.cancel();
        }
    }
}

/// Timer-driven telemetry source for one vehicle
///
/// Clones are handles to the same simulator. Timers stop when the last handle
/// is dropped. `start`, `inject_obstacle` and the end of an obstacle brake
/// must run inside a tokio runtime.
#[derive(Clone)]
pub struct TelemetrySimulator {
    shared: Arc<Shared>,
}

impl TelemetrySimulator {
    pub fn new(config: VehicleConfig) -> Self {
        Self::with_options(config, SimulatorOptions::default())
    }

    pub fn with_options(config: VehicleConfig, options: SimulatorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    model: TelemetryModel::new(config, &options),
                    ticker: None,
                    release: None,
                }),
                listeners: ListenerRegistry::new(),
                obstacle_release: options.obstacle_release,
            }),
        }
    }

    /// Start ticking every `period`. A running timer is replaced, never doubled.
    pub fn start(&self, period: Duration) {
        let period = period.max(Duration::from_millis(1));
        let token = CancellationToken::new();
        {
            let mut core = self.shared.core();
            if let Some(previous) = core.ticker.replace(token.clone()) {
                previous.cancel();
                debug!("Restarting telemetry timer at {:?}", period);
            } else {
                debug!("Starting telemetry timer at {:?}", period);
            }
        }

        tokio::spawn(run_ticks(Arc::downgrade(&self.shared), token, period));
    }

    /// Cancel the tick timer and any pending obstacle release. No-op when stopped.
    pub fn stop(&self) {
        let mut core = self.shared.core();
        if let Some(ticker) = core.ticker.take() {
            ticker.cancel();
            debug!("Telemetry timer stopped");
        }
        core.cancel_release();
    }

    pub fn is_running(&self) -> bool {
        self.shared.core().ticker.is_some()
    }

    /// Register a listener called with a snapshot after every tick
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TelemetryState) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    pub fn snapshot(&self) -> TelemetryState {
        self.shared.core().model.state()
    }

    pub fn config(&self) -> VehicleConfig {
        *self.shared.core().model.config()
    }

    pub fn set_accelerating(&self, accelerating: bool) {
        self.shared.core().model.set_accelerating(accelerating);
    }

    pub fn set_braking(&self, braking: bool) {
        self.shared.core().model.set_braking(braking);
    }

    pub fn set_regeneration_level(&self, level: f64) {
        self.shared.core().model.set_regeneration_level(level);
    }

    pub fn regeneration_level(&self) -> f64 {
        self.shared.core().model.regeneration_level()
    }

    pub fn is_braking(&self) -> bool {
        self.shared.core().model.is_braking()
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.shared.core().model.drive_mode()
    }

    /// Emergency stop, released automatically after the configured delay
    ///
    /// A second obstacle before the release restarts the delay.
    pub fn inject_obstacle(&self) {
        let token = CancellationToken::new();
        {
            let mut core = self.shared.core();
            core.model.apply_obstacle();
            if let Some(previous) = core.release.replace(token.clone()) {
                previous.cancel();
            }
            debug!(
                "Obstacle injected, speed now {:.1} km/h",
                core.model.state().speed.0
            );
        }

        let shared = Arc::downgrade(&self.shared);
        let delay = self.shared.obstacle_release;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(delay) => {}
            }

            let Some(shared) = shared.upgrade() else { return };
            let mut core = shared.core();
            if token.is_cancelled() {
                return;
            }
            core.model.release_obstacle_brake();
            core.release = None;
            debug!("Obstacle brake released");
        });
    }
}

async fn run_ticks(shared: Weak<Shared>, token: CancellationToken, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(shared) = shared.upgrade() else { break };
        let snapshot = {
            let mut core = shared.core();
            // Checked under the lock: once stop() returns no tick gets through
            if token.is_cancelled() {
                break;
            }
            core.model.step(period);
            core.model.state()
        };

        shared.listeners.notify(&snapshot);
    }
}
