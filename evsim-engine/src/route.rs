//! Route progress simulation
//!
//! Moves a vehicle from the first to the last point of a path at a speed
//! the caller can change at any time. [`RouteRun`] integrates one run tick by
//! tick; [`RouteSimulation`] owns the timer and the idle/running/completed
//! lifecycle around it.

use crate::listeners::{lock, ListenerRegistry, Subscription};
use evsim_core::{geo::*, model::*, units::*};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tunables for a route simulation
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOptions {
    /// Tick period; also the simulated time each tick covers
    pub interval: Duration,

    /// Initial speed
    pub speed: KilometersPerHour,

    /// Battery at the start of every run
    pub battery_total: Percent,

    /// Delay between arrival and the end callback
    pub end_delay: Duration,

    /// Battery used over a whole route, before jitter
    pub depletion_base: f64,

    /// Upper bound of the random extra depletion
    pub depletion_jitter: f64,

    /// Battery taken on arrival
    pub arrival_penalty: f64,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(80),
            speed: KilometersPerHour(28.0),
            battery_total: Percent::FULL,
            end_delay: Duration::from_millis(200),
            depletion_base: 30.0,
            depletion_jitter: 8.0,
            arrival_penalty: 2.0,
            seed: None,
        }
    }
}

/// Shortest tick; the timer and the progress integration both use it
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl RouteOptions {
    fn normalized(mut self) -> Self {
        self.interval = self.interval.max(MIN_INTERVAL);
        self
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Result of a single route tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    Arrived,
}

// =============================================================================
// RouteRun
// =============================================================================

/// One trip along a path, advanced explicitly with [`tick`](Self::tick)
pub struct RouteRun {
    path: Polyline,
    progress: Kilometers,
    position: GeoPoint,
    distance_covered: Kilometers,
    battery: Percent,
    arrived: bool,
    options: RouteOptions,
    rng: StdRng,
}

impl RouteRun {
    /// Start a run with the vehicle placed on the path's origin
    ///
    /// Intervals below 1 ms are raised to 1 ms.
    pub fn new(path: Polyline, options: RouteOptions) -> Self {
        let options = options.normalized();
        let rng = rng_for(options.seed);
        Self {
            position: path.origin(),
            path,
            progress: Kilometers(0.0),
            distance_covered: Kilometers(0.0),
            battery: options.battery_total,
            arrived: false,
            options,
            rng,
        }
    }

    pub fn path(&self) -> &Polyline {
        &self.path
    }

    pub fn position(&self) -> GeoPoint {
        self.position
    }

    pub fn distance_covered(&self) -> Kilometers {
        self.distance_covered
    }

    pub fn battery(&self) -> Percent {
        self.battery
    }

    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// Fraction of the route completed so far
    pub fn fraction(&self) -> f64 {
        let total = self.path.total_distance().0;
        if total <= 0.0 {
            1.0
        } else {
            (self.progress.0 / total).min(1.0)
        }
    }

    /// Advance by one interval at `speed`. Ticks after arrival change nothing.
    pub fn tick(&mut self, speed: KilometersPerHour) -> TickOutcome {
        if self.arrived {
            return TickOutcome::Arrived;
        }

        let step = speed.distance_over_ms(self.options.interval.as_secs_f64() * 1000.0);
        self.progress = Kilometers(self.progress.0 + step.0.max(0.0));

        let total = self.path.total_distance();
        let fraction = self.fraction();

        self.position = self.path.point_at_fraction(fraction);
        self.distance_covered = Kilometers(total.0 * fraction);
        let depletion = self.options.depletion_base + self.rng.gen::<f64>() * self.options.depletion_jitter;
        self.battery = Percent::new(self.options.battery_total.0 - fraction * depletion);

        if fraction >= 1.0 {
            self.position = self.path.destination();
            self.distance_covered = total;
            self.battery = Percent::new(self.battery.0 - self.options.arrival_penalty);
            self.arrived = true;
            return TickOutcome::Arrived;
        }

        TickOutcome::Advanced
    }
}

// =============================================================================
// RouteSimulation
// =============================================================================

type EndCallback = Arc<dyn Fn(&RouteSimulation) + Send + Sync>;

struct Core {
    active: bool,
    phase: RoutePhase,
    path: Option<Polyline>,
    run: Option<RouteRun>,
    speed: KilometersPerHour,
    ticker: Option<CancellationToken>,
    end_notice: Option<CancellationToken>,
    on_end: Option<EndCallback>,
    runs: u64,
    /// Bumped for every published snapshot
    seq: u64,
}

impl Core {
    fn cancel_timers(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        if let Some(notice) = self.end_notice.take() {
            notice.cancel();
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

struct Shared {
    core: Mutex<Core>,
    listeners: ListenerRegistry<RouteSnapshot>,
    options: RouteOptions,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    fn snapshot_of(&self, core: &Core) -> RouteSnapshot {
        match (&core.run, core.phase) {
            (Some(run), RoutePhase::Running | RoutePhase::Completed) => RouteSnapshot {
                phase: core.phase,
                vehicle_position: Some(run.position()),
                distance_covered: run.distance_covered(),
                speed: core.speed,
                battery: run.battery(),
                low_battery: run.battery().0 <= LOW_BATTERY_THRESHOLD,
            },
            _ => RouteSnapshot::idle(core.speed, self.options.battery_total),
        }
    }

    /// Snapshot plus its sequence number, taken under the core lock
    fn publishable(&self, core: &mut Core) -> (u64, RouteSnapshot) {
        (core.next_seq(), self.snapshot_of(core))
    }

    /// Deliver outside the core lock; a snapshot older than one already
    /// delivered is dropped
    fn publish(&self, (seq, snapshot): (u64, RouteSnapshot)) {
        self.listeners.notify_if_newer(seq, &snapshot);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(|e| e.into_inner());
        core.cancel_timers();
    }
}

/// Timer-driven route simulation
///
/// Clones are handles to the same simulation. Activating with a valid path
/// must happen inside a tokio runtime.
#[derive(Clone)]
pub struct RouteSimulation {
    shared: Arc<Shared>,
}

impl RouteSimulation {
    /// Intervals below 1 ms are raised to 1 ms.
    pub fn new(options: RouteOptions) -> Self {
        let options = options.normalized();
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    active: false,
                    phase: RoutePhase::Idle,
                    path: None,
                    run: None,
                    speed: options.speed,
                    ticker: None,
                    end_notice: None,
                    on_end: None,
                    runs: 0,
                    seq: 0,
                }),
                listeners: ListenerRegistry::new(),
                options,
            }),
        }
    }

    /// Set the callback fired once per completed run
    ///
    /// The callback gets a handle to this simulation, typically to lower the
    /// active flag.
    pub fn on_end<F>(&self, callback: F)
    where
        F: Fn(&RouteSimulation) + Send + Sync + 'static,
    {
        self.shared.core().on_end = Some(Arc::new(callback));
    }

    /// Register a listener called with a snapshot after every change
    ///
    /// Snapshots arrive in state order; one overtaken by a newer change is
    /// skipped. Listeners must not call `set_path` or `set_active` on this
    /// simulation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RouteSnapshot) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    /// Replace the path. Fewer than two points clears it.
    ///
    /// While active, a new valid path restarts the run from its origin and an
    /// invalid one drops back to the idle snapshot.
    pub fn set_path(&self, points: Vec<GeoPoint>) {
        let published = {
            let mut core = self.shared.core();
            core.path = Polyline::new(points);
            if !core.active {
                return;
            }
            self.begin_run(&mut core);
            self.shared.publishable(&mut core)
        };
        self.shared.publish(published);
    }

    /// Change speed for the following ticks. Negative speeds become 0,
    /// non-finite values are ignored.
    pub fn set_speed(&self, speed_kmh: f64) {
        if !speed_kmh.is_finite() {
            return;
        }
        self.shared.core().speed = KilometersPerHour(speed_kmh.max(0.0));
    }

    pub fn speed(&self) -> KilometersPerHour {
        self.shared.core().speed
    }

    /// Raise or lower the active flag
    ///
    /// Raising it starts a run when a valid path is set. Lowering it, from
    /// any phase, cancels timers and restores the idle snapshot.
    pub fn set_active(&self, active: bool) {
        let published = {
            let mut core = self.shared.core();
            if active {
                if core.active {
                    return;
                }
                core.active = true;
                self.begin_run(&mut core);
            } else {
                core.active = false;
                core.cancel_timers();
                core.run = None;
                core.phase = RoutePhase::Idle;
                debug!("Route simulation deactivated");
            }
            self.shared.publishable(&mut core)
        };
        self.shared.publish(published);
    }

    pub fn is_active(&self) -> bool {
        self.shared.core().active
    }

    pub fn phase(&self) -> RoutePhase {
        self.shared.core().phase
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        let core = self.shared.core();
        self.shared.snapshot_of(&core)
    }

    /// Start a fresh run on the current path, or go idle without one
    fn begin_run(&self, core: &mut Core) {
        core.cancel_timers();

        let Some(path) = core.path.clone() else {
            core.run = None;
            core.phase = RoutePhase::Idle;
            debug!("Route simulation active without a usable path, staying idle");
            return;
        };

        core.runs += 1;
        let options = RouteOptions {
            seed: self.shared.options.seed.map(|s| s.wrapping_add(core.runs)),
            ..self.shared.options.clone()
        };
        debug!(
            "Route run {} started: {:.3} km over {} points",
            core.runs,
            path.total_distance().0,
            path.points().len()
        );
        core.run = Some(RouteRun::new(path, options));
        core.phase = RoutePhase::Running;

        let token = CancellationToken::new();
        core.ticker = Some(token.clone());
        tokio::spawn(run_ticks(
            Arc::downgrade(&self.shared),
            token,
            self.shared.options.interval,
        ));
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
        let (published, arrived) = {
            let mut core = shared.core();
            if token.is_cancelled() {
                break;
            }
            let speed = core.speed;
            let Some(run) = core.run.as_mut() else { break };
            let arrived = run.tick(speed) == TickOutcome::Arrived;
            if arrived {
                core.phase = RoutePhase::Completed;
                core.ticker = None;
                token.cancel();
                schedule_end_notice(&shared, &mut core);
                debug!("Route completed");
            }
            (shared.publishable(&mut core), arrived)
        };

        shared.publish(published);
        if arrived {
            break;
        }
    }
}

fn schedule_end_notice(shared: &Arc<Shared>, core: &mut Core) {
    let Some(callback) = core.on_end.clone() else { return };

    let token = CancellationToken::new();
    core.end_notice = Some(token.clone());
    let weak = Arc::downgrade(shared);
    let delay = shared.options.end_delay;

    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = sleep(delay) => {}
        }

        let Some(shared) = weak.upgrade() else { return };
        {
            let mut core = shared.core();
            if token.is_cancelled() {
                return;
            }
            core.end_notice = None;
        }
        // Outside the lock: the callback usually deactivates the simulation
        callback(&RouteSimulation { shared });
    });
}
