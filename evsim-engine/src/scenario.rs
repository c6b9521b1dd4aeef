//! Safety drills run against a telemetry simulator

use crate::listeners::lock;
use crate::telemetry::TelemetrySimulator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

const INITIAL_SAFETY_SCORE: u8 = 85;
const MAX_SAFETY_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillStatus {
    Idle,
    Running,
    Finished,
}

/// Drill timeline, measured from the start
#[derive(Debug, Clone, PartialEq)]
pub struct DrillTimings {
    /// Delay before the obstacle appears
    pub obstacle_after: Duration,
    /// Delay after the obstacle before the score is updated
    pub score_after: Duration,
    /// Total drill length
    pub duration: Duration,
    /// Points awarded for handling the obstacle
    pub score_bonus: u8,
}

impl Default for DrillTimings {
    fn default() -> Self {
        Self {
            obstacle_after: Duration::from_secs(3),
            score_after: Duration::from_secs(2),
            duration: Duration::from_secs(10),
            score_bonus: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillReport {
    pub status: DrillStatus,
    pub safety_score: u8,
    pub started_at: Option<DateTime<Utc>>,
}

struct Drill {
    report: DrillReport,
    token: Option<CancellationToken>,
}

/// Emergency braking drill: an obstacle appears mid-run and the safety score
/// goes up once the vehicle has dealt with it
#[derive(Clone)]
pub struct EmergencyBrakingDrill {
    inner: Arc<Mutex<Drill>>,
    timings: DrillTimings,
}

impl EmergencyBrakingDrill {
    pub fn new(timings: DrillTimings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Drill {
                report: DrillReport {
                    status: DrillStatus::Idle,
                    safety_score: INITIAL_SAFETY_SCORE,
                    started_at: None,
                },
                token: None,
            })),
            timings,
        }
    }

    pub fn report(&self) -> DrillReport {
        lock(&self.inner).report
    }

    /// Start the drill against `simulator`. Returns false if one is running.
    pub fn start(&self, simulator: TelemetrySimulator) -> bool {
        let token = CancellationToken::new();
        {
            let mut drill = lock(&self.inner);
            if drill.report.status == DrillStatus::Running {
                return false;
            }
            drill.report.status = DrillStatus::Running;
            drill.report.started_at = Some(Utc::now());
            drill.token = Some(token.clone());
        }
        info!("Emergency braking drill started");

        let inner = Arc::clone(&self.inner);
        let timings = self.timings.clone();
        tokio::spawn(async move {
            if !pause(&token, timings.obstacle_after).await {
                return;
            }
            simulator.inject_obstacle();

            if !pause(&token, timings.score_after).await {
                return;
            }
            {
                let mut drill = lock(&inner);
                if token.is_cancelled() {
                    return;
                }
                drill.report.safety_score = drill
                    .report
                    .safety_score
                    .saturating_add(timings.score_bonus)
                    .min(MAX_SAFETY_SCORE);
            }

            let remaining = timings
                .duration
                .saturating_sub(timings.obstacle_after + timings.score_after);
            if !pause(&token, remaining).await {
                return;
            }
            let mut drill = lock(&inner);
            if token.is_cancelled() {
                return;
            }
            drill.report.status = DrillStatus::Finished;
            drill.token = None;
            info!("Emergency braking drill finished, safety score {}", drill.report.safety_score);
        });
        true
    }

    /// Abort a running drill; the score keeps whatever it reached
    pub fn cancel(&self) {
        let mut drill = lock(&self.inner);
        if let Some(token) = drill.token.take() {
            token.cancel();
            drill.report.status = DrillStatus::Idle;
        }
    }
}

impl Default for EmergencyBrakingDrill {
    fn default() -> Self {
        Self::new(DrillTimings::default())
    }
}

/// Sleep unless cancelled first; true when the full delay elapsed
async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
