//! Occupancy sampler
//!
//! Once a minute the sampler counts presence markers and appends an
//! `(ts, active_tunnels)` row to the analytics store. At most one sample is in
//! flight at a time; a tick that fires while the previous sample is still
//! running does nothing.

pub mod sink;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_control::{ControlError, PresenceRegistry};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub use sink::{DatabaseSink, SnapshotSink};

#[cfg(test)]
pub use sink::MockSnapshotSink;

/// Default sampling period
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

/// Errors raised while taking or persisting a sample
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Presence scan failed: {0}")]
    Scan(#[from] ControlError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// One occupancy data point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancySnapshot {
    /// Sample time, truncated to the minute
    pub ts: DateTime<Utc>,
    pub active_tunnels: u64,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Recorded(OccupancySnapshot),
    /// The previous sample was still running
    Skipped,
    ScanFailed,
    PersistFailed,
}

/// Truncate a timestamp to the start of its minute
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Returns the task state to idle when a sample finishes, including on panic
struct TickGuard<'a>(&'a AtomicU8);

impl<'a> TickGuard<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(state))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Periodic occupancy sampler
pub struct OccupancySampler {
    registry: PresenceRegistry,
    sink: Arc<dyn SnapshotSink>,
    state: AtomicU8,
}

impl OccupancySampler {
    pub fn new(registry: PresenceRegistry, sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            registry,
            sink,
            state: AtomicU8::new(IDLE),
        }
    }

    /// Whether a sample is currently in flight
    pub fn is_sampling(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Take and persist one sample
    ///
    /// Failures are logged and reported in the outcome; they never stop the
    /// sampling loop.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::acquire(&self.state) else {
            debug!("Previous sample still running, skipping tick");
            return TickOutcome::Skipped;
        };

        let ts = truncate_to_minute(Utc::now());

        let active_tunnels = match self.registry.count_online().await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to count online tunnels: {}", e);
                return TickOutcome::ScanFailed;
            }
        };

        let snapshot = OccupancySnapshot { ts, active_tunnels };

        match self.sink.record(snapshot).await {
            Ok(()) => {
                info!(ts = %snapshot.ts, active_tunnels, "Recorded occupancy snapshot");
                TickOutcome::Recorded(snapshot)
            }
            Err(e) => {
                error!("Failed to persist occupancy snapshot: {}", e);
                TickOutcome::PersistFailed
            }
        }
    }

    /// Sample every `period` until the task is dropped
    ///
    /// The first sample is taken immediately. Each tick runs on its own task so
    /// a slow sample cannot delay the schedule; overlapping ticks are skipped by
    /// [`OccupancySampler::tick`].
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Occupancy sampler started (every {:?})", period);

        loop {
            interval.tick().await;
            let sampler = self.clone();
            tokio::spawn(async move {
                sampler.tick().await;
            });
        }
    }
}
