//! Periodic, non-overlapping snapshot dumps.
//!
//! The [`DumpScheduler`] owns a ticker task and spawns each dump on a
//! [`TaskTracker`]. Its state machine is:
//!
//! ```text
//!   Idle --tick/trigger--> Running --dump done--> Idle
//!     \                       \
//!      `------ shutdown ------>`--> Stopped
//! ```
//!
//! A tick that finds the scheduler `Running` is dropped, not queued.
//! [`DumpScheduler::shutdown`] stops the ticker and waits for an in-flight
//! dump, so the process never exits halfway through writing a snapshot.

use super::manager::{DumpReport, SnapshotManager};
use crate::server::telemetry::{
    increment_dump_failures, increment_dump_ticks_skipped, increment_dumps, record_dump_duration,
};
use core::{future::Future, time::Duration};
use cuckoo_tonic_core::Result;
use portable_atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Lifecycle of a [`DumpScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle = 0,
    /// A dump is in flight.
    Running = 1,
    /// Shut down; no further dumps will start.
    Stopped = 2,
}

impl SchedulerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Moves the scheduler back to `Idle` when a dump task ends, even by panic.
/// Leaves `Stopped` untouched if shutdown raced the dump.
struct RunningGuard(Arc<AtomicU8>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            increment_dump_failures();
            tracing::error!("Dump task panicked");
        }
        let _ = self.0.compare_exchange(
            SchedulerState::Running as u8,
            SchedulerState::Idle as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Runs [`SnapshotManager::dump`] on a fixed interval.
#[derive(Debug)]
pub struct DumpScheduler {
    manager: Arc<SnapshotManager>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl DumpScheduler {
    /// Creates a scheduler without a ticker; dumps only run on
    /// [`trigger`](Self::trigger).
    pub fn new(manager: Arc<SnapshotManager>) -> Self {
        Self {
            manager,
            state: Arc::new(AtomicU8::new(SchedulerState::Idle as u8)),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Creates a scheduler and starts ticking every `period`. The first dump
    /// runs one full period after start.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(manager: Arc<SnapshotManager>, period: Duration) -> Arc<Self> {
        let scheduler = Arc::new(Self::new(manager));
        let ticker = Arc::clone(&scheduler);
        scheduler.tracker.spawn(async move { ticker.run(period).await });
        scheduler
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn run(&self, period: Duration) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(?period, dir = %self.manager.dir().display(), "Dump scheduler started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.trigger();
                }
            }
        }

        tracing::debug!("Dump ticker stopped");
    }

    /// Starts a dump unless one is already running or the scheduler is
    /// stopped.
    ///
    /// Returns `true` if a dump was started. Never blocks.
    pub fn trigger(&self) -> bool {
        let manager = Arc::clone(&self.manager);
        self.launch(async move { manager.dump().await })
    }

    fn launch<F>(&self, dump: F) -> bool
    where
        F: Future<Output = Result<DumpReport>> + Send + 'static,
    {
        // Holding a tracker token keeps `shutdown` from observing an empty
        // tracker between the state transition and the spawn.
        let _token = self.tracker.token();

        match self.state.compare_exchange(
            SchedulerState::Idle as u8,
            SchedulerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(current) => {
                if SchedulerState::from_u8(current) == SchedulerState::Running {
                    increment_dump_ticks_skipped();
                    tracing::debug!("Previous dump still running, skipping tick");
                }
                return false;
            }
        }

        let running = RunningGuard(Arc::clone(&self.state));
        self.tracker.spawn(async move {
            let _running = running;
            match dump.await {
                Ok(report) => {
                    increment_dumps();
                    record_dump_duration(report.elapsed.as_secs_f64() * 1000.0);
                    tracing::info!(
                        written = report.written,
                        removed = report.removed,
                        elapsed = ?report.elapsed,
                        "Dump complete"
                    );
                }
                Err(e) => {
                    increment_dump_failures();
                    tracing::error!("Dump failed: {e:?}");
                }
            }
        });

        true
    }

    /// Stops the ticker and waits for any in-flight dump to finish.
    ///
    /// Idempotent. After this returns no dump is running and none will start.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let previous = self
            .state
            .swap(SchedulerState::Stopped as u8, Ordering::AcqRel);

        if SchedulerState::from_u8(previous) == SchedulerState::Running {
            tracing::info!("Waiting for in-flight dump to finish");
        }
        self.tracker.close();
        self.tracker.wait().await;

        tracing::debug!("Dump scheduler stopped");
    }
}
