// src/scheduler.rs
//! Fixed-interval driver for sync passes.
//!
//! - first pass fires immediately on `start`
//! - at most one pass is active at any instant (timer ticks and manual
//!   triggers share one `PassState`); a trigger that finds a pass running is
//!   skipped, and missed ticks are delayed rather than bunched
//! - `shutdown` stops new passes, waits up to the grace period for the active
//!   one, then cancels outstanding store calls

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::sync::{PassReport, SyncEngine};

/// Something the scheduler can run as one pass.
#[async_trait]
pub trait PassRunner: Send + Sync + 'static {
    async fn run_pass(&self, cancel: &CancellationToken) -> PassReport;
}

#[async_trait]
impl PassRunner for SyncEngine {
    async fn run_pass(&self, cancel: &CancellationToken) -> PassReport {
        self.sync_all(cancel).await
    }
}

/// Interval used when a zero interval is configured.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub records: u64,
    pub failed_sources: Vec<String>,
}

impl From<&PassReport> for PassSummary {
    fn from(r: &PassReport) -> Self {
        Self {
            finished_at: Utc::now(),
            duration_ms: r.duration.as_millis() as u64,
            records: r.total_records(),
            failed_sources: r
                .outcomes
                .iter()
                .filter(|o| o.result.is_err())
                .map(|o| o.source.to_string())
                .collect(),
        }
    }
}

/// Process-wide "is a pass running" state, owned by the scheduler.
#[derive(Debug, Default)]
pub struct PassState {
    running: AtomicBool,
    started: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    last: Mutex<Option<PassSummary>>,
}

impl PassState {
    /// Claim the single pass slot, or `None` if a pass is already active.
    pub fn try_begin(self: &Arc<Self>) -> Option<PassGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            counter!("sync_ticks_skipped_total").increment(1);
            return None;
        }
        self.started.fetch_add(1, Ordering::Relaxed);
        counter!("sync_passes_total").increment(1);
        Some(PassGuard {
            state: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            passes_started: self.started.load(Ordering::Relaxed),
            passes_completed: self.completed.load(Ordering::Relaxed),
            triggers_skipped: self.skipped.load(Ordering::Relaxed),
            last_pass: self.last.lock().ok().and_then(|g| g.clone()),
        }
    }

    fn record(&self, report: &PassReport) {
        if let Ok(mut g) = self.last.lock() {
            *g = Some(PassSummary::from(report));
        }
    }
}

/// Releases the pass slot on drop, including when the pass task is aborted.
pub struct PassGuard {
    state: Arc<PassState>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.state.completed.fetch_add(1, Ordering::Relaxed);
        self.state.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub passes_started: u64,
    pub passes_completed: u64,
    pub triggers_skipped: u64,
    pub last_pass: Option<PassSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The in-flight pass (if any) finished within the grace period.
    Graceful,
    /// The grace period ran out; outstanding store calls were cancelled.
    TimedOut,
}

pub struct Scheduler {
    runner: Arc<dyn PassRunner>,
    state: Arc<PassState>,
    cfg: SchedulerCfg,
    /// Stops ticks and manual triggers.
    stop: CancellationToken,
    /// Handed to passes; fired only when the grace period runs out.
    abort: CancellationToken,
    tasks: TaskTracker,
}

impl Scheduler {
    /// A zero interval is treated as [`MIN_INTERVAL`].
    pub fn new(runner: Arc<dyn PassRunner>, mut cfg: SchedulerCfg) -> Self {
        if cfg.interval.is_zero() {
            cfg.interval = MIN_INTERVAL;
        }
        Self {
            runner,
            state: Arc::new(PassState::default()),
            cfg,
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn cfg(&self) -> SchedulerCfg {
        self.cfg
    }

    pub fn state(&self) -> &Arc<PassState> {
        &self.state
    }

    pub fn status(&self) -> SchedulerStatus {
        self.state.snapshot()
    }

    /// Spawn the timer loop. The first tick fires immediately.
    pub fn start(&self) {
        let runner = Arc::clone(&self.runner);
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();
        let abort = self.abort.clone();
        let interval = self.cfg.interval;

        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tracing::info!("batch sync job triggered");
                match state.try_begin() {
                    Some(guard) => run_guarded(&*runner, &state, guard, &abort).await,
                    None => tracing::warn!("previous sync pass still running; tick skipped"),
                }
            }
            tracing::debug!("scheduler loop stopped");
        });
        tracing::info!(interval_secs = interval.as_secs(), "scheduler started");
    }

    /// Run a pass now, outside the timer, if none is active.
    pub fn trigger(&self) -> TriggerOutcome {
        if self.stop.is_cancelled() {
            return TriggerOutcome::ShuttingDown;
        }
        let Some(guard) = self.state.try_begin() else {
            return TriggerOutcome::AlreadyRunning;
        };
        let runner = Arc::clone(&self.runner);
        let state = Arc::clone(&self.state);
        let abort = self.abort.clone();
        self.tasks.spawn(async move {
            tracing::info!("manual sync pass triggered");
            run_guarded(&*runner, &state, guard, &abort).await;
        });
        TriggerOutcome::Started
    }

    /// Stop accepting passes and wait (bounded) for the active one.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        tracing::info!("stopping scheduler");
        self.stop.cancel();
        self.tasks.close();

        if tokio::time::timeout(self.cfg.shutdown_grace, self.tasks.wait())
            .await
            .is_ok()
        {
            tracing::info!("scheduler stopped");
            return ShutdownOutcome::Graceful;
        }

        tracing::warn!(
            grace_secs = self.cfg.shutdown_grace.as_secs(),
            "sync pass still running at shutdown deadline; cancelling store calls"
        );
        self.abort.cancel();
        // Cancelled store calls unwind at their next await point.
        let _ = tokio::time::timeout(Duration::from_secs(1), self.tasks.wait()).await;
        ShutdownOutcome::TimedOut
    }
}

async fn run_guarded(
    runner: &dyn PassRunner,
    state: &PassState,
    guard: PassGuard,
    cancel: &CancellationToken,
) {
    let report = runner.run_pass(cancel).await;
    for e in report.failures() {
        tracing::error!(error = %e, "batch sync failed");
    }
    state.record(&report);
    drop(guard);
}
