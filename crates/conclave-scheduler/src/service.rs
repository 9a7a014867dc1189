//! The scheduler's periodic loop — a cancelable timer that runs one
//! automation cycle (overdue notifications + auto-assignment) per interval.
//!
//! The loop sleeps on a `tokio::select!` over the interval timer and a
//! shutdown signal, so stopping completes within one sleep interval; the
//! owner joins the spawned task on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::scheduler::TaskScheduler;

/// Drives [`TaskScheduler::run_cycle`] once per interval until stopped.
pub struct SchedulerService {
    scheduler: Arc<TaskScheduler>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl SchedulerService {
    pub fn new(scheduler: Arc<TaskScheduler>, interval: Duration) -> Self {
        SchedulerService {
            scheduler,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run the loop. Returns after [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "scheduler service started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    debug!("scheduler cycle");
                    self.scheduler.run_cycle().await;
                }
                _ = self.shutdown.notified() => {
                    info!("scheduler service shutting down");
                    return;
                }
            }
        }
    }

    /// Signal the loop to exit at the next suspension point. The permit is
    /// stored, so stopping before the loop reaches its first select is safe.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
