//! The polling loop.

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use super::job::{Job, QueuedJob};
use super::stats::{LoadOutcome, LoadStats};
use crate::collector::{Collector, CollectorError};
use crate::config::{DEFAULT_RECONNECT_DELAY, DEFAULT_STARTUP_STAGGER};
use crate::device::DeviceEntry;

/// Single time-ordered queue of jobs, drained by one loop.
///
/// Jobs run one at a time, so a job is never fired again before its previous
/// run returned and a device's connection is only driven from this loop.
pub struct Scheduler {
    queue: BinaryHeap<QueuedJob>,
    next_seq: u64,
    stats: Arc<LoadStats>,
    reconnect_delay: Duration,
    stagger: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.queue.len())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("stagger", &self.stagger)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(stats: Arc<LoadStats>) -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            stats,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            stagger: DEFAULT_STARTUP_STAGGER,
        }
    }

    /// Delay before retrying a job whose device was disconnected.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Offset between the first runs of consecutively added jobs.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Enqueue a job; the n-th added job first fires at `now + n * stagger`.
    pub fn add_job(&mut self, job: Job) {
        let offset = self.stagger.saturating_mul(u32::try_from(self.next_seq).unwrap_or(u32::MAX));
        tracing::debug!(
            device = job.device_name(),
            cadence = %job.cadence,
            collectors = job.collectors.len(),
            interval_secs = job.interval.as_secs(),
            "Job scheduled"
        );
        self.push(job, Instant::now() + offset);
    }

    pub fn job_count(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, job: Job, fire_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedJob { fire_at, seq, job });
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A job already running finishes; pending jobs are discarded.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(jobs = self.queue.len(), "Scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(fire_at) = self.queue.peek().map(|q| q.fire_at) else {
                let _ = shutdown.changed().await;
                break;
            };

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep_until(fire_at) => {}
            }

            let Some(QueuedJob { job, .. }) = self.queue.pop() else {
                continue;
            };
            let delay = self.run_job(&job).await;
            self.push(job, Instant::now() + delay);
        }

        tracing::info!(pending = self.queue.len(), "Scheduler stopped");
    }

    /// Run one job and return the delay until its next run.
    ///
    /// Each collector's outcome goes to [`LoadStats::record`], which keeps the
    /// per-collector counters and the process-wide `data_loads_total`.
    async fn run_job(&self, job: &Job) -> Duration {
        if let Some(device) = &job.device {
            let connection = device.connection();
            if !connection.is_connected() {
                connection.connect().await;
                return self.reconnect_delay;
            }
        }

        let mut skip_logged = false;
        for collector in &job.collectors {
            let started = Instant::now();
            let outcome = load_isolated(Arc::clone(collector), job.device.clone()).await;
            let elapsed = started.elapsed();

            if outcome == LoadOutcome::Skipped && !skip_logged {
                tracing::debug!(
                    device = job.device_name(),
                    collector = collector.name(),
                    "Device disconnected, skipping loads"
                );
                skip_logged = true;
            }

            self.stats.record(
                collector.name(),
                job.device.as_deref().map(DeviceEntry::identity),
                elapsed,
                outcome,
                Utc::now(),
            );
        }
        job.interval
    }
}

/// Run one `load` in its own task so a panic cannot take the loop down.
async fn load_isolated(
    collector: Arc<dyn Collector>,
    device: Option<Arc<DeviceEntry>>,
) -> LoadOutcome {
    let name = collector.name().to_string();
    let device_name = device
        .as_deref()
        .map(|d| d.name().to_string())
        .unwrap_or_default();
    let start = std::time::Instant::now();

    let task = tokio::spawn(async move { collector.load(device.as_deref()).await });
    let outcome = match task.await {
        Ok(Ok(())) => LoadOutcome::Loaded,
        Ok(Err(CollectorError::Skipped)) => LoadOutcome::Skipped,
        Ok(Err(e)) => {
            tracing::warn!(collector = %name, device = %device_name, error = %e, "Load failed");
            LoadOutcome::Failed
        }
        Err(e) => {
            tracing::error!(collector = %name, device = %device_name, error = %e, "Load panicked");
            LoadOutcome::Panicked
        }
    };

    let duration_ms = start.elapsed().as_millis();
    tracing::debug!(collector = %name, device = %device_name, duration_ms, outcome = %outcome, "Load finished");
    outcome
}
