//! Drain loops and their supervisor.
//!
//! A drain loop holds one admission slot at a time: it claims a task, runs
//! it, then either claims the next one straight away, sleeps before trying
//! again, or stops once the queue is empty. [`QaWorker::run`] keeps drain
//! loops going for the lifetime of the process.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::queue::{TrainingMode, TrainingQueue};

use super::admission::AdmissionCounter;
use super::pipeline::{Collaborators, NextStep, QaPipeline, TaskOutcome};

/// Outcome counts of one drain loop, or of a whole worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub completed: u64,
    pub team_suspended: u64,
    pub parked: u64,
    pub retried: u64,
    pub claim_errors: u64,
}

impl DrainSummary {
    /// Tasks that were claimed and run, whatever their outcome.
    pub fn tasks_run(&self) -> u64 {
        self.completed + self.team_suspended + self.parked + self.retried
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { .. } => self.completed += 1,
            TaskOutcome::TeamSuspended { .. } => self.team_suspended += 1,
            TaskOutcome::Parked { .. } => self.parked += 1,
            TaskOutcome::Retry { .. } => self.retried += 1,
        }
    }
}

/// Totals across all drain loops of a worker.
struct SharedWorkerStats {
    completed: AtomicU64,
    team_suspended: AtomicU64,
    parked: AtomicU64,
    retried: AtomicU64,
    claim_errors: AtomicU64,
}

impl SharedWorkerStats {
    fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            team_suspended: AtomicU64::new(0),
            parked: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            claim_errors: AtomicU64::new(0),
        }
    }

    fn add(&self, summary: &DrainSummary) {
        self.completed.fetch_add(summary.completed, Ordering::SeqCst);
        self.team_suspended
            .fetch_add(summary.team_suspended, Ordering::SeqCst);
        self.parked.fetch_add(summary.parked, Ordering::SeqCst);
        self.retried.fetch_add(summary.retried, Ordering::SeqCst);
        self.claim_errors
            .fetch_add(summary.claim_errors, Ordering::SeqCst);
    }

    fn snapshot(&self) -> DrainSummary {
        DrainSummary {
            completed: self.completed.load(Ordering::SeqCst),
            team_suspended: self.team_suspended.load(Ordering::SeqCst),
            parked: self.parked.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            claim_errors: self.claim_errors.load(Ordering::SeqCst),
        }
    }
}

struct WorkerInner {
    config: WorkerConfig,
    queue: Arc<dyn TrainingQueue>,
    pipeline: QaPipeline,
    admission: Arc<AdmissionCounter>,
    wake: Notify,
    stopping: AtomicBool,
    stats: SharedWorkerStats,
}

/// The QA generation worker.
///
/// Cloning is cheap; clones share the admission counter and statistics.
#[derive(Clone)]
pub struct QaWorker {
    inner: Arc<WorkerInner>,
}

impl QaWorker {
    pub fn new(config: WorkerConfig, collaborators: Collaborators) -> Self {
        let admission = AdmissionCounter::new(config.max_concurrency);
        let queue = Arc::clone(&collaborators.queue);
        Self {
            inner: Arc::new(WorkerInner {
                pipeline: QaPipeline::new(config.clone(), collaborators),
                config,
                queue,
                admission,
                wake: Notify::new(),
                stopping: AtomicBool::new(false),
                stats: SharedWorkerStats::new(),
            }),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Tasks currently being worked on by this process.
    pub fn in_flight(&self) -> usize {
        self.inner.admission.in_flight()
    }

    /// Totals across all drain loops so far.
    pub fn stats(&self) -> DrainSummary {
        self.inner.stats.snapshot()
    }

    /// Claims and runs tasks until the queue is empty, the admission cap is
    /// reached, or the worker is stopping.
    pub async fn drain(&self) -> DrainSummary {
        let inner = &self.inner;
        let mut summary = DrainSummary::default();

        while !inner.stopping.load(Ordering::Acquire) {
            let Some(permit) = inner.admission.try_acquire() else {
                debug!(max = inner.admission.max(), "Admission cap reached");
                break;
            };

            let stale_before = Utc::now()
                - chrono::Duration::from_std(inner.config.stale_lease_after)
                    .unwrap_or_else(|_| chrono::Duration::minutes(10));

            let task = match inner.queue.claim_next(TrainingMode::Qa, stale_before).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    drop(permit);
                    info!("QA queue drained");
                    break;
                }
                Err(e) => {
                    drop(permit);
                    summary.claim_errors += 1;
                    warn!(error = %e, "Failed to claim QA task, retrying");
                    tokio::task::yield_now().await;
                    continue;
                }
            };

            debug!(task_id = %task.id, team_id = %task.team_id, "Claimed QA task");
            let outcome = inner.pipeline.execute(&task).await;
            drop(permit);
            summary.record(&outcome);

            match outcome.next_step(inner.config.retry_delay) {
                NextStep::Continue => {}
                NextStep::RetryAfter(delay) => tokio::time::sleep(delay).await,
            }
        }

        inner.stats.add(&summary);
        summary
    }

    /// Starts one drain loop in the background.
    pub fn trigger(&self) -> JoinHandle<DrainSummary> {
        let worker = self.clone();
        tokio::spawn(async move { worker.drain().await })
    }

    /// Starts as many drain loops as the admission cap allows.
    pub fn start(&self) -> Vec<JoinHandle<DrainSummary>> {
        (0..self.inner.config.max_concurrency)
            .map(|_| self.trigger())
            .collect()
    }

    /// Asks a running [`QaWorker::run`] to start a drain loop.
    pub fn wake(&self) {
        self.inner.wake.notify_one();
    }

    /// Keeps drain loops going until `shutdown` resolves.
    ///
    /// Loops are started on launch, on every idle poll tick and on
    /// [`QaWorker::wake`]. After shutdown no new task is claimed and the
    /// call returns once in-flight tasks have finished.
    pub async fn run<F>(&self, shutdown: F) -> DrainSummary
    where
        F: Future<Output = ()>,
    {
        let inner = &self.inner;
        inner.stopping.store(false, Ordering::Release);
        tokio::pin!(shutdown);

        let mut drains: JoinSet<DrainSummary> = JoinSet::new();
        let mut idle = tokio::time::interval(inner.config.idle_poll_interval);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_concurrency = inner.config.max_concurrency,
            idle_poll_secs = inner.config.idle_poll_interval.as_secs(),
            "QA worker started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = idle.tick() => {
                    let free = inner.config.max_concurrency.saturating_sub(drains.len());
                    for _ in 0..free {
                        let worker = self.clone();
                        drains.spawn(async move { worker.drain().await });
                    }
                }
                _ = inner.wake.notified() => {
                    if drains.len() < inner.config.max_concurrency {
                        let worker = self.clone();
                        drains.spawn(async move { worker.drain().await });
                    }
                }
                Some(joined) = drains.join_next(), if !drains.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Drain loop panicked");
                    }
                }
            }
        }

        inner.stopping.store(true, Ordering::Release);
        info!(
            in_flight = inner.admission.in_flight(),
            "Shutting down QA worker, waiting for in-flight tasks"
        );
        while let Some(joined) = drains.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Drain loop panicked during shutdown");
            }
        }

        let totals = self.stats();
        info!(
            completed = totals.completed,
            parked = totals.parked,
            team_suspended = totals.team_suspended,
            retried = totals.retried,
            "QA worker stopped"
        );
        totals
    }
}
