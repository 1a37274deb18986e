//! Background jobs.
//!
//! Three recurring jobs, each on its own tokio task and timer:
//!
//! - sync-status refresh for every client with a threshold
//! - share size refresh
//! - event log retention
//!
//! A job awaits its own run before waiting for the next tick, so a slow run
//! delays that job only and never overlaps itself. Job errors are logged and
//! counted; they never end the task. Shutdown is checked between runs.

use crate::config::SchedulerConfig;
use crate::error::{EngineError, StorageError};
use crate::evaluator::StatusEvaluator;
use crate::server::EngineMetrics;
use crate::shares::ShareRegistry;
use crate::storage::SyncStore;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{log_retention_cutoff, Clock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of one run over a set of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Items looked at.
    pub processed: u64,
    /// Items whose stored value was written.
    pub updated: u64,
    /// Items skipped after an error.
    pub failed: u64,
}

/// Runs the periodic jobs against the shared store.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn SyncStore>,
    clock: Arc<dyn Clock>,
    evaluator: StatusEvaluator,
    shares: ShareRegistry,
    metrics: Arc<EngineMetrics>,
}

impl Scheduler {
    /// Create a scheduler. Nothing runs until [`spawn`](Self::spawn).
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn SyncStore>,
        clock: Arc<dyn Clock>,
        evaluator: StatusEvaluator,
        shares: ShareRegistry,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            evaluator,
            shares,
            metrics,
        }
    }

    /// Evaluate every client with a threshold and cache the result.
    ///
    /// Clients with a zero threshold are not touched. A client that fails to
    /// evaluate, or whose row cannot be read, keeps its cached status; the
    /// others are still processed. A storage failure aborts the run.
    pub async fn refresh_sync_status(&self) -> Result<RefreshReport, StorageError> {
        let rows = self.store.list_clients_with_threshold().await?;
        let now = self.clock.now();
        let mut report = RefreshReport::default();

        for row in rows {
            report.processed += 1;
            let client = match row {
                Ok(client) => client,
                Err(e) => {
                    report.failed += 1;
                    self.metrics
                        .evaluation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Status refresh skipped unreadable client: {}", e);
                    continue;
                }
            };

            match self.evaluator.refresh(&client, now).await {
                Ok(status) => {
                    if client.sync_status != Some(status) {
                        report.updated += 1;
                    }
                }
                Err(EngineError::Storage(e)) => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    self.metrics
                        .evaluation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Status refresh skipped {}: {}", client.name, e);
                }
            }
        }

        self.metrics
            .status_refresh_runs
            .fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Recompute the size of every share.
    ///
    /// A share whose size cannot be computed keeps its previous size and is
    /// retried on the next run. A storage failure aborts the run.
    pub async fn refresh_share_sizes(&self) -> Result<RefreshReport, StorageError> {
        let shares = self.store.list_shares().await?;
        let mut report = RefreshReport::default();

        for share in shares {
            report.processed += 1;
            match self.shares.refresh_share(&share).await {
                Ok(_) => report.updated += 1,
                Err(EngineError::Storage(e)) => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    self.metrics
                        .aggregation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Size refresh skipped share {}: {}", share.name, e);
                }
            }
        }

        self.metrics.size_refresh_runs.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Clear the log text of events older than the retention window, then
    /// compact the store. Returns the number of logs cleared.
    pub async fn prune_logs(&self) -> Result<u64, StorageError> {
        let max_id = self.store.max_event_id().await?;
        let Some(cutoff) = log_retention_cutoff(max_id, self.config.max_log_events) else {
            tracing::debug!(
                "Log retention: nothing beyond the last {} events",
                self.config.max_log_events
            );
            return Ok(0);
        };

        let pruned = self.store.prune_logs_before(cutoff).await?;
        self.store.compact().await?;

        self.metrics.logs_pruned.fetch_add(pruned, Ordering::Relaxed);
        Ok(pruned)
    }

    /// Spawn one task per enabled job.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return SchedulerHandle { tasks, cancel };
        }

        match self.config.status_interval() {
            Some(every) => {
                let scheduler = self.clone();
                tasks.push(spawn_job("sync-status refresh", every, cancel.clone(), move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.run_status_refresh().await }
                }));
            }
            None => tracing::info!("Sync-status refresh disabled"),
        }

        match self.config.size_interval() {
            Some(every) => {
                let scheduler = self.clone();
                tasks.push(spawn_job("share size refresh", every, cancel.clone(), move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.run_size_refresh().await }
                }));
            }
            None => tracing::info!("Share size refresh disabled"),
        }

        match self.config.retention_interval() {
            Some(every) => {
                let scheduler = self.clone();
                tasks.push(spawn_job("log retention", every, cancel.clone(), move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.run_retention().await }
                }));
            }
            None => tracing::info!("Log retention disabled"),
        }

        SchedulerHandle { tasks, cancel }
    }

    async fn run_status_refresh(&self) {
        match self.refresh_sync_status().await {
            Ok(report) if report.updated > 0 || report.failed > 0 => {
                tracing::info!(
                    "Status refresh: {} clients, {} changed, {} failed",
                    report.processed,
                    report.updated,
                    report.failed
                );
            }
            Ok(report) => {
                tracing::debug!("Status refresh: {} clients, no change", report.processed);
            }
            Err(e) => self.abort("sync-status refresh", e),
        }
    }

    async fn run_size_refresh(&self) {
        match self.refresh_share_sizes().await {
            Ok(report) => {
                tracing::info!(
                    "Size refresh: {} shares, {} failed",
                    report.processed,
                    report.failed
                );
            }
            Err(e) => self.abort("share size refresh", e),
        }
    }

    async fn run_retention(&self) {
        match self.prune_logs().await {
            Ok(0) => tracing::debug!("Log retention: no logs cleared"),
            Ok(pruned) => tracing::info!("Log retention: cleared {} event logs", pruned),
            Err(e) => self.abort("log retention", e),
        }
    }

    fn abort(&self, job: &str, err: StorageError) {
        self.metrics.job_aborts.fetch_add(1, Ordering::Relaxed);
        tracing::error!("{} run aborted: {}", job, err);
    }
}

/// Run `job` every `every` until `cancel` fires.
///
/// Cancellation is only observed between runs, so a run that has started
/// always completes.
fn spawn_job<F, Fut>(
    name: &'static str,
    every: Duration,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let Some(first) = Instant::now().checked_add(every) else {
            tracing::error!(
                "{} interval of {}s is out of range, job not started",
                name,
                every.as_secs()
            );
            return;
        };
        tracing::info!("{} job started (interval: {}s)", name, every.as_secs());

        let mut timer = interval_at(first, every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("{} job stopped", name);
                    break;
                }
                _ = timer.tick() => job().await,
            }
        }
    })
}

/// Handle to the spawned job tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Number of running jobs.
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every job and wait for the tasks to finish.
    ///
    /// A run in progress is allowed to complete first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Job task failed: {}", e);
            }
        }
    }
}
