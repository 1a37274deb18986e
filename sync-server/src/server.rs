//! Main Unicloud engine coordination.
//!
//! [`Unicloud`] owns the store handle, the clock and the metrics, and hands
//! them to the lifecycle manager, evaluator, registries and scheduler. Nothing
//! in the crate keeps process-global state; tests build an engine over an
//! in-memory store and a [`sync_core::ManualClock`].

use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::error::EngineResult;
use crate::evaluator::StatusEvaluator;
use crate::lifecycle::EventManager;
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::shares::{ShareRegistry, ShareSizer};
use crate::storage::SyncStore;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use sync_core::Clock;

/// Operational metrics for monitoring engine activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64`; incrementing needs no locks.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Events opened (sync start reports accepted).
    pub events_opened: AtomicU64,
    /// Events closed by their client.
    pub events_closed: AtomicU64,
    /// Events force-closed as interrupted.
    pub events_interrupted: AtomicU64,
    /// Completed sync-status refresh runs.
    pub status_refresh_runs: AtomicU64,
    /// Cached classification writes.
    pub status_writes: AtomicU64,
    /// Per-client evaluation failures.
    pub evaluation_failures: AtomicU64,
    /// Completed share size refresh runs.
    pub size_refresh_runs: AtomicU64,
    /// Per-share size computation failures.
    pub aggregation_failures: AtomicU64,
    /// Event logs cleared by retention.
    pub logs_pruned: AtomicU64,
    /// Job runs aborted by a storage failure.
    pub job_aborts: AtomicU64,
}

/// The engine.
pub struct Unicloud {
    config: Config,
    store: Arc<dyn SyncStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    started_at: Instant,
    events: EventManager,
    evaluator: StatusEvaluator,
    clients: ClientRegistry,
    shares: ShareRegistry,
}

impl std::fmt::Debug for Unicloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unicloud")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Unicloud {
    /// Create an engine over the given store, clock and share sizer.
    pub fn new(
        config: Config,
        store: Arc<dyn SyncStore>,
        clock: Arc<dyn Clock>,
        sizer: Arc<dyn ShareSizer>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::default());
        Self {
            events: EventManager::new(store.clone(), metrics.clone()),
            evaluator: StatusEvaluator::new(store.clone(), metrics.clone()),
            clients: ClientRegistry::new(store.clone(), clock.clone()),
            shares: ShareRegistry::new(store.clone(), sizer),
            config,
            store,
            clock,
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Get the clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Seconds since the engine was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Event lifecycle manager.
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// Sync status evaluator.
    pub fn evaluator(&self) -> &StatusEvaluator {
        &self.evaluator
    }

    /// Client registry.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Share registry.
    pub fn shares(&self) -> &ShareRegistry {
        &self.shares
    }

    /// Build a scheduler sharing this engine's components.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.config.scheduler.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.evaluator.clone(),
            self.shares.clone(),
            self.metrics.clone(),
        )
    }

    /// Run startup recovery and spawn the background jobs.
    ///
    /// With `lifecycle.recover_on_start`, every event still `SYNCING` is
    /// treated as interrupted: the process that would have closed it
    /// reported to a server that is no longer running.
    pub async fn start(&self) -> EngineResult<SchedulerHandle> {
        if self.config.lifecycle.recover_on_start {
            let recovered = self.events.recover_all().await?;
            tracing::info!("Startup recovery: {} interrupted events marked KO", recovered);
        }

        Ok(Arc::new(self.scheduler()).spawn())
    }
}
