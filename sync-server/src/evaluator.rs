//! Sync status evaluator.
//!
//! Derives a client's freshness from its most recent OK event and keeps the
//! cached classification on the client row current.

use crate::error::{EngineError, EngineResult};
use crate::server::EngineMetrics;
use crate::storage::{Client, SyncStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_core::classify;
use sync_types::{ClientName, SyncClassification};

/// Evaluates and caches client classifications.
#[derive(Clone)]
pub struct StatusEvaluator {
    store: Arc<dyn SyncStore>,
    metrics: Arc<EngineMetrics>,
}

impl StatusEvaluator {
    /// Create an evaluator over a store.
    pub fn new(store: Arc<dyn SyncStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Classify `client` as of `now`. Read-only.
    pub async fn evaluate(&self, client: &ClientName, now: i64) -> EngineResult<SyncClassification> {
        let record = self
            .store
            .get_client(client)
            .await?
            .ok_or_else(|| EngineError::UnknownClient {
                client: client.to_string(),
            })?;
        self.evaluate_client(&record, now).await
    }

    /// Classify an already loaded client record.
    pub async fn evaluate_client(
        &self,
        client: &Client,
        now: i64,
    ) -> EngineResult<SyncClassification> {
        let last_ok_end = self
            .store
            .latest_ok_event(&client.name)
            .await?
            .and_then(|event| event.end_ts);
        Ok(classify(last_ok_end, client.threshold, now))
    }

    /// Persist `classification` as the cached status of `client`.
    ///
    /// Writes only when the value differs from the cached one; returns
    /// whether a write happened.
    pub async fn update_cached_status(
        &self,
        client: &ClientName,
        classification: SyncClassification,
    ) -> EngineResult<bool> {
        let record = self
            .store
            .get_client(client)
            .await?
            .ok_or_else(|| EngineError::UnknownClient {
                client: client.to_string(),
            })?;
        self.write_if_changed(&record, classification).await
    }

    /// Evaluate `client` and cache the result.
    pub async fn refresh(&self, client: &Client, now: i64) -> EngineResult<SyncClassification> {
        let classification = self.evaluate_client(client, now).await?;
        self.write_if_changed(client, classification).await?;
        Ok(classification)
    }

    async fn write_if_changed(
        &self,
        client: &Client,
        classification: SyncClassification,
    ) -> EngineResult<bool> {
        if client.sync_status == Some(classification) {
            return Ok(false);
        }

        // Removed since it was loaded.
        if !self
            .store
            .set_cached_status(&client.name, classification)
            .await?
        {
            return Err(EngineError::UnknownClient {
                client: client.name.to_string(),
            });
        }

        self.metrics.status_writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Cached status of {} changed from {:?} to {}",
            client.name,
            client.sync_status,
            classification
        );
        Ok(true)
    }
}
