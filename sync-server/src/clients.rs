//! Client registry.
//!
//! Registration, activation, removal and threshold changes. These may run
//! concurrently with the scheduler; the evaluator tolerates a client
//! disappearing between listing and writing.

use crate::error::{EngineError, EngineResult};
use crate::storage::{Client, NewClient, SyncStore};
use serde::Serialize;
use std::sync::Arc;
use sync_core::Clock;
use sync_types::{ClientName, ClientStatus, SyncClassification, Threshold};

/// Result of a client status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAccess {
    /// No client by that name.
    Unknown,
    /// Registered but not yet activated.
    PendingActivation,
    /// Activated.
    Active,
}

/// Summary of a client and its event history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: ClientName,
    /// Registration status.
    pub status: ClientStatus,
    /// Share the client synchronizes.
    pub share: String,
    /// Freshness threshold.
    pub threshold: Threshold,
    /// Cached classification.
    pub sync_status: Option<SyncClassification>,
    /// Registration time.
    pub joindate: i64,
    /// Number of OK events.
    pub ok: u64,
    /// Number of KO events.
    pub ko: u64,
    /// `ok + ko`.
    pub total: u64,
    /// End time of the most recent event, if it was closed.
    pub last_seen: Option<i64>,
    /// Mean duration of closed events in seconds, two decimals.
    pub avg_duration: Option<f64>,
}

/// Client registry operations.
#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn SyncStore>,
    clock: Arc<dyn Clock>,
}

impl ClientRegistry {
    /// Create a registry over a store.
    pub fn new(store: Arc<dyn SyncStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Self-registration by a client. Needs activation before use.
    pub async fn register(
        &self,
        name: &ClientName,
        ssh_key: &str,
        share: &str,
    ) -> EngineResult<()> {
        self.insert(name, ssh_key, share, ClientStatus::Registered)
            .await
    }

    /// Add a client that is active immediately.
    pub async fn add(&self, name: &ClientName, ssh_key: &str, share: &str) -> EngineResult<()> {
        self.insert(name, ssh_key, share, ClientStatus::Active).await
    }

    /// Activate a registered client.
    pub async fn activate(&self, name: &ClientName) -> EngineResult<()> {
        let found = self.store.activate_client(name).await?;
        require(found, name)?;
        tracing::info!("Activated client {}", name);
        Ok(())
    }

    /// Remove a client. Its events are kept.
    pub async fn remove(&self, name: &ClientName) -> EngineResult<()> {
        let found = self.store.remove_client(name).await?;
        require(found, name)?;
        tracing::info!("Removed client {}", name);
        Ok(())
    }

    /// Change a client's threshold. Applies from the next evaluation.
    pub async fn set_threshold(&self, name: &ClientName, threshold: Threshold) -> EngineResult<()> {
        let found = self.store.set_threshold(name, threshold).await?;
        require(found, name)?;
        tracing::info!("Threshold of {} set to {}", name, threshold);
        Ok(())
    }

    /// Look up a client.
    pub async fn get(&self, name: &ClientName) -> EngineResult<Client> {
        self.store
            .get_client(name)
            .await?
            .ok_or_else(|| unknown(name))
    }

    /// All clients, ordered by name. Rows that cannot be read are logged and
    /// left out.
    pub async fn list(&self) -> EngineResult<Vec<Client>> {
        let mut clients = Vec::new();
        for row in self.store.list_clients().await? {
            match row {
                Ok(client) => clients.push(client),
                Err(e) => tracing::warn!("Skipping client row: {}", e),
            }
        }
        Ok(clients)
    }

    /// Whether `name` may report syncs.
    pub async fn access(&self, name: &ClientName) -> EngineResult<ClientAccess> {
        let access = match self.store.get_client(name).await? {
            None => ClientAccess::Unknown,
            Some(client) => match client.status {
                ClientStatus::Registered => ClientAccess::PendingActivation,
                ClientStatus::Active => ClientAccess::Active,
            },
        };
        Ok(access)
    }

    /// Last classification written by the evaluator, without re-evaluating.
    pub async fn cached_status(&self, name: &ClientName) -> EngineResult<Option<SyncClassification>> {
        Ok(self.get(name).await?.sync_status)
    }

    /// Client summary with event counters.
    pub async fn info(&self, name: &ClientName) -> EngineResult<ClientInfo> {
        let client = self.get(name).await?;
        let stats = self.store.client_stats(name).await?;

        Ok(ClientInfo {
            name: client.name,
            status: client.status,
            share: client.share,
            threshold: client.threshold,
            sync_status: client.sync_status,
            joindate: client.joindate,
            ok: stats.ok,
            ko: stats.ko,
            total: stats.ok + stats.ko,
            last_seen: stats.last_seen,
            avg_duration: stats.avg_duration.map(|avg| (avg * 100.0).round() / 100.0),
        })
    }

    async fn insert(
        &self,
        name: &ClientName,
        ssh_key: &str,
        share: &str,
        status: ClientStatus,
    ) -> EngineResult<()> {
        let inserted = self
            .store
            .insert_client(NewClient {
                name: name.clone(),
                ssh_key: ssh_key.to_string(),
                status,
                share: share.to_string(),
                joindate: self.clock.now(),
            })
            .await?;

        if !inserted {
            return Err(EngineError::ClientExists {
                client: name.to_string(),
            });
        }
        tracing::info!("Client {} joined as {}", name, status);
        Ok(())
    }
}

fn unknown(name: &ClientName) -> EngineError {
    EngineError::UnknownClient {
        client: name.to_string(),
    }
}

fn require(found: bool, name: &ClientName) -> EngineResult<()> {
    if found {
        Ok(())
    } else {
        Err(unknown(name))
    }
}
