//! Storage layer for sync-server.
//!
//! The engine talks to persistence only through [`SyncStore`], a typed
//! repository with parameterized operations. Each mutating call is a single
//! atomic statement committed before it returns; there is no other
//! synchronization between interactive calls and background jobs.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use sync_types::{
    ClientName, ClientStatus, EventId, EventStatus, ShareName, SyncClassification, Threshold,
};

/// One listed row, or why it could not be mapped to its model type.
pub type RowResult<T> = Result<T, StorageError>;

/// Default page size for event listings.
pub const DEFAULT_EVENT_LIMIT: u32 = 50;

/// A registered client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Client {
    /// Unique client name.
    pub name: ClientName,
    /// Public key material the client authenticates with.
    pub ssh_key: String,
    /// Registration status.
    pub status: ClientStatus,
    /// Share the client synchronizes.
    pub share: String,
    /// Freshness threshold.
    pub threshold: Threshold,
    /// Last classification written by the evaluator.
    pub sync_status: Option<SyncClassification>,
    /// Unix timestamp of registration.
    pub joindate: i64,
}

/// Request to register a client.
#[derive(Debug, Clone)]
pub struct NewClient {
    /// Unique client name.
    pub name: ClientName,
    /// Public key material.
    pub ssh_key: String,
    /// Initial registration status.
    pub status: ClientStatus,
    /// Share the client synchronizes.
    pub share: String,
    /// Unix timestamp of registration.
    pub joindate: i64,
}

/// A synchronization event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Store-assigned sequence id.
    pub id: EventId,
    /// Owning client. The client row may no longer exist.
    pub client: ClientName,
    /// Share being synchronized.
    pub share: String,
    /// Free-text log, cleared by retention pruning.
    pub log: Option<String>,
    /// Reported start, Unix seconds.
    pub start_ts: i64,
    /// Reported end, set on close.
    pub end_ts: Option<i64>,
    /// `end_ts - start_ts`, set on close.
    pub duration: Option<u64>,
    /// Sync status reported by the client on close.
    pub sync_status: Option<String>,
    /// Lifecycle status.
    pub status: EventStatus,
}

/// Request to open a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Owning client.
    pub client: ClientName,
    /// Share being synchronized.
    pub share: String,
    /// Reported start, Unix seconds.
    pub start_ts: i64,
}

/// Fields written when an open event is closed.
#[derive(Debug, Clone)]
pub struct EventClose {
    /// Final status (`OK` or `KO`).
    pub status: EventStatus,
    /// Sync status reported by the client.
    pub sync_status: Option<String>,
    /// Reported end, Unix seconds.
    pub end_ts: i64,
    /// Validated duration in seconds.
    pub duration: u64,
    /// Free-text log.
    pub log: Option<String>,
}

/// A share (storage location).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    /// Unique share name.
    pub name: ShareName,
    /// Human description.
    pub description: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Last computed size in bytes, `None` until the first aggregation.
    pub size: Option<u64>,
}

/// Filter for event listings. `None` fields match everything.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Only events of this client.
    pub client: Option<ClientName>,
    /// Only events in this status.
    pub status: Option<EventStatus>,
    /// Only events with this reported sync status.
    pub sync_status: Option<String>,
    /// Maximum number of events, newest start first.
    pub limit: u32,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            client: None,
            status: None,
            sync_status: None,
            limit: DEFAULT_EVENT_LIMIT,
        }
    }
}

/// Aggregate event counters for one client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    /// Number of OK events.
    pub ok: u64,
    /// Number of KO events.
    pub ko: u64,
    /// End time of the client's highest-id event.
    pub last_seen: Option<i64>,
    /// Mean duration of events that have one.
    pub avg_duration: Option<f64>,
}

/// Trait for sync storage backends.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Look up a client by name.
    async fn get_client(&self, name: &ClientName) -> Result<Option<Client>, StorageError>;

    /// Insert a client.
    ///
    /// Returns `false` without writing if the name is taken.
    async fn insert_client(&self, client: NewClient) -> Result<bool, StorageError>;

    /// Set a client's status to `Active`. Returns `false` if the client is unknown.
    async fn activate_client(&self, name: &ClientName) -> Result<bool, StorageError>;

    /// Delete a client row. Its events are left in place.
    async fn remove_client(&self, name: &ClientName) -> Result<bool, StorageError>;

    /// Update a client's freshness threshold.
    async fn set_threshold(
        &self,
        name: &ClientName,
        threshold: Threshold,
    ) -> Result<bool, StorageError>;

    /// Write the cached classification onto a client.
    async fn set_cached_status(
        &self,
        name: &ClientName,
        status: SyncClassification,
    ) -> Result<bool, StorageError>;

    /// All clients, ordered by name.
    ///
    /// Each row maps on its own: a row that cannot be read back is an `Err`
    /// entry and does not hide the others.
    async fn list_clients(&self) -> Result<Vec<RowResult<Client>>, StorageError>;

    /// Clients with a non-zero threshold, ordered by name. Rows map as in
    /// [`list_clients`](Self::list_clients).
    async fn list_clients_with_threshold(&self) -> Result<Vec<RowResult<Client>>, StorageError>;

    /// Insert an event in `SYNCING` state and return its id.
    async fn insert_event(&self, event: NewEvent) -> Result<EventId, StorageError>;

    /// Find the open event of `client` that started at `start_ts`.
    ///
    /// If a race left several, the one with the highest id is returned.
    async fn find_open_event(
        &self,
        client: &ClientName,
        start_ts: i64,
    ) -> Result<Option<Event>, StorageError>;

    /// Close an event.
    ///
    /// Only applies while the event is still `SYNCING`; returns `false` if
    /// it was closed concurrently.
    async fn close_event(&self, id: EventId, close: EventClose) -> Result<bool, StorageError>;

    /// Move every `SYNCING` event of `client` to `status` with `log`.
    ///
    /// Returns the number of events changed.
    async fn close_open_events(
        &self,
        client: &ClientName,
        status: EventStatus,
        log: &str,
    ) -> Result<u64, StorageError>;

    /// Names of clients that have at least one `SYNCING` event.
    async fn clients_with_open_events(&self) -> Result<Vec<ClientName>, StorageError>;

    /// The `OK` event of `client` with the highest id.
    async fn latest_ok_event(&self, client: &ClientName) -> Result<Option<Event>, StorageError>;

    /// Look up an event by id.
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StorageError>;

    /// Events matching `filter`, newest start first.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError>;

    /// Aggregate counters for `client`.
    async fn client_stats(&self, client: &ClientName) -> Result<ClientStats, StorageError>;

    /// Highest event id, `None` if there are no events.
    async fn max_event_id(&self) -> Result<Option<EventId>, StorageError>;

    /// Clear the log text of every event with an id below `cutoff`.
    ///
    /// Returns the number of events whose log was cleared.
    async fn prune_logs_before(&self, cutoff: EventId) -> Result<u64, StorageError>;

    /// Reclaim space freed by pruning.
    async fn compact(&self) -> Result<(), StorageError>;

    /// Insert a share. Returns `false` if the name or path is taken.
    async fn insert_share(&self, share: Share) -> Result<bool, StorageError>;

    /// Look up a share by name.
    async fn get_share(&self, name: &ShareName) -> Result<Option<Share>, StorageError>;

    /// Look up the share registered at `path`.
    async fn share_by_path(&self, path: &Path) -> Result<Option<Share>, StorageError>;

    /// Delete a share. Returns `false` if it is unknown.
    async fn remove_share(&self, name: &ShareName) -> Result<bool, StorageError>;

    /// All shares, ordered by name.
    async fn list_shares(&self) -> Result<Vec<Share>, StorageError>;

    /// Persist a freshly computed share size.
    async fn update_share_size(&self, name: &ShareName, size: u64) -> Result<bool, StorageError>;
}
