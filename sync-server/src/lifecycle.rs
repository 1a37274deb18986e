//! Event lifecycle manager.
//!
//! Opens, closes and recovers synchronization events. Clients are remote
//! agents that may crash between reporting a start and reporting the end,
//! so the manager never waits for a close: before a client opens a new
//! event, any event it left in `SYNCING` is swept to `KO`. This keeps at
//! most one open event per client without a uniqueness constraint; two
//! racing starts for the same client both insert, and the leftover row is
//! swept by the next start.

use crate::error::{EngineError, EngineResult};
use crate::server::EngineMetrics;
use crate::storage::{Event, EventClose, EventFilter, NewEvent, SyncStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_core::{duration_secs, transition, Outcome, Transition, INTERRUPTED_LOG};
use sync_types::{ClientName, EventId, EventStatus};

/// Completion report for an open event.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    /// Start time identifying the event.
    pub start_ts: i64,
    /// Reported end time.
    pub end_ts: i64,
    /// Final status, `OK` or `KO`.
    pub status: EventStatus,
    /// Sync status reported by the client.
    pub sync_status: Option<String>,
    /// Free-text log.
    pub log: Option<String>,
}

/// Opens, closes and recovers events.
#[derive(Clone)]
pub struct EventManager {
    store: Arc<dyn SyncStore>,
    metrics: Arc<EngineMetrics>,
}

impl EventManager {
    /// Create a manager over a store.
    pub fn new(store: Arc<dyn SyncStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Open a new `SYNCING` event for `client`.
    ///
    /// Any event the client left open is marked interrupted first.
    pub async fn open_event(
        &self,
        client: &ClientName,
        share: &str,
        start_ts: i64,
    ) -> EngineResult<EventId> {
        self.require_client(client).await?;
        self.recover_interrupted(client).await?;

        let id = self
            .store
            .insert_event(NewEvent {
                client: client.clone(),
                share: share.to_string(),
                start_ts,
            })
            .await?;

        self.metrics.events_opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Opened event {} for {} (start {})", id, client, start_ts);
        Ok(id)
    }

    /// Close the open event of `client` that started at `req.start_ts`.
    ///
    /// Returns the recorded duration in seconds. Nothing is written when the
    /// duration would be negative.
    pub async fn close_event(&self, client: &ClientName, req: CloseRequest) -> EngineResult<u64> {
        self.require_client(client).await?;

        let outcome = Outcome::try_from(req.status)?;
        let duration = duration_secs(req.start_ts, req.end_ts)?;

        let event = self
            .store
            .find_open_event(client, req.start_ts)
            .await?
            .ok_or_else(|| not_found(client, req.start_ts))?;
        let status = transition(event.status, Transition::Complete(outcome))?;

        let applied = self
            .store
            .close_event(
                event.id,
                EventClose {
                    status,
                    sync_status: req.sync_status,
                    end_ts: req.end_ts,
                    duration,
                    log: req.log,
                },
            )
            .await?;

        // Swept or closed by a concurrent call between lookup and update.
        if !applied {
            return Err(not_found(client, req.start_ts));
        }

        self.metrics.events_closed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Closed event {} for {} with {} after {}s",
            event.id,
            client,
            status,
            duration
        );
        Ok(duration)
    }

    /// Mark every `SYNCING` event of `client` as interrupted.
    ///
    /// Idempotent; returns the number of events fixed. Does not require the
    /// client to still be registered.
    pub async fn recover_interrupted(&self, client: &ClientName) -> EngineResult<u64> {
        let status = transition(EventStatus::Syncing, Transition::Interrupt)?;
        let fixed = self
            .store
            .close_open_events(client, status, INTERRUPTED_LOG)
            .await?;

        if fixed > 0 {
            self.metrics
                .events_interrupted
                .fetch_add(fixed, Ordering::Relaxed);
            tracing::info!("Marked {} interrupted event(s) of {} as {}", fixed, client, status);
        }
        Ok(fixed)
    }

    /// Run [`recover_interrupted`](Self::recover_interrupted) for every
    /// client with an open event.
    pub async fn recover_all(&self) -> EngineResult<u64> {
        let mut total = 0;
        for client in self.store.clients_with_open_events().await? {
            total += self.recover_interrupted(&client).await?;
        }
        Ok(total)
    }

    /// Look up a closed event. Open events are not exposed.
    pub async fn closed_event(&self, id: EventId) -> EngineResult<Option<Event>> {
        let event = self.store.get_event(id).await?;
        Ok(event.filter(|e| e.status.is_closed()))
    }

    /// Events matching `filter`, newest start first.
    pub async fn list_events(&self, filter: &EventFilter) -> EngineResult<Vec<Event>> {
        Ok(self.store.list_events(filter).await?)
    }

    async fn require_client(&self, client: &ClientName) -> EngineResult<()> {
        match self.store.get_client(client).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownClient {
                client: client.to_string(),
            }),
        }
    }
}

fn not_found(client: &ClientName, start_ts: i64) -> EngineError {
    EngineError::EventNotFound {
        client: client.to_string(),
        start_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewClient, SqliteStorage};
    use sync_core::LifecycleError;
    use sync_types::ClientStatus;

    fn name(s: &str) -> ClientName {
        ClientName::new(s).unwrap()
    }

    async fn setup(clients: &[&str]) -> (Arc<SqliteStorage>, EventManager) {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        for client in clients {
            storage
                .insert_client(NewClient {
                    name: name(client),
                    ssh_key: "ssh-ed25519 AAAA".to_string(),
                    status: ClientStatus::Active,
                    share: "home".to_string(),
                    joindate: 0,
                })
                .await
                .unwrap();
        }
        let manager = EventManager::new(storage.clone(), Arc::new(EngineMetrics::default()));
        (storage, manager)
    }

    fn ok_close(start_ts: i64, end_ts: i64) -> CloseRequest {
        CloseRequest {
            start_ts,
            end_ts,
            status: EventStatus::Ok,
            sync_status: Some("synced".to_string()),
            log: Some("3 files transferred".to_string()),
        }
    }

    async fn open_events(storage: &SqliteStorage, client: &str) -> Vec<Event> {
        storage
            .list_events(&EventFilter {
                client: Some(name(client)),
                status: Some(EventStatus::Syncing),
                ..EventFilter::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_event_requires_registered_client() {
        let (_, manager) = setup(&[]).await;
        let err = manager.open_event(&name("ghost"), "home", 1).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownClient { client } if client == "ghost"));
    }

    #[tokio::test]
    async fn open_then_close_records_duration() {
        let (storage, manager) = setup(&["alice"]).await;

        let id = manager.open_event(&name("alice"), "home", 1000).await.unwrap();
        let duration = manager
            .close_event(&name("alice"), ok_close(1000, 1050))
            .await
            .unwrap();
        assert_eq!(duration, 50);

        let event = storage.get_event(id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Ok);
        assert_eq!(event.end_ts, Some(1050));
        assert_eq!(event.duration, Some(50));
        assert_eq!(event.sync_status.as_deref(), Some("synced"));
        assert_eq!(manager.metrics.events_opened.load(Ordering::Relaxed), 1);
        assert_eq!(manager.metrics.events_closed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn orphaned_event_is_interrupted_on_next_open() {
        let (storage, manager) = setup(&["bob"]).await;

        let orphan = manager.open_event(&name("bob"), "home", 500).await.unwrap();
        let fresh = manager.open_event(&name("bob"), "home", 900).await.unwrap();

        let orphan = storage.get_event(orphan).await.unwrap().unwrap();
        assert_eq!(orphan.status, EventStatus::Ko);
        assert_eq!(orphan.log.as_deref(), Some("Sync was interrupted"));

        let open = open_events(&storage, "bob").await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fresh);
        assert_eq!(open[0].start_ts, 900);
        assert_eq!(manager.metrics.events_interrupted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn close_without_open_event_is_not_found() {
        let (_, manager) = setup(&["alice"]).await;
        let err = manager
            .close_event(&name("alice"), ok_close(1000, 1050))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EventNotFound { start_ts: 1000, .. }));
    }

    #[tokio::test]
    async fn close_twice_is_not_found() {
        let (_, manager) = setup(&["alice"]).await;
        manager.open_event(&name("alice"), "home", 1000).await.unwrap();
        manager
            .close_event(&name("alice"), ok_close(1000, 1050))
            .await
            .unwrap();

        let err = manager
            .close_event(&name("alice"), ok_close(1000, 1060))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EventNotFound { .. }));
    }

    #[tokio::test]
    async fn close_after_interruption_is_not_found() {
        let (_, manager) = setup(&["bob"]).await;
        manager.open_event(&name("bob"), "home", 500).await.unwrap();
        manager.open_event(&name("bob"), "home", 900).await.unwrap();

        let err = manager
            .close_event(&name("bob"), ok_close(500, 600))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EventNotFound { start_ts: 500, .. }));
    }

    #[tokio::test]
    async fn negative_duration_is_rejected_without_writing() {
        let (storage, manager) = setup(&["alice"]).await;
        let id = manager.open_event(&name("alice"), "home", 1000).await.unwrap();
        let before = storage.get_event(id).await.unwrap().unwrap();

        let err = manager
            .close_event(&name("alice"), ok_close(1000, 999))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidDuration {
                start_ts: 1000,
                end_ts: 999
            }
        ));

        let after = storage.get_event(id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn close_with_syncing_status_is_rejected() {
        let (_, manager) = setup(&["alice"]).await;
        manager.open_event(&name("alice"), "home", 1000).await.unwrap();

        let mut req = ok_close(1000, 1050);
        req.status = EventStatus::Syncing;
        let err = manager.close_event(&name("alice"), req).await.unwrap_err();
        assert!(matches!(err, EngineError::Lifecycle(LifecycleError::NotAnOutcome)));
    }

    #[tokio::test]
    async fn close_for_unknown_client_fails() {
        let (_, manager) = setup(&[]).await;
        let err = manager
            .close_event(&name("ghost"), ok_close(1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownClient { .. }));
    }

    #[tokio::test]
    async fn recover_interrupted_is_idempotent() {
        let (_, manager) = setup(&["bob"]).await;
        manager.open_event(&name("bob"), "home", 500).await.unwrap();

        assert_eq!(manager.recover_interrupted(&name("bob")).await.unwrap(), 1);
        assert_eq!(manager.recover_interrupted(&name("bob")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recover_all_sweeps_removed_clients_too() {
        let (storage, manager) = setup(&["alice", "bob"]).await;
        manager.open_event(&name("alice"), "home", 1).await.unwrap();
        manager.open_event(&name("bob"), "home", 2).await.unwrap();
        storage.remove_client(&name("bob")).await.unwrap();

        assert_eq!(manager.recover_all().await.unwrap(), 2);
        assert!(open_events(&storage, "alice").await.is_empty());
        assert!(open_events(&storage, "bob").await.is_empty());
    }

    #[tokio::test]
    async fn closed_event_hides_open_events() {
        let (_, manager) = setup(&["alice"]).await;
        let id = manager.open_event(&name("alice"), "home", 1000).await.unwrap();
        assert!(manager.closed_event(id).await.unwrap().is_none());

        manager
            .close_event(&name("alice"), ok_close(1000, 1001))
            .await
            .unwrap();
        assert!(manager.closed_event(id).await.unwrap().is_some());
    }
}
