//! SQLite storage backend for sync-server.

use super::{
    Client, ClientStats, Event, EventClose, EventFilter, NewClient, NewEvent, RowResult, Share,
    SyncStore,
};
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use sync_types::{
    ClientName, ClientStatus, EventId, EventStatus, ShareName, SyncClassification, Threshold,
};

/// SQLite-based sync storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection that is never recycled: the database lives
        // and dies with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                ssh_key TEXT NOT NULL,
                status TEXT NOT NULL,
                share TEXT NOT NULL,
                threshold INTEGER NOT NULL DEFAULT 0,
                sync_status TEXT,
                joindate INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client TEXT NOT NULL,
                share TEXT NOT NULL,
                log TEXT,
                start_ts INTEGER NOT NULL,
                end_ts INTEGER,
                duration INTEGER,
                sync_status TEXT,
                status TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS shares (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                path TEXT NOT NULL UNIQUE,
                size INTEGER
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_events_client_status ON events(client, status)",
            "CREATE INDEX IF NOT EXISTS idx_events_client_id ON events(client, id)",
            "CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_ts)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }

        Ok(())
    }
}

const CLIENT_COLUMNS: &str = "name, ssh_key, status, share, threshold, sync_status, joindate";
const EVENT_COLUMNS: &str =
    "id, client, share, log, start_ts, end_ts, duration, sync_status, status";

#[async_trait]
impl SyncStore for SqliteStorage {
    async fn get_client(&self, name: &ClientName) -> Result<Option<Client>, StorageError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE name = ?1"
        ))
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Client::try_from).transpose()
    }

    async fn insert_client(&self, client: NewClient) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO clients (name, ssh_key, status, share, threshold, joindate)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(client.name.as_str())
        .bind(&client.ssh_key)
        .bind(client.status.as_str())
        .bind(&client.share)
        .bind(client.joindate)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn activate_client(&self, name: &ClientName) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE clients SET status = ?1 WHERE name = ?2")
            .bind(ClientStatus::Active.as_str())
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_client(&self, name: &ClientName) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM clients WHERE name = ?1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_threshold(
        &self,
        name: &ClientName,
        threshold: Threshold,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE clients SET threshold = ?1 WHERE name = ?2")
            .bind(to_i64(threshold.as_secs())?)
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_cached_status(
        &self,
        name: &ClientName,
        status: SyncClassification,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE clients SET sync_status = ?1 WHERE name = ?2")
            .bind(status.as_str())
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_clients(&self) -> Result<Vec<RowResult<Client>>, StorageError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(Client::try_from).collect())
    }

    async fn list_clients_with_threshold(&self) -> Result<Vec<RowResult<Client>>, StorageError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE threshold > 0 ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(Client::try_from).collect())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<EventId, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (client, share, start_ts, status)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(event.client.as_str())
        .bind(&event.share)
        .bind(event.start_ts)
        .bind(EventStatus::Syncing.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(EventId::new(id))
    }

    async fn find_open_event(
        &self,
        client: &ClientName,
        start_ts: i64,
    ) -> Result<Option<Event>, StorageError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE client = ?1 AND start_ts = ?2 AND status = ?3
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(client.as_str())
        .bind(start_ts)
        .bind(EventStatus::Syncing.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Event::try_from).transpose()
    }

    async fn close_event(&self, id: EventId, close: EventClose) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = ?1, sync_status = ?2, end_ts = ?3, duration = ?4, log = ?5
            WHERE id = ?6 AND status = ?7
            "#,
        )
        .bind(close.status.as_str())
        .bind(close.sync_status.as_deref())
        .bind(close.end_ts)
        .bind(to_i64(close.duration)?)
        .bind(close.log.as_deref())
        .bind(id.value())
        .bind(EventStatus::Syncing.as_str())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn close_open_events(
        &self,
        client: &ClientName,
        status: EventStatus,
        log: &str,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE events SET status = ?1, log = ?2
            WHERE client = ?3 AND status = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(log)
        .bind(client.as_str())
        .bind(EventStatus::Syncing.as_str())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn clients_with_open_events(&self) -> Result<Vec<ClientName>, StorageError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT client FROM events WHERE status = ?1 ORDER BY client ASC",
        )
        .bind(EventStatus::Syncing.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        names
            .into_iter()
            .map(|name| ClientName::new(name).map_err(|e| corrupt("events", e)))
            .collect()
    }

    async fn latest_ok_event(&self, client: &ClientName) -> Result<Option<Event>, StorageError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE client = ?1 AND status = ?2
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(client.as_str())
        .bind(EventStatus::Ok.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Event::try_from).transpose()
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StorageError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Event::try_from).transpose()
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE (?1 IS NULL OR client = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR sync_status = ?3)
            ORDER BY start_ts DESC, id DESC
            LIMIT ?4
            "#
        ))
        .bind(filter.client.as_ref().map(|c| c.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.sync_status.as_deref())
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn client_stats(&self, client: &ClientName) -> Result<ClientStats, StorageError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0) AS ok,
                COALESCE(SUM(CASE WHEN status = ?3 THEN 1 ELSE 0 END), 0) AS ko,
                AVG(duration) AS avg_duration
            FROM events
            WHERE client = ?1
            "#,
        )
        .bind(client.as_str())
        .bind(EventStatus::Ok.as_str())
        .bind(EventStatus::Ko.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        let last_seen: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT end_ts FROM events WHERE client = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(client.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(ClientStats {
            ok: row.ok.max(0) as u64,
            ko: row.ko.max(0) as u64,
            last_seen: last_seen.flatten(),
            avg_duration: row.avg_duration,
        })
    }

    async fn max_event_id(&self) -> Result<Option<EventId>, StorageError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(id.map(EventId::new))
    }

    async fn prune_logs_before(&self, cutoff: EventId) -> Result<u64, StorageError> {
        let result = sqlx::query("UPDATE events SET log = NULL WHERE id < ?1 AND log IS NOT NULL")
            .bind(cutoff.value())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn compact(&self) -> Result<(), StorageError> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn insert_share(&self, share: Share) -> Result<bool, StorageError> {
        let path = share.path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: share.path.clone(),
        })?;
        let size = share.size.map(to_i64).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO shares (name, description, path, size)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(share.name.as_str())
        .bind(&share.description)
        .bind(path)
        .bind(size)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_share(&self, name: &ShareName) -> Result<Option<Share>, StorageError> {
        let row = sqlx::query_as::<_, ShareRow>(
            "SELECT name, description, path, size FROM shares WHERE name = ?1",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Share::try_from).transpose()
    }

    async fn share_by_path(&self, path: &Path) -> Result<Option<Share>, StorageError> {
        let path = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let row = sqlx::query_as::<_, ShareRow>(
            "SELECT name, description, path, size FROM shares WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Share::try_from).transpose()
    }

    async fn remove_share(&self, name: &ShareName) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM shares WHERE name = ?1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_shares(&self) -> Result<Vec<Share>, StorageError> {
        let rows = sqlx::query_as::<_, ShareRow>(
            "SELECT name, description, path, size FROM shares ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(Share::try_from).collect()
    }

    async fn update_share_size(&self, name: &ShareName, size: u64) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE shares SET size = ?1 WHERE name = ?2")
            .bind(to_i64(size)?)
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

fn to_i64(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::CorruptRow {
        table: "input",
        reason: format!("{value} does not fit in an INTEGER column"),
    })
}

fn corrupt(table: &'static str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::CorruptRow {
        table,
        reason: reason.to_string(),
    }
}

/// Internal row type for client queries.
#[derive(sqlx::FromRow)]
struct ClientRow {
    name: String,
    ssh_key: String,
    status: String,
    share: String,
    threshold: i64,
    sync_status: Option<String>,
    joindate: i64,
}

impl TryFrom<ClientRow> for Client {
    type Error = StorageError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let threshold = u64::try_from(row.threshold)
            .map_err(|_| corrupt("clients", format!("negative threshold {}", row.threshold)))?;

        Ok(Client {
            name: ClientName::new(row.name).map_err(|e| corrupt("clients", e))?,
            ssh_key: row.ssh_key,
            status: row.status.parse().map_err(|e| corrupt("clients", e))?,
            share: row.share,
            threshold: Threshold::from_secs(threshold),
            sync_status: row
                .sync_status
                .map(|s| s.parse::<SyncClassification>())
                .transpose()
                .map_err(|e| corrupt("clients", e))?,
            joindate: row.joindate,
        })
    }
}

/// Internal row type for event queries.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    client: String,
    share: String,
    log: Option<String>,
    start_ts: i64,
    end_ts: Option<i64>,
    duration: Option<i64>,
    sync_status: Option<String>,
    status: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: EventId::new(row.id),
            client: ClientName::new(row.client).map_err(|e| corrupt("events", e))?,
            share: row.share,
            log: row.log,
            start_ts: row.start_ts,
            end_ts: row.end_ts,
            duration: row.duration.and_then(|d| u64::try_from(d).ok()),
            sync_status: row.sync_status,
            status: row.status.parse().map_err(|e| corrupt("events", e))?,
        })
    }
}

/// Internal row type for share queries.
#[derive(sqlx::FromRow)]
struct ShareRow {
    name: String,
    description: String,
    path: String,
    size: Option<i64>,
}

impl TryFrom<ShareRow> for Share {
    type Error = StorageError;

    fn try_from(row: ShareRow) -> Result<Self, Self::Error> {
        Ok(Share {
            name: ShareName::new(row.name).map_err(|e| corrupt("shares", e))?,
            description: row.description,
            path: PathBuf::from(row.path),
            size: row.size.and_then(|s| u64::try_from(s).ok()),
        })
    }
}

/// Internal row type for per-client aggregates.
#[derive(sqlx::FromRow)]
struct StatsRow {
    ok: i64,
    ko: i64,
    avg_duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ClientName {
        ClientName::new(s).unwrap()
    }

    fn new_client(client: &str, status: ClientStatus) -> NewClient {
        NewClient {
            name: name(client),
            ssh_key: format!("ssh-ed25519 AAAA {client}"),
            status,
            share: "home".to_string(),
            joindate: 1_700_000_000,
        }
    }

    fn new_event(client: &str, start_ts: i64) -> NewEvent {
        NewEvent {
            client: name(client),
            share: "home".to_string(),
            start_ts,
        }
    }

    fn close(status: EventStatus, end_ts: i64, duration: u64) -> EventClose {
        EventClose {
            status,
            sync_status: Some("done".to_string()),
            end_ts,
            duration,
            log: Some("transfer log".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_client_rejects_duplicate_name() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        assert!(storage
            .insert_client(new_client("alice", ClientStatus::Registered))
            .await
            .unwrap());
        assert!(!storage
            .insert_client(new_client("alice", ClientStatus::Active))
            .await
            .unwrap());

        let alice = storage.get_client(&name("alice")).await.unwrap().unwrap();
        assert_eq!(alice.status, ClientStatus::Registered);
        assert_eq!(alice.threshold, Threshold::DISABLED);
        assert_eq!(alice.sync_status, None);
    }

    #[tokio::test]
    async fn activate_and_remove_client() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .insert_client(new_client("bob", ClientStatus::Registered))
            .await
            .unwrap();

        assert!(storage.activate_client(&name("bob")).await.unwrap());
        let bob = storage.get_client(&name("bob")).await.unwrap().unwrap();
        assert_eq!(bob.status, ClientStatus::Active);

        assert!(storage.remove_client(&name("bob")).await.unwrap());
        assert!(storage.get_client(&name("bob")).await.unwrap().is_none());
        assert!(!storage.activate_client(&name("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn list_clients_with_threshold_skips_zero() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for client in ["a", "b", "c"] {
            storage
                .insert_client(new_client(client, ClientStatus::Active))
                .await
                .unwrap();
        }
        storage
            .set_threshold(&name("b"), Threshold::from_secs(60))
            .await
            .unwrap();

        let all = storage.list_clients().await.unwrap();
        assert_eq!(all.len(), 3);

        let tracked = storage.list_clients_with_threshold().await.unwrap();
        assert_eq!(tracked.len(), 1);
        let b = tracked[0].as_ref().unwrap();
        assert_eq!(b.name, name("b"));
        assert_eq!(b.threshold.as_secs(), 60);
    }

    #[tokio::test]
    async fn unreadable_client_row_does_not_hide_the_others() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .insert_client(new_client("alice", ClientStatus::Active))
            .await
            .unwrap();
        storage
            .set_threshold(&name("alice"), Threshold::from_secs(120))
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO clients (name, ssh_key, status, share, threshold, joindate)
             VALUES ('old laptop', 'k', 'Active', 'home', 60, 0)",
        )
        .execute(storage.pool())
        .await
        .unwrap();

        let tracked = storage.list_clients_with_threshold().await.unwrap();
        assert_eq!(tracked.len(), 2);
        assert_eq!(tracked[0].as_ref().unwrap().name, name("alice"));
        assert!(matches!(
            tracked[1],
            Err(StorageError::CorruptRow { table: "clients", .. })
        ));
        assert_eq!(storage.list_clients().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn event_ids_are_monotonic() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        let e1 = storage.insert_event(new_event("alice", 100)).await.unwrap();
        let e2 = storage.insert_event(new_event("bob", 50)).await.unwrap();
        let e3 = storage.insert_event(new_event("alice", 10)).await.unwrap();

        assert!(e1 < e2 && e2 < e3);
        assert_eq!(storage.max_event_id().await.unwrap(), Some(e3));
    }

    #[tokio::test]
    async fn close_event_applies_once() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let id = storage.insert_event(new_event("alice", 1000)).await.unwrap();

        let open = storage
            .find_open_event(&name("alice"), 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.id, id);
        assert_eq!(open.status, EventStatus::Syncing);
        assert_eq!(open.end_ts, None);

        assert!(storage
            .close_event(id, close(EventStatus::Ok, 1050, 50))
            .await
            .unwrap());
        assert!(!storage
            .close_event(id, close(EventStatus::Ko, 1060, 60))
            .await
            .unwrap());

        let closed = storage.get_event(id).await.unwrap().unwrap();
        assert_eq!(closed.status, EventStatus::Ok);
        assert_eq!(closed.end_ts, Some(1050));
        assert_eq!(closed.duration, Some(50));
        assert_eq!(closed.log.as_deref(), Some("transfer log"));
        assert!(storage
            .find_open_event(&name("alice"), 1000)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn close_open_events_only_touches_syncing_rows_of_client() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let done = storage.insert_event(new_event("bob", 100)).await.unwrap();
        storage
            .close_event(done, close(EventStatus::Ok, 110, 10))
            .await
            .unwrap();
        let orphan = storage.insert_event(new_event("bob", 500)).await.unwrap();
        let other = storage.insert_event(new_event("carol", 500)).await.unwrap();

        let changed = storage
            .close_open_events(&name("bob"), EventStatus::Ko, "interrupted")
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let orphan = storage.get_event(orphan).await.unwrap().unwrap();
        assert_eq!(orphan.status, EventStatus::Ko);
        assert_eq!(orphan.log.as_deref(), Some("interrupted"));

        let done = storage.get_event(done).await.unwrap().unwrap();
        assert_eq!(done.status, EventStatus::Ok);

        let other = storage.get_event(other).await.unwrap().unwrap();
        assert_eq!(other.status, EventStatus::Syncing);

        assert_eq!(
            storage.clients_with_open_events().await.unwrap(),
            vec![name("carol")]
        );
    }

    #[tokio::test]
    async fn latest_ok_event_orders_by_id_not_time() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        let first = storage.insert_event(new_event("alice", 5000)).await.unwrap();
        storage
            .close_event(first, close(EventStatus::Ok, 6000, 1000))
            .await
            .unwrap();

        // inserted later, but reports an earlier clock
        let second = storage.insert_event(new_event("alice", 100)).await.unwrap();
        storage
            .close_event(second, close(EventStatus::Ok, 200, 100))
            .await
            .unwrap();

        let failed = storage.insert_event(new_event("alice", 7000)).await.unwrap();
        storage
            .close_event(failed, close(EventStatus::Ko, 7100, 100))
            .await
            .unwrap();

        let latest = storage
            .latest_ok_event(&name("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.end_ts, Some(200));

        assert!(storage
            .latest_ok_event(&name("nobody"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_events_filters_and_limits() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for start in 0..5 {
            let id = storage.insert_event(new_event("alice", start)).await.unwrap();
            let status = if start % 2 == 0 {
                EventStatus::Ok
            } else {
                EventStatus::Ko
            };
            storage
                .close_event(id, close(status, start + 1, 1))
                .await
                .unwrap();
        }
        storage.insert_event(new_event("bob", 99)).await.unwrap();

        let all = storage.list_events(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].start_ts, 99);

        let alice_ok = storage
            .list_events(&EventFilter {
                client: Some(name("alice")),
                status: Some(EventStatus::Ok),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(alice_ok.len(), 3);
        assert!(alice_ok.iter().all(|e| e.status == EventStatus::Ok));

        let limited = storage
            .list_events(&EventFilter {
                limit: 2,
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let by_reported = storage
            .list_events(&EventFilter {
                sync_status: Some("done".to_string()),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_reported.len(), 5);
    }

    #[tokio::test]
    async fn client_stats_counts_and_averages() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        let empty = storage.client_stats(&name("alice")).await.unwrap();
        assert_eq!(empty, ClientStats::default());

        let a = storage.insert_event(new_event("alice", 0)).await.unwrap();
        storage
            .close_event(a, close(EventStatus::Ok, 10, 10))
            .await
            .unwrap();
        let b = storage.insert_event(new_event("alice", 100)).await.unwrap();
        storage
            .close_event(b, close(EventStatus::Ko, 125, 25))
            .await
            .unwrap();
        storage.insert_event(new_event("alice", 200)).await.unwrap();

        let stats = storage.client_stats(&name("alice")).await.unwrap();
        assert_eq!(stats.ok, 1);
        assert_eq!(stats.ko, 1);
        assert_eq!(stats.avg_duration, Some(17.5));
        // highest-id event is still open
        assert_eq!(stats.last_seen, None);
    }

    #[tokio::test]
    async fn prune_logs_clears_only_old_rows() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for start in 0..4 {
            let id = storage.insert_event(new_event("alice", start)).await.unwrap();
            storage
                .close_event(id, close(EventStatus::Ok, start + 5, 5))
                .await
                .unwrap();
            ids.push(id);
        }

        let pruned = storage.prune_logs_before(ids[2]).await.unwrap();
        assert_eq!(pruned, 2);

        for (i, id) in ids.iter().enumerate() {
            let event = storage.get_event(*id).await.unwrap().unwrap();
            assert_eq!(event.status, EventStatus::Ok);
            assert_eq!(event.duration, Some(5));
            if i < 2 {
                assert_eq!(event.log, None);
            } else {
                assert_eq!(event.log.as_deref(), Some("transfer log"));
            }
        }

        // already pruned rows are not counted again
        assert_eq!(storage.prune_logs_before(ids[2]).await.unwrap(), 0);
        storage.compact().await.unwrap();
    }

    #[tokio::test]
    async fn shares_round_trip_size() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let photos = ShareName::new("photos").unwrap();

        assert!(storage
            .insert_share(Share {
                name: photos.clone(),
                description: "family photos".to_string(),
                path: PathBuf::from("/shares/photos"),
                size: None,
            })
            .await
            .unwrap());
        // same path under another name
        assert!(!storage
            .insert_share(Share {
                name: ShareName::new("dup").unwrap(),
                description: String::new(),
                path: PathBuf::from("/shares/photos"),
                size: None,
            })
            .await
            .unwrap());

        assert!(storage.update_share_size(&photos, 4096).await.unwrap());
        let share = storage.get_share(&photos).await.unwrap().unwrap();
        assert_eq!(share.size, Some(4096));
        assert_eq!(storage.list_shares().await.unwrap().len(), 1);

        let by_path = storage
            .share_by_path(Path::new("/shares/photos"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_path.name, photos);
        assert!(storage
            .share_by_path(Path::new("/shares/other"))
            .await
            .unwrap()
            .is_none());

        assert!(storage.remove_share(&photos).await.unwrap());
        assert!(!storage.remove_share(&photos).await.unwrap());
        assert!(storage.get_share(&photos).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn on_disk_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unicloud.db");

        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            storage
                .insert_client(new_client("alice", ClientStatus::Active))
                .await
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).await.unwrap();
        assert!(storage.get_client(&name("alice")).await.unwrap().is_some());
    }
}
