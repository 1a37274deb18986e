//! Client-facing endpoints: status lookups and sync start/end reports.

use super::ApiError;
use crate::clients::{ClientAccess, ClientInfo};
use crate::error::EngineError;
use crate::lifecycle::CloseRequest;
use crate::server::Unicloud;
use crate::storage::{Event, EventFilter, DEFAULT_EVENT_LIMIT};
use axum::extract::{Path, Query};
use axum::{Extension, Form, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_types::{ClientName, EventId, EventStatus, SyncClassification};

/// Response of the client status lookup.
#[derive(Debug, Serialize)]
pub struct ClientStatusResponse {
    /// Client name.
    pub client: ClientName,
    /// Always `OK`; other outcomes are error statuses.
    pub status: &'static str,
    /// Cached classification.
    pub sync_status: Option<SyncClassification>,
}

/// Form sent when a client starts a sync.
#[derive(Debug, Deserialize)]
pub struct StartForm {
    /// Share being synchronized.
    pub share: String,
    /// Start time, Unix seconds.
    pub start_ts: i64,
}

/// Form sent when a client finishes a sync.
#[derive(Debug, Deserialize)]
pub struct EndForm {
    /// Start time of the sync being closed.
    pub start_ts: i64,
    /// End time, Unix seconds.
    pub end_ts: i64,
    /// `OK` or `KO`.
    pub status: String,
    /// Client-reported sync status.
    pub sync_status: Option<String>,
    /// Transfer log.
    pub log: Option<String>,
}

/// Response to a sync report.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Resulting event status.
    pub status: EventStatus,
    /// Id of the opened event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    /// Recorded duration of the closed event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Query string of the event listing.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Only events of this client.
    pub client: Option<String>,
    /// Only events in this status.
    pub status: Option<String>,
    /// Only events with this reported sync status.
    pub sync_status: Option<String>,
    /// Page size (default 50).
    pub limit: Option<u32>,
}

fn parse_client(raw: &str) -> Result<ClientName, ApiError> {
    ClientName::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Reject clients that are unknown or not yet activated. Only status
/// lookups are gated this way.
async fn require_active(engine: &Unicloud, client: &ClientName) -> Result<(), ApiError> {
    match engine.clients().access(client).await? {
        ClientAccess::Active => Ok(()),
        ClientAccess::PendingActivation => Err(ApiError::NotActivated(client.to_string())),
        ClientAccess::Unknown => Err(ApiError::Engine(EngineError::UnknownClient {
            client: client.to_string(),
        })),
    }
}

/// `GET /clients/status/:name`
pub async fn client_status(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
) -> Result<Json<ClientStatusResponse>, ApiError> {
    let client = parse_client(&name)?;
    require_active(&engine, &client).await?;
    let sync_status = engine.clients().cached_status(&client).await?;

    Ok(Json(ClientStatusResponse {
        client,
        status: "OK",
        sync_status,
    }))
}

/// `GET /clients/info/:name`
pub async fn client_info(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
) -> Result<Json<ClientInfo>, ApiError> {
    let client = parse_client(&name)?;
    Ok(Json(engine.clients().info(&client).await?))
}

/// `POST /sync/start/:client`. Any registered client may report, activated
/// or not.
pub async fn sync_start(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
    Form(form): Form<StartForm>,
) -> Result<Json<SyncResponse>, ApiError> {
    let client = parse_client(&name)?;
    let id = engine
        .events()
        .open_event(&client, &form.share, form.start_ts)
        .await?;

    Ok(Json(SyncResponse {
        status: EventStatus::Syncing,
        event_id: Some(id.value()),
        duration: None,
    }))
}

/// `POST /sync/end/:client`
pub async fn sync_end(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(name): Path<String>,
    Form(form): Form<EndForm>,
) -> Result<Json<SyncResponse>, ApiError> {
    let client = parse_client(&name)?;
    let status: EventStatus = form
        .status
        .parse()
        .map_err(|e: sync_types::SyncError| ApiError::BadRequest(e.to_string()))?;

    let duration = engine
        .events()
        .close_event(
            &client,
            CloseRequest {
                start_ts: form.start_ts,
                end_ts: form.end_ts,
                status,
                sync_status: form.sync_status,
                log: form.log,
            },
        )
        .await?;

    Ok(Json(SyncResponse {
        status,
        event_id: None,
        duration: Some(duration),
    }))
}

/// `GET /events`
pub async fn list_events(
    Extension(engine): Extension<Arc<Unicloud>>,
    Query(query): Query<EventQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let filter = EventFilter {
        client: query.client.as_deref().map(parse_client).transpose()?,
        status: query
            .status
            .as_deref()
            .map(str::parse::<EventStatus>)
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        sync_status: query.sync_status,
        limit: query.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
    };
    Ok(Json(engine.events().list_events(&filter).await?))
}

/// `GET /events/:id`. Open events are not shown.
pub async fn get_event(
    Extension(engine): Extension<Arc<Unicloud>>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    engine
        .events()
        .closed_event(EventId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no closed event {id}")))
}
