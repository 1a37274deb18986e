//! Health check endpoint.

use crate::server::Unicloud;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status: `ok`, or `degraded` when the store is unreachable.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of registered clients.
    pub clients: usize,
    /// Number of configured shares.
    pub shares: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(engine): Extension<Arc<Unicloud>>) -> Json<HealthStatus> {
    let clients = engine.clients().list().await;
    let shares = engine.shares().list().await;

    let status = if clients.is_ok() && shares.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        clients: clients.map(|c| c.len()).unwrap_or(0),
        shares: shares.map(|s| s.len()).unwrap_or(0),
        uptime_seconds: engine.uptime_secs(),
    })
}
