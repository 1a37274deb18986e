//! HTTP endpoints for unicloud.
//!
//! Health, metrics, client and share lookups, and the sync start/end
//! reports sent by client agents. Handlers are thin: they parse the request and call
//! into the engine.

pub mod health;
mod metrics;
mod shares;
mod sync;

use crate::error::EngineError;
use crate::server::Unicloud;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(engine: Arc<Unicloud>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/clients/status/:name", get(sync::client_status))
        .route("/clients/info/:name", get(sync::client_info))
        .route("/sync/start/:client", post(sync::sync_start))
        .route("/sync/end/:client", post(sync::sync_end))
        .route("/events", get(sync::list_events))
        .route("/events/:id", get(sync::get_event))
        .route("/shares/info/:name", get(shares::share_info))
        .route("/shares/info/:name/path", get(shares::share_path))
        .route("/shares/exist", post(shares::share_exists))
        .layer(Extension(engine))
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors a handler can return.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or form value.
    BadRequest(String),
    /// Client exists but has not been activated.
    NotActivated(String),
    /// Requested resource does not exist.
    NotFound(String),
    /// Engine failure.
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotActivated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(err) => match err {
                EngineError::UnknownClient { .. }
                | EngineError::EventNotFound { .. }
                | EngineError::UnknownShare { .. } => StatusCode::NOT_FOUND,
                EngineError::InvalidDuration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::ClientExists { .. }
                | EngineError::ShareExists { .. }
                | EngineError::Lifecycle(_) => StatusCode::CONFLICT,
                EngineError::Aggregation(_) => StatusCode::INTERNAL_SERVER_ERROR,
                EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::NotActivated(client) => format!("client not activated: {client}"),
            ApiError::Engine(err) => {
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                }
                err.to_string()
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
