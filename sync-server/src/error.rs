//! Error types for sync-server.

use std::path::PathBuf;
use sync_core::LifecycleError;

/// Main error type for sync-server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
///
/// Any of these reaching a background job aborts that job's current run;
/// the next tick retries from scratch.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// A stored row could not be mapped back to a model type.
    #[error("corrupt {table} row: {reason}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors surfaced by the lifecycle manager, evaluator and client registry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation referenced a client absent from the registry.
    #[error("unknown client: {client}")]
    UnknownClient {
        /// Client name as given by the caller.
        client: String,
    },

    /// Registration of a name that is already taken.
    #[error("client already exists: {client}")]
    ClientExists {
        /// The duplicate name.
        client: String,
    },

    /// Close reported for an event that does not exist or is already closed.
    #[error("no open event for client {client} started at {start_ts}")]
    EventNotFound {
        /// Client that reported the close.
        client: String,
        /// Start time the close referred to.
        start_ts: i64,
    },

    /// Close reported with an end time before its start time.
    #[error("invalid duration: end {end_ts} precedes start {start_ts}")]
    InvalidDuration {
        /// Reported start.
        start_ts: i64,
        /// Reported end.
        end_ts: i64,
    },

    /// Any other illegal lifecycle operation.
    #[error("lifecycle error: {0}")]
    Lifecycle(LifecycleError),

    /// Operation referenced a share that is not configured.
    #[error("unknown share: {share}")]
    UnknownShare {
        /// Share name as given by the caller.
        share: String,
    },

    /// Share registration with a name or path that is already taken.
    #[error("share already exists: {share}")]
    ShareExists {
        /// The duplicate share.
        share: String,
    },

    /// Size computation failed for a share.
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    /// Backing store unavailable.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<LifecycleError> for EngineError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NegativeDuration { start_ts, end_ts } => {
                EngineError::InvalidDuration { start_ts, end_ts }
            }
            other => EngineError::Lifecycle(other),
        }
    }
}

/// Share size computation errors.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// Share path does not exist on disk.
    #[error("share path not found: {path}")]
    PathNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// Directory traversal failed.
    #[error("failed to walk {path}: {source}")]
    Walk {
        /// Root of the traversal.
        path: PathBuf,
        /// Underlying walk error.
        source: walkdir::Error,
    },

    /// The blocking traversal task did not complete.
    #[error("size task failed: {0}")]
    Task(String),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_duration_maps_to_invalid_duration() {
        let err: EngineError = LifecycleError::NegativeDuration {
            start_ts: 10,
            end_ts: 5,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::InvalidDuration {
                start_ts: 10,
                end_ts: 5
            }
        ));
    }

    #[test]
    fn other_lifecycle_errors_are_wrapped() {
        let err: EngineError = LifecycleError::NotAnOutcome.into();
        assert!(matches!(err, EngineError::Lifecycle(LifecycleError::NotAnOutcome)));
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::EventNotFound {
            client: "bob".into(),
            start_ts: 900,
        };
        assert_eq!(err.to_string(), "no open event for client bob started at 900");
    }
}
