//! Error types for unicloud data model types.

use thiserror::Error;

/// Errors raised while parsing or validating data model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Unknown event status label
    #[error("invalid event status: {0}")]
    InvalidEventStatus(String),

    /// Unknown client lifecycle status label
    #[error("invalid client status: {0}")]
    InvalidClientStatus(String),

    /// Unknown sync classification label
    #[error("invalid sync classification: {0}")]
    InvalidClassification(String),

    /// Name is empty or contains whitespace/control characters
    #[error("invalid name: {0:?}")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::InvalidEventStatus("DONE".into());
        assert_eq!(err.to_string(), "invalid event status: DONE");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
