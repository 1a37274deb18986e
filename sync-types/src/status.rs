//! Status labels persisted alongside clients and events.
//!
//! Each label has a fixed string form that is stored in the database and
//! returned to clients, so `as_str` and `FromStr` must stay in sync.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a synchronization event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Started, completion not yet reported.
    #[serde(rename = "SYNCING")]
    Syncing,
    /// Completed successfully.
    #[serde(rename = "OK")]
    Ok,
    /// Failed, or interrupted before completion was reported.
    #[serde(rename = "KO")]
    Ko,
}

impl EventStatus {
    /// Persisted label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syncing => "SYNCING",
            Self::Ok => "OK",
            Self::Ko => "KO",
        }
    }

    /// Whether the event has been closed (duration is meaningful).
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Syncing)
    }
}

impl FromStr for EventStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYNCING" => Ok(Self::Syncing),
            "OK" => Ok(Self::Ok),
            "KO" => Ok(Self::Ko),
            other => Err(SyncError::InvalidEventStatus(other.to_string())),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientStatus {
    /// Joined by itself, waiting for an operator to activate it.
    Registered,
    /// Allowed to synchronize.
    Active,
}

impl ClientStatus {
    /// Persisted label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "Registered",
            Self::Active => "Active",
        }
    }
}

impl FromStr for ClientStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Registered" => Ok(Self::Registered),
            "Active" => Ok(Self::Active),
            other => Err(SyncError::InvalidClientStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived freshness of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncClassification {
    /// No successful event has ever been recorded.
    #[serde(rename = "Never synced")]
    Never,
    /// Last successful event ended within the threshold.
    #[serde(rename = "In Sync")]
    InSync,
    /// Last successful event ended longer ago than the threshold.
    #[serde(rename = "Out of Sync")]
    OutOfSync,
}

impl SyncClassification {
    /// Persisted label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "Never synced",
            Self::InSync => "In Sync",
            Self::OutOfSync => "Out of Sync",
        }
    }
}

impl FromStr for SyncClassification {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Never synced" => Ok(Self::Never),
            "In Sync" => Ok(Self::InSync),
            "Out of Sync" => Ok(Self::OutOfSync),
            other => Err(SyncError::InvalidClassification(other.to_string())),
        }
    }
}

impl fmt::Display for SyncClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_status_labels_parse_back() {
        for status in [EventStatus::Syncing, EventStatus::Ok, EventStatus::Ko] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<EventStatus>().is_err());
    }

    #[test]
    fn only_syncing_is_open() {
        assert!(!EventStatus::Syncing.is_closed());
        assert!(EventStatus::Ok.is_closed());
        assert!(EventStatus::Ko.is_closed());
    }

    #[test]
    fn client_status_rejects_unknown() {
        assert_eq!("Active".parse::<ClientStatus>().unwrap(), ClientStatus::Active);
        assert_eq!(
            "Pending".parse::<ClientStatus>(),
            Err(SyncError::InvalidClientStatus("Pending".into()))
        );
    }

    #[test]
    fn classification_serializes_as_label() {
        let json = serde_json::to_string(&SyncClassification::OutOfSync).unwrap();
        assert_eq!(json, "\"Out of Sync\"");
        let back: SyncClassification = serde_json::from_str("\"Never synced\"").unwrap();
        assert_eq!(back, SyncClassification::Never);
    }
}
