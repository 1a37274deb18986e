//! Event lifecycle state machine.
//!
//! An event is opened in [`EventStatus::Syncing`] and leaves that state
//! exactly once, either because the client reported completion or because
//! recovery found it still open when a new cycle began. Closed events never
//! move again.
//!
//! ```text
//!              Complete(Ok)
//!            ┌─────────────► OK
//!  SYNCING ──┤ Complete(Ko)
//!            ├─────────────► KO
//!            │   Interrupt
//!            └─────────────► KO  (log = INTERRUPTED_LOG)
//! ```

use unicloud_sync_types::EventStatus;

/// Log text written on events swept by interrupted-event recovery.
pub const INTERRUPTED_LOG: &str = "Sync was interrupted";

/// Completion status reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sync succeeded.
    Ok,
    /// Sync failed.
    Ko,
}

impl From<Outcome> for EventStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Ok => EventStatus::Ok,
            Outcome::Ko => EventStatus::Ko,
        }
    }
}

impl TryFrom<EventStatus> for Outcome {
    type Error = LifecycleError;

    fn try_from(status: EventStatus) -> Result<Self, Self::Error> {
        match status {
            EventStatus::Ok => Ok(Outcome::Ok),
            EventStatus::Ko => Ok(Outcome::Ko),
            EventStatus::Syncing => Err(LifecycleError::NotAnOutcome),
        }
    }
}

/// Inputs to the event state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Client reported the end of the cycle.
    Complete(Outcome),
    /// Recovery found the event still open.
    Interrupt,
}

/// Illegal lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The event already left `SYNCING`.
    #[error("event already closed with status {status}")]
    AlreadyClosed {
        /// Status the event was closed with.
        status: EventStatus,
    },

    /// `SYNCING` was given where a completion status was expected.
    #[error("SYNCING is not a completion status")]
    NotAnOutcome,

    /// End time precedes start time.
    #[error("negative duration: end {end_ts} precedes start {start_ts}")]
    NegativeDuration {
        /// Reported start.
        start_ts: i64,
        /// Reported end.
        end_ts: i64,
    },
}

/// Apply a transition to an event status.
pub fn transition(from: EventStatus, input: Transition) -> Result<EventStatus, LifecycleError> {
    match (from, input) {
        (EventStatus::Syncing, Transition::Complete(outcome)) => Ok(outcome.into()),
        (EventStatus::Syncing, Transition::Interrupt) => Ok(EventStatus::Ko),
        (status, _) => Err(LifecycleError::AlreadyClosed { status }),
    }
}

/// Duration of a closed event in seconds.
///
/// A negative duration is a caller error and is never clamped.
pub fn duration_secs(start_ts: i64, end_ts: i64) -> Result<u64, LifecycleError> {
    end_ts
        .checked_sub(start_ts)
        .and_then(|d| u64::try_from(d).ok())
        .ok_or(LifecycleError::NegativeDuration { start_ts, end_ts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syncing_completes_to_reported_outcome() {
        assert_eq!(
            transition(EventStatus::Syncing, Transition::Complete(Outcome::Ok)),
            Ok(EventStatus::Ok)
        );
        assert_eq!(
            transition(EventStatus::Syncing, Transition::Complete(Outcome::Ko)),
            Ok(EventStatus::Ko)
        );
    }

    #[test]
    fn interrupt_forces_ko() {
        assert_eq!(
            transition(EventStatus::Syncing, Transition::Interrupt),
            Ok(EventStatus::Ko)
        );
    }

    #[test]
    fn closed_events_are_final() {
        for status in [EventStatus::Ok, EventStatus::Ko] {
            assert_eq!(
                transition(status, Transition::Complete(Outcome::Ok)),
                Err(LifecycleError::AlreadyClosed { status })
            );
            assert_eq!(
                transition(status, Transition::Interrupt),
                Err(LifecycleError::AlreadyClosed { status })
            );
        }
    }

    #[test]
    fn syncing_is_not_an_outcome() {
        assert_eq!(Outcome::try_from(EventStatus::Syncing), Err(LifecycleError::NotAnOutcome));
        assert_eq!(Outcome::try_from(EventStatus::Ko), Ok(Outcome::Ko));
    }

    #[test]
    fn duration_is_end_minus_start() {
        assert_eq!(duration_secs(1000, 1050), Ok(50));
        assert_eq!(duration_secs(1000, 1000), Ok(0));
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert_eq!(
            duration_secs(1000, 999),
            Err(LifecycleError::NegativeDuration {
                start_ts: 1000,
                end_ts: 999
            })
        );
    }

    #[test]
    fn overflowing_duration_is_rejected() {
        assert!(duration_secs(i64::MIN, i64::MAX).is_err());
    }
}
