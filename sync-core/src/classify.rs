//! Freshness classification.

use unicloud_sync_types::{SyncClassification, Threshold};

/// Classify a client from the end time of its most recent OK event.
///
/// `last_ok_end` must come from the OK event with the highest id, not the
/// latest end timestamp. The boundary is inclusive: a client whose last
/// success ended exactly `threshold` seconds ago is still in sync.
///
/// A client with no OK event is [`SyncClassification::Never`] whatever the
/// threshold. Callers are expected to skip clients whose threshold is
/// disabled; for them the result carries no meaning.
pub fn classify(last_ok_end: Option<i64>, threshold: Threshold, now: i64) -> SyncClassification {
    let Some(end) = last_ok_end else {
        return SyncClassification::Never;
    };

    let elapsed = now.saturating_sub(end);
    let limit = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);

    if elapsed <= limit {
        SyncClassification::InSync
    } else {
        SyncClassification::OutOfSync
    }
}
