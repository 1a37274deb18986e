//! Event log retention.

use unicloud_sync_types::EventId;

/// First event id whose log text must be kept.
///
/// Events with an id strictly below the returned cutoff lose their log
/// text. Returns `None` while the highest id has not exceeded `keep`, in
/// which case nothing is pruned.
pub fn log_retention_cutoff(max_id: Option<EventId>, keep: u64) -> Option<EventId> {
    let max = max_id?.value();
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    (max > keep).then(|| EventId::new(max - keep))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_prunes_nothing() {
        assert_eq!(log_retention_cutoff(None, 5000), None);
    }

    #[test]
    fn below_retention_count_prunes_nothing() {
        assert_eq!(log_retention_cutoff(Some(EventId::new(5000)), 5000), None);
        assert_eq!(log_retention_cutoff(Some(EventId::new(12)), 5000), None);
    }

    #[test]
    fn cutoff_keeps_last_n_ids() {
        assert_eq!(
            log_retention_cutoff(Some(EventId::new(10_000)), 5000),
            Some(EventId::new(5000))
        );
        assert_eq!(
            log_retention_cutoff(Some(EventId::new(5001)), 5000),
            Some(EventId::new(1))
        );
    }
}
