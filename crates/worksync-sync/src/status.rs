//! In-memory status table keyed by (source, target)

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use worksync_core::domain::{SyncDirection, SyncKey, SyncStatus};

use crate::retry::RetryPolicy;
use crate::SyncError;

#[derive(Debug, Default)]
pub struct SyncStatusRegistry {
    statuses: DashMap<SyncKey, SyncStatus>,
}

impl SyncStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn get(&self, key: &SyncKey) -> Option<SyncStatus> {
        self.statuses.get(key).map(|s| s.value().clone())
    }

    /// All entries, sorted by key for stable output
    pub fn snapshot(&self) -> Vec<(SyncKey, SyncStatus)> {
        let mut all: Vec<_> = self
            .statuses
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.source.cmp(&b.0.source).then(a.0.target.cmp(&b.0.target)));
        all
    }

    /// Entries waiting for a (re)try
    pub fn pending(&self) -> Vec<(SyncKey, SyncStatus)> {
        self.snapshot()
            .into_iter()
            .filter(|(_, s)| s.is_pending())
            .collect()
    }

    /// Records that `key` owes a sync without attempting it.
    /// A pair already in progress is left alone.
    pub fn mark_pending(&self, key: &SyncKey, direction: SyncDirection) {
        let mut status = self
            .statuses
            .entry(key.clone())
            .or_insert_with(|| SyncStatus::new(direction));
        if status.is_in_progress() {
            return;
        }
        if let Err(e) = status.mark_pending(direction) {
            debug!(pair = %key, error = %e, "mark pending rejected");
        }
    }

    /// Moves `key` to `InProgress`. Fails if another attempt is running.
    pub fn begin(&self, key: &SyncKey, direction: SyncDirection) -> Result<(), SyncError> {
        let mut status = self
            .statuses
            .entry(key.clone())
            .or_insert_with(|| SyncStatus::new(direction));
        if status.is_in_progress() {
            return Err(SyncError::InProgress(key.to_string()));
        }
        status.mark_pending(direction)?;
        status.start_attempt(Utc::now())?;
        Ok(())
    }

    pub fn complete(&self, key: &SyncKey) -> Result<(), SyncError> {
        match self.statuses.get_mut(key) {
            Some(mut status) => Ok(status.record_success(Utc::now())?),
            None => Ok(()),
        }
    }

    pub fn fail(&self, key: &SyncKey, error: impl Into<String>) -> Result<(), SyncError> {
        match self.statuses.get_mut(key) {
            Some(mut status) => Ok(status.record_failure(error)?),
            None => Ok(()),
        }
    }

    /// Drops idle entries whose last activity is older than `max_age`, and
    /// pending entries that exhausted `policy` and were last tried before then.
    /// Returns how many were removed.
    pub fn cleanup_stale(&self, max_age: Duration, policy: &RetryPolicy) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let before = self.statuses.len();
        self.statuses.retain(|key, status| {
            if status.is_in_progress() {
                return true;
            }
            if status.is_pending() {
                let abandoned = policy.is_exhausted(status)
                    && status.last_attempt().is_some_and(|t| t <= cutoff);
                if abandoned {
                    warn!(
                        pair = %key,
                        retries = status.retry_count(),
                        last_error = status.last_error().unwrap_or_default(),
                        "dropping sync that exhausted its retries"
                    );
                }
                return !abandoned;
            }
            let last = status.last_success().or(status.last_attempt());
            last.is_some_and(|t| t > cutoff)
        });
        let removed = before.saturating_sub(self.statuses.len());
        if removed > 0 {
            debug!(removed, "stale sync statuses removed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use worksync_core::domain::SyncState;

    use super::*;

    fn key() -> SyncKey {
        SyncKey::new("/local/a.json", "/net/a.json")
    }

    #[test]
    fn test_begin_complete_cycle() {
        let reg = SyncStatusRegistry::new();
        reg.begin(&key(), SyncDirection::ToNetwork).unwrap();
        assert_eq!(reg.get(&key()).unwrap().state(), SyncState::InProgress);

        reg.complete(&key()).unwrap();
        let status = reg.get(&key()).unwrap();
        assert_eq!(status.state(), SyncState::Idle);
        assert!(status.last_success().is_some());
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let reg = SyncStatusRegistry::new();
        reg.begin(&key(), SyncDirection::ToNetwork).unwrap();
        let err = reg.begin(&key(), SyncDirection::ToNetwork).unwrap_err();
        assert!(matches!(err, SyncError::InProgress(_)));
    }

    #[test]
    fn test_failure_leaves_pair_pending() {
        let reg = SyncStatusRegistry::new();
        reg.begin(&key(), SyncDirection::ToLocal).unwrap();
        reg.fail(&key(), "disk gone").unwrap();

        let pending = reg.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.retry_count(), 1);
        assert_eq!(pending[0].1.last_error(), Some("disk gone"));
        assert_eq!(pending[0].1.direction(), SyncDirection::ToLocal);
    }

    #[test]
    fn test_mark_pending_skips_in_progress() {
        let reg = SyncStatusRegistry::new();
        reg.mark_pending(&key(), SyncDirection::Bidirectional);
        assert!(reg.get(&key()).unwrap().is_pending());

        reg.begin(&key(), SyncDirection::Bidirectional).unwrap();
        reg.mark_pending(&key(), SyncDirection::Bidirectional);
        assert!(reg.get(&key()).unwrap().is_in_progress());
    }

    #[test]
    fn test_cleanup_keeps_pending_and_recent() {
        let reg = SyncStatusRegistry::new();
        let done = SyncKey::new("/l/done", "/n/done");
        reg.begin(&done, SyncDirection::ToNetwork).unwrap();
        reg.complete(&done).unwrap();
        reg.mark_pending(&key(), SyncDirection::ToNetwork);

        assert_eq!(reg.cleanup_stale(Duration::from_secs(3600), &policy(5)), 0);
        assert_eq!(reg.len(), 2);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(reg.cleanup_stale(Duration::ZERO, &policy(5)), 1);
        assert!(reg.get(&done).is_none());
        assert!(reg.get(&key()).is_some());
    }

    #[test]
    fn test_cleanup_evicts_exhausted_pending() {
        let reg = SyncStatusRegistry::new();
        let retrying = SyncKey::new("/l/retrying", "/n/retrying");
        reg.begin(&retrying, SyncDirection::ToNetwork).unwrap();
        reg.fail(&retrying, "share gone").unwrap();
        for _ in 0..2 {
            reg.begin(&key(), SyncDirection::ToNetwork).unwrap();
            reg.fail(&key(), "share gone").unwrap();
        }

        // recently tried: kept even when exhausted
        assert_eq!(reg.cleanup_stale(Duration::from_secs(3600), &policy(2)), 0);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(reg.cleanup_stale(Duration::ZERO, &policy(2)), 1);
        assert!(reg.get(&key()).is_none());
        assert!(reg.get(&retrying).unwrap().is_pending());
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries,
        }
    }
}
