//! Retry eligibility for pending pairs
//!
//! A pending pair is retried once `now >= last_attempt + backoff`, where
//! `backoff = base * 2^retry_count`, capped at `max_delay`. Pairs that reached
//! `max_retries` stay pending but are no longer attempted, until the stale
//! cleanup evicts them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use worksync_core::config::SyncConfig;
use worksync_core::domain::SyncStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
            max_retries: config.max_retries,
        }
    }

    /// Wait before the next attempt after `retry_count` failures
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, status: &SyncStatus) -> bool {
        status.retry_count() >= self.max_retries
    }

    /// Whether the backoff for `status` has elapsed at `now`.
    /// A pair never attempted is always due.
    pub fn is_due(&self, status: &SyncStatus, now: DateTime<Utc>) -> bool {
        let Some(last) = status.last_attempt() else {
            return true;
        };
        let Ok(wait) = chrono::Duration::from_std(self.backoff(status.retry_count())) else {
            return false;
        };
        last.checked_add_signed(wait).is_some_and(|due| now >= due)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Summary of one retry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Still inside their backoff window
    pub waiting: usize,
    /// Reached the retry limit
    pub exhausted: usize,
    /// Skipped because the network share was unreachable
    pub offline: usize,
}

impl RetryReport {
    pub fn merge(&mut self, other: RetryReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.waiting += other.waiting;
        self.exhausted += other.exhausted;
        self.offline += other.offline;
    }

    pub fn is_empty(&self) -> bool {
        *self == RetryReport::default()
    }
}
