//! Replication status of a (source, target) file pair
//!
//! ## State Machine
//!
//! ```text
//!   (none) ──► Idle ──mark_pending──► Pending ──start_attempt──► InProgress
//!                ▲                       ▲                           │
//!                │                       └──── record_failure ───────┤
//!                └──────────────────────────── record_success ───────┘
//! ```
//!
//! Status values live only in memory. After a restart they are rebuilt from
//! file timestamps on the next bidirectional sync.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Direction in which a pair is replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local installation → network share
    ToNetwork,
    /// Network share → local installation
    ToLocal,
    /// Newest side wins
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncDirection::ToNetwork => "to_network",
            SyncDirection::ToLocal => "to_local",
            SyncDirection::Bidirectional => "bidirectional",
        };
        f.write_str(s)
    }
}

/// Identity of a replicated pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl SyncKey {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.target.display())
    }
}

/// Lifecycle state of a pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing outstanding
    #[default]
    Idle,
    /// A sync is owed, either first attempt or retry
    Pending,
    /// A copy is running right now
    InProgress,
}

impl SyncState {
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Pending => "pending",
            SyncState::InProgress => "in_progress",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Replication bookkeeping for one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    direction: SyncDirection,
    state: SyncState,
    retry_count: u32,
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl SyncStatus {
    #[must_use]
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            state: SyncState::Idle,
            retry_count: 0,
            last_attempt: None,
            last_success: None,
            last_error: None,
        }
    }

    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.state == SyncState::Pending
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == SyncState::InProgress
    }

    pub fn can_transition_to(&self, target: SyncState) -> bool {
        matches!(
            (self.state, target),
            (SyncState::Idle, SyncState::Pending)
                | (SyncState::Pending, SyncState::Pending)
                | (SyncState::Pending, SyncState::InProgress)
                | (SyncState::InProgress, SyncState::Idle)
                | (SyncState::InProgress, SyncState::Pending)
        )
    }

    fn transition_to(&mut self, target: SyncState) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    /// Marks the pair as owing a sync. Idempotent while already pending.
    pub fn mark_pending(&mut self, direction: SyncDirection) -> Result<(), DomainError> {
        self.transition_to(SyncState::Pending)?;
        self.direction = direction;
        Ok(())
    }

    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(SyncState::InProgress)?;
        self.last_attempt = Some(now);
        Ok(())
    }

    /// Success resets the retry counter and clears the last error
    pub fn record_success(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(SyncState::Idle)?;
        self.retry_count = 0;
        self.last_error = None;
        self.last_success = Some(now);
        Ok(())
    }

    pub fn record_failure(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(SyncState::Pending)?;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        Ok(())
    }
}
