//! Backup criticality tiers
//!
//! Each logical file kind is assigned a [`CriticalityLevel`] that controls how
//! many historical backups are retained and whether timestamped copies are
//! kept at all.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// How much history is kept for a file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalityLevel {
    /// Simple `.bak` sibling only
    Low,
    /// Simple backup plus up to 5 timestamped copies
    Medium,
    /// Simple backup plus up to 10 timestamped copies
    High,
}

/// Strategy used when creating a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStrategy {
    /// Overwrite the sibling `<file>.bak`
    SimpleOnly,
    /// Sibling `<file>.bak` plus a dated copy under the backup tree
    TimestampedAndSimple,
}

impl CriticalityLevel {
    /// Default number of backups retained for this level
    pub const fn default_retention(&self) -> usize {
        match self {
            CriticalityLevel::Low => 1,
            CriticalityLevel::Medium => 5,
            CriticalityLevel::High => 10,
        }
    }

    pub const fn strategy(&self) -> BackupStrategy {
        match self {
            CriticalityLevel::Low => BackupStrategy::SimpleOnly,
            CriticalityLevel::Medium | CriticalityLevel::High => {
                BackupStrategy::TimestampedAndSimple
            }
        }
    }

    /// Directory name used inside the backup tree
    pub const fn dir_name(&self) -> &'static str {
        match self {
            CriticalityLevel::Low => "low",
            CriticalityLevel::Medium => "medium",
            CriticalityLevel::High => "high",
        }
    }

    pub const fn keeps_timestamped(&self) -> bool {
        matches!(self.strategy(), BackupStrategy::TimestampedAndSimple)
    }
}

impl fmt::Display for CriticalityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for CriticalityLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(CriticalityLevel::Low),
            "medium" => Ok(CriticalityLevel::Medium),
            "high" => Ok(CriticalityLevel::High),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown criticality level '{other}'"
            ))),
        }
    }
}
