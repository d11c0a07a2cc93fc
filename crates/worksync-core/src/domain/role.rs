//! Roles and the file capabilities they grant
//!
//! The capability set of every role is produced by one exhaustive `match`, so
//! adding a role without deciding its permissions is a compile error.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::file_path::FileKind;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    TeamLeader,
    Checking,
    UserChecking,
    Admin,
}

/// A single permission over data files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadOwnFiles,
    WriteOwnFiles,
    ReadAdminFiles,
    WriteAdminFiles,
    ManageUsers,
    ManageBackups,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::TeamLeader,
        Role::Checking,
        Role::UserChecking,
        Role::Admin,
    ];

    pub fn capabilities(&self) -> BTreeSet<Capability> {
        use Capability::*;

        let caps: &[Capability] = match self {
            Role::User => &[ReadOwnFiles, WriteOwnFiles],
            Role::TeamLeader => &[ReadOwnFiles, WriteOwnFiles, ReadAdminFiles],
            Role::Checking => &[ReadOwnFiles, ReadAdminFiles, WriteAdminFiles],
            Role::UserChecking => &[ReadOwnFiles, WriteOwnFiles, ReadAdminFiles, WriteAdminFiles],
            Role::Admin => &[
                ReadOwnFiles,
                WriteOwnFiles,
                ReadAdminFiles,
                WriteAdminFiles,
                ManageUsers,
                ManageBackups,
            ],
        };
        caps.iter().copied().collect()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Whether this role may read (or write, when `write` is set) files of `kind`
    pub fn can_access(&self, kind: FileKind, write: bool) -> bool {
        let needed = match (kind, write) {
            (FileKind::Users, false) => Capability::ReadOwnFiles,
            (FileKind::Users, true) => Capability::ManageUsers,
            (k, false) if k.is_admin() => Capability::ReadAdminFiles,
            (k, true) if k.is_admin() => Capability::WriteAdminFiles,
            (_, false) => Capability::ReadOwnFiles,
            (_, true) => Capability::WriteOwnFiles,
        };
        self.has(needed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::TeamLeader => "team_leader",
            Role::Checking => "checking",
            Role::UserChecking => "user_checking",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    /// Accepts `team_leader`, `team-leader`, `TEAM_LEADER` and an optional
    /// `ROLE_` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase().replace('-', "_");
        let normalized = lower.strip_prefix("role_").unwrap_or(&lower);
        Role::ALL
            .into_iter()
            .find(|r| r.name() == normalized)
            .ok_or_else(|| DomainError::UnknownRole(s.to_string()))
    }
}
