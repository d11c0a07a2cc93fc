//! Logical file identifiers
//!
//! A [`FilePath`] names a data file by what it *is* (a user's worktime for a
//! month, the admin bonus sheet, the user list) rather than where it lives.
//! The path resolver in `worksync-store` turns it into concrete local and
//! network paths.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── user/session/   session_<user>_<id>.json
//! ├── user/worktime/  worktime_<user>_<yyyy>_<MM>.json
//! ├── user/register/  registru_<user>_<id>_<yyyy>_<MM>.json
//! ├── admin/worktime/ admin_worktime_<yyyy>_<MM>.json
//! ├── admin/register/ admin_registru_<user>_<id>_<yyyy>_<MM>.json
//! ├── admin/bonus/    admin_bonus_<yyyy>_<MM>.json
//! └── login/          users.json
//! ```

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::criticality::CriticalityLevel;
use super::errors::DomainError;

// ============================================================================
// FileKind
// ============================================================================

/// Logical role of a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Session,
    Worktime,
    Register,
    AdminWorktime,
    AdminRegister,
    AdminBonus,
    Users,
}

impl FileKind {
    /// All kinds, in directory-creation order
    pub const ALL: [FileKind; 7] = [
        FileKind::Session,
        FileKind::Worktime,
        FileKind::Register,
        FileKind::AdminWorktime,
        FileKind::AdminRegister,
        FileKind::AdminBonus,
        FileKind::Users,
    ];

    /// Subdirectory relative to the installation (or network) root
    pub const fn subdir(&self) -> &'static str {
        match self {
            FileKind::Session => "user/session",
            FileKind::Worktime => "user/worktime",
            FileKind::Register => "user/register",
            FileKind::AdminWorktime => "admin/worktime",
            FileKind::AdminRegister => "admin/register",
            FileKind::AdminBonus => "admin/bonus",
            FileKind::Users => "login",
        }
    }

    pub const fn criticality(&self) -> CriticalityLevel {
        match self {
            FileKind::Session => CriticalityLevel::Low,
            FileKind::Worktime => CriticalityLevel::Medium,
            FileKind::Register
            | FileKind::AdminWorktime
            | FileKind::AdminRegister
            | FileKind::AdminBonus
            | FileKind::Users => CriticalityLevel::High,
        }
    }

    /// Short name used in CLI arguments and the backup tree
    pub const fn name(&self) -> &'static str {
        match self {
            FileKind::Session => "session",
            FileKind::Worktime => "worktime",
            FileKind::Register => "register",
            FileKind::AdminWorktime => "admin-worktime",
            FileKind::AdminRegister => "admin-register",
            FileKind::AdminBonus => "admin-bonus",
            FileKind::Users => "users",
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(
            self,
            FileKind::AdminWorktime | FileKind::AdminRegister | FileKind::AdminBonus
        )
    }

    const fn needs_username(&self) -> bool {
        matches!(
            self,
            FileKind::Session | FileKind::Worktime | FileKind::Register | FileKind::AdminRegister
        )
    }

    const fn needs_user_id(&self) -> bool {
        matches!(
            self,
            FileKind::Session | FileKind::Register | FileKind::AdminRegister
        )
    }

    const fn needs_period(&self) -> bool {
        !matches!(self, FileKind::Session | FileKind::Users)
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        FileKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| DomainError::UnknownFileKind(s.to_string()))
    }
}

// ============================================================================
// Locality
// ============================================================================

/// Which replica a path refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// The installation directory on this machine
    #[default]
    Local,
    /// The shared network mirror
    Network,
}

impl Display for Locality {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Local => f.write_str("local"),
            Locality::Network => f.write_str("network"),
        }
    }
}

// ============================================================================
// FilePath
// ============================================================================

/// Immutable logical identifier of a data file
///
/// Construct with the factory functions ([`FilePath::worktime`],
/// [`FilePath::register`], ...); they validate the owner and period so a
/// `FilePath` always renders to a well-formed filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePath {
    kind: FileKind,
    username: Option<String>,
    user_id: Option<u32>,
    year: Option<i32>,
    month: Option<u32>,
    locality: Locality,
}

impl FilePath {
    /// Builds a path for any kind, checking that every field the kind's
    /// filename template needs is present and valid.
    pub fn build(
        kind: FileKind,
        username: Option<&str>,
        user_id: Option<u32>,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Self, DomainError> {
        let username = match (kind.needs_username(), username) {
            (true, Some(name)) => Some(validate_username(name)?),
            (true, None) => {
                return Err(DomainError::ValidationFailed(format!(
                    "{kind} files require a username"
                )))
            }
            (false, _) => None,
        };

        let user_id = match (kind.needs_user_id(), user_id) {
            (true, Some(id)) => Some(id),
            (true, None) => {
                return Err(DomainError::ValidationFailed(format!(
                    "{kind} files require a user id"
                )))
            }
            (false, _) => None,
        };

        let (year, month) = match (kind.needs_period(), year, month) {
            (true, Some(y), Some(m)) => {
                validate_period(y, m)?;
                (Some(y), Some(m))
            }
            (true, _, _) => {
                return Err(DomainError::ValidationFailed(format!(
                    "{kind} files require a year and month"
                )))
            }
            (false, _, _) => (None, None),
        };

        Ok(Self {
            kind,
            username,
            user_id,
            year,
            month,
            locality: Locality::Local,
        })
    }

    pub fn session(username: &str, user_id: u32) -> Result<Self, DomainError> {
        Self::build(FileKind::Session, Some(username), Some(user_id), None, None)
    }

    pub fn worktime(username: &str, year: i32, month: u32) -> Result<Self, DomainError> {
        Self::build(FileKind::Worktime, Some(username), None, Some(year), Some(month))
    }

    pub fn register(
        username: &str,
        user_id: u32,
        year: i32,
        month: u32,
    ) -> Result<Self, DomainError> {
        Self::build(
            FileKind::Register,
            Some(username),
            Some(user_id),
            Some(year),
            Some(month),
        )
    }

    pub fn admin_worktime(year: i32, month: u32) -> Result<Self, DomainError> {
        Self::build(FileKind::AdminWorktime, None, None, Some(year), Some(month))
    }

    pub fn admin_register(
        username: &str,
        user_id: u32,
        year: i32,
        month: u32,
    ) -> Result<Self, DomainError> {
        Self::build(
            FileKind::AdminRegister,
            Some(username),
            Some(user_id),
            Some(year),
            Some(month),
        )
    }

    pub fn admin_bonus(year: i32, month: u32) -> Result<Self, DomainError> {
        Self::build(FileKind::AdminBonus, None, None, Some(year), Some(month))
    }

    /// The shared user list used at login
    #[must_use]
    pub fn users() -> Self {
        Self {
            kind: FileKind::Users,
            username: None,
            user_id: None,
            year: None,
            month: None,
            locality: Locality::Local,
        }
    }

    /// Returns a copy of this path pointing at the given replica
    #[must_use]
    pub fn with_locality(&self, locality: Locality) -> Self {
        Self {
            locality,
            ..self.clone()
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn user_id(&self) -> Option<u32> {
        self.user_id
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn locality(&self) -> Locality {
        self.locality
    }

    pub fn is_network(&self) -> bool {
        self.locality == Locality::Network
    }

    pub fn criticality(&self) -> CriticalityLevel {
        self.kind.criticality()
    }

    /// Renders the filename template for this kind
    pub fn file_name(&self) -> String {
        let user = self.username.as_deref().unwrap_or_default();
        let id = self.user_id.unwrap_or_default();
        let year = self.year.unwrap_or_default();
        let month = self.month.unwrap_or_default();

        match self.kind {
            FileKind::Session => format!("session_{user}_{id}.json"),
            FileKind::Worktime => format!("worktime_{user}_{year}_{month:02}.json"),
            FileKind::Register => format!("registru_{user}_{id}_{year}_{month:02}.json"),
            FileKind::AdminWorktime => format!("admin_worktime_{year}_{month:02}.json"),
            FileKind::AdminRegister => {
                format!("admin_registru_{user}_{id}_{year}_{month:02}.json")
            }
            FileKind::AdminBonus => format!("admin_bonus_{year}_{month:02}.json"),
            FileKind::Users => "users.json".to_string(),
        }
    }

    /// `<subdir>/<file_name>`, relative to either root
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.subdir()).join(self.file_name())
    }

    /// Key used to recognise repeated writes of the same file by the same user
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.username.clone().unwrap_or_default(),
            self.file_name(),
        )
    }
}

impl Display for FilePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.locality, self.relative_path().display())
    }
}

fn validate_username(name: &str) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidUsername("username is empty".to_string()));
    }
    if trimmed.contains(['/', '\\']) || trimmed.contains("..") || trimmed.contains('\0') {
        return Err(DomainError::InvalidUsername(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_period(year: i32, month: u32) -> Result<(), DomainError> {
    if !(1..=12).contains(&month) {
        return Err(DomainError::InvalidPeriod(format!("month {month}")));
    }
    if !(1900..=9999).contains(&year) {
        return Err(DomainError::InvalidPeriod(format!("year {year}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_templates() {
        assert_eq!(
            FilePath::session("ana", 7).unwrap().file_name(),
            "session_ana_7.json"
        );
        assert_eq!(
            FilePath::worktime("ana", 2024, 3).unwrap().file_name(),
            "worktime_ana_2024_03.json"
        );
        assert_eq!(
            FilePath::register("ana", 7, 2024, 11).unwrap().file_name(),
            "registru_ana_7_2024_11.json"
        );
        assert_eq!(
            FilePath::admin_worktime(2024, 1).unwrap().file_name(),
            "admin_worktime_2024_01.json"
        );
        assert_eq!(
            FilePath::admin_register("ana", 7, 2024, 2).unwrap().file_name(),
            "admin_registru_ana_7_2024_02.json"
        );
        assert_eq!(
            FilePath::admin_bonus(2025, 12).unwrap().file_name(),
            "admin_bonus_2025_12.json"
        );
        assert_eq!(FilePath::users().file_name(), "users.json");
    }

    #[test]
    fn test_relative_path_uses_kind_subdir() {
        let p = FilePath::worktime("ana", 2024, 3).unwrap();
        assert_eq!(
            p.relative_path(),
            PathBuf::from("user/worktime/worktime_ana_2024_03.json")
        );
        assert_eq!(
            FilePath::users().relative_path(),
            PathBuf::from("login/users.json")
        );
    }

    #[test]
    fn test_with_locality_does_not_mutate_original() {
        let local = FilePath::admin_bonus(2024, 5).unwrap();
        let network = local.with_locality(Locality::Network);
        assert_eq!(local.locality(), Locality::Local);
        assert!(network.is_network());
        assert_eq!(local.file_name(), network.file_name());
    }

    #[test]
    fn test_rejects_invalid_month() {
        let err = FilePath::worktime("ana", 2024, 13).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPeriod(_)));
        assert!(FilePath::admin_bonus(2024, 0).is_err());
    }

    #[test]
    fn test_rejects_path_like_usernames() {
        assert!(FilePath::worktime("../etc", 2024, 1).is_err());
        assert!(FilePath::worktime("a/b", 2024, 1).is_err());
        assert!(FilePath::worktime("   ", 2024, 1).is_err());
    }

    #[test]
    fn test_build_requires_fields_per_kind() {
        assert!(FilePath::build(FileKind::Register, Some("ana"), None, Some(2024), Some(1)).is_err());
        assert!(FilePath::build(FileKind::Worktime, Some("ana"), None, None, Some(1)).is_err());
        // Extra fields are dropped for kinds that do not use them
        let users = FilePath::build(FileKind::Users, Some("ana"), Some(1), Some(2024), Some(1))
            .unwrap();
        assert_eq!(users.username(), None);
        assert_eq!(users, FilePath::users());
    }

    #[test]
    fn test_kind_parse_accepts_both_separators() {
        assert_eq!("admin-bonus".parse::<FileKind>().unwrap(), FileKind::AdminBonus);
        assert_eq!("ADMIN_REGISTER".parse::<FileKind>().unwrap(), FileKind::AdminRegister);
        assert!("holidays".parse::<FileKind>().is_err());
    }

    #[test]
    fn test_criticality_mapping() {
        assert_eq!(FileKind::Session.criticality(), CriticalityLevel::Low);
        assert_eq!(FileKind::Worktime.criticality(), CriticalityLevel::Medium);
        assert_eq!(FileKind::Register.criticality(), CriticalityLevel::High);
        assert_eq!(FileKind::Users.criticality(), CriticalityLevel::High);
    }

    #[test]
    fn test_dedup_key() {
        let p = FilePath::register("ana", 7, 2024, 11).unwrap();
        assert_eq!(
            p.dedup_key(),
            ("ana".to_string(), "registru_ana_7_2024_11.json".to_string())
        );
    }

    #[test]
    fn test_display() {
        let p = FilePath::users().with_locality(Locality::Network);
        assert_eq!(p.to_string(), "network:login/users.json");
    }
}
