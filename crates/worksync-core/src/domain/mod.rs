//! Domain entities
//!
//! - Logical file identifiers and their criticality tiers
//! - Operation results returned across store and sync APIs
//! - Per-pair sync status with its state machine
//! - Roles and file capabilities
//! - Domain-specific error types

pub mod criticality;
pub mod errors;
pub mod file_path;
pub mod operation;
pub mod role;
pub mod sync_status;

pub use criticality::{BackupStrategy, CriticalityLevel};
pub use errors::DomainError;
pub use file_path::{FileKind, FilePath, Locality};
pub use operation::FileOperationResult;
pub use role::{Capability, Role};
pub use sync_status::{SyncDirection, SyncKey, SyncState, SyncStatus};
