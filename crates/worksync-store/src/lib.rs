//! WorkSync Store - Local/network file storage
//!
//! Provides:
//! - Logical file → local/network path resolution with a write-probed
//!   network reachability cache
//! - Pretty JSON encoding with optional XOR obfuscation
//! - Per-path read/write locks with bounded acquisition
//! - Writes with conflict retry, exponential backoff and a dedup window
//! - Reads that fall back to the simple backup
//! - Tiered backups (simple + timestamped), restore and age-based cleanup
//! - Best-effort multi-file transactions
//!
//! ## Modules
//!
//! - [`paths`] / [`network`] - Path resolution and share probing
//! - [`writer`] / [`reader`] - Locked I/O
//! - [`backup`] - Backup creation, rotation, restore and cleanup
//! - [`events`] - Write event bus and the reactive backup listener
//! - [`context`] - [`StoreContext`] wiring it all together

pub mod backup;
pub mod codec;
pub mod context;
pub mod error;
pub mod events;
pub mod locks;
pub mod network;
pub mod paths;
pub mod reader;
pub mod transaction;
pub mod writer;

pub use backup::{simple_backup_path, BackupEntry, BackupManager, BackupScope, CleanupReport};
pub use codec::Codec;
pub use context::StoreContext;
pub use error::StoreError;
pub use events::{BackupListener, FileEventBus};
pub use locks::LockRegistry;
pub use network::NetworkMonitor;
pub use paths::{PathResolver, ResolvedPaths};
pub use reader::FileReader;
pub use transaction::{FileTransaction, TransactionOutcome};
pub use writer::{FileWriter, WriteOptions, WritePolicy};
