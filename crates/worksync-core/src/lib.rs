//! WorkSync Core - Domain types and configuration
//!
//! This crate contains the pieces of the persistence layer that carry no I/O:
//! - **Domain types** - `FilePath`, `FileKind`, `CriticalityLevel`,
//!   `FileOperationResult`, `SyncStatus`, `Role`
//! - **Configuration** - YAML-backed [`config::Config`] with validation and a builder
//! - **Ports** - the [`ports::IFileEventSink`] trait that write paths publish to
//!
//! The storage adapters (`worksync-store`) and the replication service
//! (`worksync-sync`) build on these types.

pub mod config;
pub mod domain;
pub mod ports;
