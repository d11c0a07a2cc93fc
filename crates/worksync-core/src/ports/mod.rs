//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces the domain core depends on, whose implementations
//! live in adapter crates.
//!
//! - [`IFileEventSink`] - Publication of write outcomes (backup trigger)

pub mod events;

pub use events::{FileEvent, IFileEventSink, NoopEventSink};
