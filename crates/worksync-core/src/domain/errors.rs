//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A username that cannot be embedded in a filename
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Month outside 1..=12 or an unusable year
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Unknown file kind name
    #[error("Unknown file kind: {0}")]
    UnknownFileKind(String),

    /// Unknown role name
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
