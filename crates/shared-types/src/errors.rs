//! # Error Types
//!
//! Errors that cross crate boundaries.

use thiserror::Error;

/// Errors raised by the storage layer and the iterators built on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing database failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A range iterator failed mid-scan.
    #[error("Iterator error: {0}")]
    Iterator(String),

    /// A stored value could not be decoded.
    #[error("Decode error for {contract_name}/{key}: {reason}")]
    Decode {
        contract_name: String,
        key: String,
        reason: String,
    },

    /// The range bounds are inverted.
    #[error("Invalid range: start {start} is after limit {limit}")]
    InvalidRange { start: String, limit: String },
}

/// Errors raised by access-control providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessControlError {
    /// No provider is configured for this runtime.
    #[error("Access control provider unavailable")]
    Unavailable,

    /// The member could not be resolved.
    #[error("Unknown member in org {org_id}")]
    UnknownMember { org_id: String },
}
