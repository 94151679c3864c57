//! Error types for the Roost engine.

use crate::LocalId;
use thiserror::Error;

/// All possible errors from the Roost engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A record reached the push path without a sync id. The sync id must
    /// be assigned (lazily, if the record predates the field) before any
    /// remote push.
    #[error("record has no sync id: {0}")]
    MissingSyncId(LocalId),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
