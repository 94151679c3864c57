//! Unified error handling for the sync layer.

use crate::cache::CacheError;
use crate::remote::RemoteError;
use roost_engine::LocalId;

/// Any failure during a sync session.
///
/// Cache errors can also surface directly from the mutation API; remote and
/// engine errors stop at the orchestrator boundary, where they are logged
/// and swallowed by the fire-and-forget [`crate::SyncOrchestrator::sync`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("engine error: {0}")]
    Engine(#[from] roost_engine::Error),

    #[error("no record with local id {0}")]
    NotFound(LocalId),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
