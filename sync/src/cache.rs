//! Local cache contract.
//!
//! The cache is the single shared mutable resource in the system. Only the
//! mutation API and the orchestrator's snapshot-overwrite step write to it,
//! and writes are always the complete snapshot for a partition - never a
//! partial patch - so a mutation's synchronous write can never interleave
//! with half of a sync result.

use roost_engine::{Owner, Prospect, SyncId};
use thiserror::Error;

/// Local storage failure.
///
/// These surface to the caller of the mutation API: if the optimistic local
/// write cannot happen, the mutation did not happen.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem-level failure (quota exceeded, permission, disk)
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded
    #[error("corrupt cache data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Durable per-owner storage for records and pending tombstones.
///
/// All methods are synchronous: local reads and writes never suspend, which
/// is what guarantees a UI read immediately after a mutation sees the new
/// state even while a sync pass is in flight.
pub trait LocalCache: Send + Sync + 'static {
    /// Read the complete record set for a partition.
    fn read_all(&self, owner: &Owner) -> CacheResult<Vec<Prospect>>;

    /// Overwrite the partition with a complete snapshot.
    fn write_all(&self, owner: &Owner, records: Vec<Prospect>) -> CacheResult<()>;

    /// Read the queued deletions for a partition.
    fn read_pending_tombstones(&self, owner: &Owner) -> CacheResult<Vec<SyncId>>;

    /// Queue a deletion. Appended before the record itself is removed, so a
    /// crash in between still leaves the deletion queued for the next sync.
    fn append_pending_tombstone(&self, owner: &Owner, sync_id: SyncId) -> CacheResult<()>;

    /// Drop the queue. Called only after a fully successful push cycle.
    fn clear_pending_tombstones(&self, owner: &Owner) -> CacheResult<()>;
}
