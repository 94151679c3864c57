//! Remote store contract.
//!
//! The remote document collection is an external collaborator; the engine
//! only needs this contract. Implementations wrap whatever backend the
//! application ships with - the in-process [`crate::MemoryRemote`] is used
//! by tests and as a reference implementation.

use async_trait::async_trait;
use roost_engine::{Owner, Prospect, Timestamp, Tombstone};
use thiserror::Error;
use tokio::sync::mpsc;

/// Remote IO failure during a sync pass.
///
/// Never surfaced to mutation callers: the orchestrator logs and swallows
/// these, because the local write already succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network-level failure or the backend is down
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The owner is not allowed to touch this partition
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    /// The backend refused a batch write
    #[error("remote rejected batch: {0}")]
    Rejected(String),
}

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Live-subscription feed: every delivery is the full current remote record
/// set for the subscribed partition, sent on every remote change from any
/// device.
pub type SubscriptionFeed = mpsc::UnboundedReceiver<Vec<Prospect>>;

/// The remote document collection, keyed by owner and update timestamp.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch every record in a partition.
    async fn fetch_all(&self, owner: &Owner) -> RemoteResult<Vec<Prospect>>;

    /// Fetch records modified at or after `since` (inclusive, so a write
    /// stamped in the same millisecond as a sync window is still picked up
    /// by the next pass). Purely an efficiency window; reconciliation is
    /// idempotent over any valid remote snapshot, and an occasional re-pull
    /// at the boundary is harmless.
    async fn fetch_modified_since(
        &self,
        owner: &Owner,
        since: Timestamp,
    ) -> RemoteResult<Vec<Prospect>>;

    /// Fetch every deletion record in a partition.
    async fn fetch_tombstones(&self, owner: &Owner) -> RemoteResult<Vec<Tombstone>>;

    /// Fetch deletion records created at or after `since` (inclusive).
    async fn fetch_tombstones_modified_since(
        &self,
        owner: &Owner,
        since: Timestamp,
    ) -> RemoteResult<Vec<Tombstone>>;

    /// Insert new records as one batch.
    async fn batch_create(&self, owner: &Owner, records: Vec<Prospect>) -> RemoteResult<()>;

    /// Overwrite existing records as one batch.
    async fn batch_update(&self, owner: &Owner, records: Vec<Prospect>) -> RemoteResult<()>;

    /// Delete records as one batch. Each tombstone is durably written as a
    /// row in its own right and its record row removed, so devices that
    /// sync after the record is gone still learn of the deletion.
    async fn batch_delete(&self, owner: &Owner, tombstones: Vec<Tombstone>) -> RemoteResult<()>;

    /// Open a live feed for a partition. Dropping the receiver ends the
    /// subscription.
    async fn subscribe(&self, owner: &Owner) -> RemoteResult<SubscriptionFeed>;
}
