//! # Roost Sync
//!
//! Offline-first synchronization for Roost property prospects.
//!
//! This crate owns everything the deterministic engine deliberately does
//! not: the local cache, the remote store contract, the orchestration of
//! sync sessions, and the mutation API the application calls.
//!
//! ## Architecture
//!
//! - [`LocalCache`] - durable per-owner storage for the current record set
//!   and the pending-tombstone queue. Synchronous; local IO never suspends.
//! - [`RemoteStore`] - the async contract for the remote document
//!   collection: pulls (full and incremental), batched pushes, and a live
//!   subscription feed.
//! - [`SyncOrchestrator`] - decides when and how to reconcile. One session
//!   at a time per owner, incremental windows, lease-based race avoidance,
//!   live-subscription lifecycle.
//! - [`ProspectStore`] - create/update/delete/bulk entry points. Every
//!   mutation lands in the local cache synchronously; upstream propagation
//!   is async and best-effort.
//!
//! ## Error policy
//!
//! Local storage failures surface to the mutation caller - they block even
//! the optimistic local write. Remote failures never do: they are logged
//! and swallowed at the orchestrator boundary, because by then the local
//! write has already succeeded. The application stays fully usable offline.

pub mod cache;
pub mod config;
pub mod error;
pub mod file_cache;
pub mod lease;
pub mod memory;
pub mod mutations;
pub mod orchestrator;
pub mod remote;

pub use cache::{CacheError, LocalCache};
pub use config::SyncConfig;
pub use error::SyncError;
pub use file_cache::FileCache;
pub use lease::PendingLeases;
pub use memory::{MemoryCache, MemoryRemote};
pub use mutations::{ProspectDraft, ProspectStore, StoreStats};
pub use orchestrator::{SyncOrchestrator, SyncReport};
pub use remote::{RemoteError, RemoteStore, SubscriptionFeed};

use roost_engine::Timestamp;

/// Current wall-clock time in milliseconds since the epoch.
///
/// This is the timestamp source for `updated_at` and tombstones. It is
/// deliberately uncompensated wall-clock time; multi-device skew is a
/// documented limitation of the merge model.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
