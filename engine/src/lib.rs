//! # Roost Engine
//!
//! The deterministic core of Roost's offline-first synchronization.
//!
//! This crate holds the data model for property prospects and the pure
//! reconciliation logic that merges a device's local snapshot with the
//! remote store. It has no IO, no async, and no hidden state - the same
//! inputs always produce the same outputs, which keeps every merge rule
//! independently testable.
//!
//! ## Core Concepts
//!
//! ### Prospects
//!
//! A [`Prospect`] is one rental candidate: zone, price, status, requirement
//! list, free-text comments, contact details, an optional appointment.
//! Two identifiers travel with it:
//!
//! - `local_id` - stable within one device's cache, never shared.
//! - `sync_id` - stable across every device for the same logical record.
//!   This is the merge key. It is assigned once and never changes; records
//!   that predate it are lazily assigned one via
//!   [`Prospect::ensure_sync_id`].
//!
//! `updated_at` (milliseconds since epoch) is the sole conflict authority:
//! strictly newer wins, ties keep the local copy. Wall clocks are compared
//! as-is; skew is a documented limitation, not something the engine
//! second-guesses.
//!
//! ### Tombstones
//!
//! Deleting a remote row is not enough to propagate a deletion to devices
//! that sync later. A [`Tombstone`] is the durable marker that outlives the
//! row, and it always wins over a record resurrected by merge.
//!
//! ### Reconciliation
//!
//! [`reconcile`] merges two snapshots and applies tombstones;
//! [`identify_local_changes`] computes what a device must push upstream.
//! Both are pure functions of their arguments.

pub mod error;
pub mod normalize;
pub mod owner;
pub mod reconcile;
pub mod record;
pub mod tombstone;

// Re-export main types at crate root
pub use error::Error;
pub use normalize::normalize;
pub use owner::Owner;
pub use reconcile::{identify_local_changes, merge_partitions, reconcile, ChangeSet};
pub use record::{Prospect, ProspectStatus};
pub use tombstone::Tombstone;

/// Type aliases for clarity
pub type LocalId = String;
pub type SyncId = String;
pub type DeviceId = String;
pub type Timestamp = i64;
