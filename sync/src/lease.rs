//! Pending-operation leases.
//!
//! A mutation acquires a lease on its record's sync id before its upstream
//! sync pass starts. While any lease is active, incoming live-subscription
//! deliveries are ignored for that cycle: the in-flight mutation's own sync
//! pass will supersede them shortly. A lease is released when that pass
//! completes, or expires after a timeout - the fallback against a mutation
//! whose sync silently died and would otherwise suppress live updates
//! forever.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use roost_engine::SyncId;

/// Lease table for in-flight local mutations.
#[derive(Debug)]
pub struct PendingLeases {
    held: DashMap<SyncId, Instant>,
    timeout: Duration,
}

impl PendingLeases {
    /// Create a lease table with the given expiry.
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: DashMap::new(),
            timeout,
        }
    }

    /// Acquire (or refresh) the lease for a sync id.
    pub fn acquire(&self, sync_id: SyncId) {
        self.held.insert(sync_id, Instant::now());
    }

    /// Release one lease. Returns whether it was held.
    pub fn release(&self, sync_id: &str) -> bool {
        self.held.remove(sync_id).is_some()
    }

    /// Release every lease in the iterator. Called by the orchestrator when
    /// the sync pass covering those records completes.
    pub fn release_many<'a>(&self, sync_ids: impl IntoIterator<Item = &'a SyncId>) {
        for id in sync_ids {
            self.held.remove(id);
        }
    }

    /// Whether a specific lease is currently held and unexpired.
    pub fn is_held(&self, sync_id: &str) -> bool {
        self.sweep();
        self.held.contains_key(sync_id)
    }

    /// Whether any lease is active. This is the live-update suppression
    /// check: a single in-flight mutation suppresses the whole delivery.
    pub fn any_active(&self) -> bool {
        self.sweep();
        !self.held.is_empty()
    }

    /// Count of active leases.
    pub fn active_count(&self) -> usize {
        self.sweep();
        self.held.len()
    }

    /// Drop expired leases.
    fn sweep(&self) {
        let now = Instant::now();
        self.held
            .retain(|_, acquired| now.duration_since(*acquired) < self.timeout);
    }
}
