//! Sync orchestration.
//!
//! The orchestrator decides *when* and *how* to reconcile, and keeps the
//! local cache consistent with the engine's output. One session at a time
//! per owner; a trigger that arrives while a session is running is skipped,
//! since the next trigger re-syncs current state anyway.
//!
//! A session:
//!
//! 1. absorb the guest partition (one-time, first authenticated sync)
//! 2. snapshot local records + pending tombstones, lazily assigning sync
//!    ids to records that predate the field
//! 3. pull remote records and tombstones - incremental if a prior
//!    successful sync timestamp exists, full otherwise
//! 4. reconcile into the final snapshot
//! 5. diff against the raw pulled snapshot (never the reconciled one, which
//!    would hide genuinely-local changes) and push batches
//! 6. overwrite the cache with the final snapshot, clear the tombstone
//!    queue, record the new sync window
//! 7. ensure the live subscription is running
//!
//! Any failure abandons the session: the cache keeps whatever the mutation
//! API already wrote synchronously, and the sync window is not advanced, so
//! the next attempt retries the same incremental range.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use roost_engine::{
    identify_local_changes, merge_partitions, reconcile, Owner, Prospect, SyncId, Timestamp,
    Tombstone,
};

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::lease::PendingLeases;
use crate::now_millis;
use crate::remote::RemoteStore;

/// What one sync session did. Logged with structured fields on completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// A session was already running (or the owner is the guest partition)
    pub skipped: bool,
    /// Whether this was a full pull rather than an incremental one
    pub full_pull: bool,
    /// Remote records pulled
    pub pulled_records: usize,
    /// Remote tombstones pulled
    pub pulled_tombstones: usize,
    /// Records pushed as creates
    pub pushed_creates: usize,
    /// Records pushed as updates
    pub pushed_updates: usize,
    /// Deletions pushed
    pub pushed_deletes: usize,
    /// Guest records absorbed into the user partition
    pub merged_guest: usize,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Drives the reconciliation engine and owns all per-owner sync state.
///
/// Built once at application startup with its collaborators passed in
/// explicitly, then shared by handle.
pub struct SyncOrchestrator<C: LocalCache, R: RemoteStore> {
    cache: Arc<C>,
    remote: Arc<R>,
    config: SyncConfig,
    leases: PendingLeases,
    /// Owners with a session currently running
    in_flight: DashMap<String, ()>,
    /// Last successful sync timestamp per owner; absent means full pull
    last_sync: DashMap<String, Timestamp>,
    /// Live subscription tasks per owner
    subscriptions: DashMap<String, JoinHandle<()>>,
    /// Periodic full-sync tasks per owner
    periodic: DashMap<String, JoinHandle<()>>,
    online: AtomicBool,
}

impl<C: LocalCache, R: RemoteStore> SyncOrchestrator<C, R> {
    /// Create an orchestrator over the given collaborators.
    pub fn new(cache: Arc<C>, remote: Arc<R>, config: SyncConfig) -> Arc<Self> {
        let lease_timeout = config.lease_timeout;
        Arc::new(Self {
            cache,
            remote,
            config,
            leases: PendingLeases::new(lease_timeout),
            in_flight: DashMap::new(),
            last_sync: DashMap::new(),
            subscriptions: DashMap::new(),
            periodic: DashMap::new(),
            online: AtomicBool::new(true),
        })
    }

    /// The lease table, shared with the mutation API.
    pub fn leases(&self) -> &PendingLeases {
        &self.leases
    }

    /// Current connectivity assumption.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Update connectivity. Going offline only stops new triggers from
    /// firing; an in-flight session fails on its own remote calls.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Reconnect trigger: mark online and schedule a sync pass.
    pub fn reconnect(self: &Arc<Self>, owner: &Owner) {
        self.set_online(true);
        self.spawn_sync(owner);
    }

    /// Fire-and-forget sync pass. Callers never block on sync.
    pub fn spawn_sync(self: &Arc<Self>, owner: &Owner) {
        let this = Arc::clone(self);
        let owner = owner.clone();
        tokio::spawn(async move {
            this.sync(&owner).await;
        });
    }

    /// Run one sync session, swallowing failures at this boundary.
    ///
    /// Safe to call repeatedly; a pass that finds a session already running
    /// does nothing.
    pub async fn sync(self: &Arc<Self>, owner: &Owner) {
        match self.run_sync(owner).await {
            Ok(report) if !report.skipped => {
                tracing::info!(
                    owner = %owner,
                    pulled = report.pulled_records,
                    creates = report.pushed_creates,
                    updates = report.pushed_updates,
                    deletes = report.pushed_deletes,
                    full = report.full_pull,
                    "sync pass complete"
                );
            }
            Ok(_) => {}
            Err(err) => {
                // Local state keeps whatever the mutation API already
                // wrote; the sync window was not advanced.
                tracing::warn!(owner = %owner, error = %err, "sync pass failed");
            }
        }
    }

    /// Run one sync session, returning the outcome.
    pub async fn run_sync(self: &Arc<Self>, owner: &Owner) -> Result<SyncReport> {
        if !owner.is_user() {
            tracing::debug!("guest partition has no remote counterpart, skipping sync");
            return Ok(SyncReport::skipped());
        }

        let key = owner.storage_key();
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, key.clone()) else {
            tracing::debug!(owner = %owner, "sync already in progress, skipping trigger");
            return Ok(SyncReport::skipped());
        };

        let mut report = SyncReport::default();

        // One-time guest absorption on first authenticated sync.
        report.merged_guest = self.merge_guest_partition(owner)?;

        // Snapshot local state; lazily migrate records missing a sync id
        // and persist the assignment before anything is pushed.
        let mut local = self.cache.read_all(owner)?;
        let mut assigned = false;
        for record in &mut local {
            assigned |= record.ensure_sync_id();
        }
        if assigned {
            self.cache.write_all(owner, local.clone())?;
        }
        let pending = self.cache.read_pending_tombstones(owner)?;

        // The next window starts where this pull began, not where it ended:
        // a change racing the pull gets re-fetched instead of skipped.
        let window_start = now_millis();
        let since = self.last_sync.get(&key).map(|entry| *entry.value());
        let (remote_records, remote_tombstones) = match since {
            Some(ts) => (
                self.remote.fetch_modified_since(owner, ts).await?,
                self.remote.fetch_tombstones_modified_since(owner, ts).await?,
            ),
            None => {
                report.full_pull = true;
                (
                    self.remote.fetch_all(owner).await?,
                    self.remote.fetch_tombstones(owner).await?,
                )
            }
        };
        report.pulled_records = remote_records.len();
        report.pulled_tombstones = remote_tombstones.len();

        // Diff against the raw pulled snapshot before it is consumed by the
        // merge. On an incremental pass that snapshot is only the records
        // inside the window, so the push candidates must be windowed the
        // same way: an unchanged local record has no pulled counterpart and
        // would otherwise be misread as a create on every pass.
        let candidates: Vec<Prospect> = match since {
            Some(ts) => local.iter().filter(|r| r.updated_at >= ts).cloned().collect(),
            None => local.clone(),
        };
        let mut changes = identify_local_changes(&candidates, &remote_records, &pending)?;

        // The pulled subset also cannot distinguish a brand-new record from
        // one whose remote counterpart simply did not change inside the
        // window. A record that already existed at the last successful sync
        // was pushed by it, so only records born inside the window are
        // genuine creates; the rest are updates to a known counterpart.
        if let Some(ts) = since {
            let (creates, updates): (Vec<Prospect>, Vec<Prospect>) =
                std::mem::take(&mut changes.to_create)
                    .into_iter()
                    .partition(|r| r.created_at >= ts);
            changes.to_create = creates;
            changes.to_update.extend(updates);
        }

        // A pulled tombstone is terminal. A stale local copy of a record
        // another device just deleted must never be pushed back.
        let tombstoned: HashSet<&SyncId> =
            remote_tombstones.iter().map(|t| &t.sync_id).collect();
        changes
            .to_create
            .retain(|r| r.sync_id.as_ref().map_or(false, |id| !tombstoned.contains(id)));
        changes
            .to_update
            .retain(|r| r.sync_id.as_ref().map_or(false, |id| !tombstoned.contains(id)));

        report.pushed_creates = changes.to_create.len();
        report.pushed_updates = changes.to_update.len();
        report.pushed_deletes = changes.to_delete.len();

        let snapshot_ids: Vec<SyncId> = local.iter().filter_map(|r| r.sync_id.clone()).collect();
        let merged = reconcile(local, remote_records, &remote_tombstones);

        if !changes.to_create.is_empty() {
            self.remote.batch_create(owner, changes.to_create).await?;
        }
        if !changes.to_update.is_empty() {
            self.remote.batch_update(owner, changes.to_update).await?;
        }
        if !changes.to_delete.is_empty() {
            let deleted_at = now_millis();
            let tombstones: Vec<Tombstone> = changes
                .to_delete
                .iter()
                .map(|id| Tombstone::new(id.clone(), deleted_at, self.config.device_id.clone()))
                .collect();
            self.remote.batch_delete(owner, tombstones).await?;
        }

        // The merge only saw remote tombstones; drop records this device
        // deleted in the current session so the remote copy pulled above
        // cannot resurrect them.
        let pending_set: HashSet<&SyncId> = pending.iter().collect();
        let final_snapshot: Vec<_> = merged
            .into_iter()
            .filter(|record| {
                record
                    .sync_id
                    .as_ref()
                    .map_or(true, |id| !pending_set.contains(id))
            })
            .collect();

        self.cache.write_all(owner, final_snapshot)?;
        self.cache.clear_pending_tombstones(owner)?;
        self.last_sync.insert(key, window_start);

        // Every record covered by this pass has been synced; its mutation's
        // lease is done.
        self.leases.release_many(&snapshot_ids);
        self.leases.release_many(&pending);

        self.ensure_subscribed(owner).await;

        Ok(report)
    }

    /// React to a live-subscription delivery: reconcile and overwrite the
    /// cache, no diff and no push. Ignored entirely while any local
    /// mutation holds a lease - that mutation's own sync pass supersedes
    /// the delivery.
    pub fn apply_remote_snapshot(&self, owner: &Owner, snapshot: Vec<roost_engine::Prospect>) {
        if self.leases.any_active() {
            tracing::debug!(
                owner = %owner,
                leases = self.leases.active_count(),
                "live update suppressed while local mutations are in flight"
            );
            return;
        }

        let result: Result<()> = (|| {
            let local = self.cache.read_all(owner)?;
            let pending = self.cache.read_pending_tombstones(owner)?;

            // Deliveries carry no tombstones; locally queued deletions
            // still must not be resurrected.
            let merged = reconcile(local, snapshot, &[]);
            let pending_set: HashSet<&SyncId> = pending.iter().collect();
            let final_snapshot: Vec<_> = merged
                .into_iter()
                .filter(|record| {
                    record
                        .sync_id
                        .as_ref()
                        .map_or(true, |id| !pending_set.contains(id))
                })
                .collect();

            self.cache.write_all(owner, final_snapshot)?;
            Ok(())
        })();

        if let Err(err) = result {
            tracing::warn!(owner = %owner, error = %err, "failed to apply live update");
        }
    }

    /// Start the live-subscription consumer for an owner if it is not
    /// already running.
    ///
    /// The feed is opened before this returns; once the session reports
    /// itself subscribed, no remote change can land in an unwatched gap. A
    /// failure to open is logged and retried on the next session rather
    /// than failing the sync that requested it.
    pub async fn ensure_subscribed(self: &Arc<Self>, owner: &Owner) {
        let key = owner.storage_key();
        if self.subscriptions.contains_key(&key) {
            return;
        }

        let mut feed = match self.remote.subscribe(owner).await {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(owner = %owner, error = %err, "subscription failed to open");
                return;
            }
        };

        let this = Arc::downgrade(self);
        let owner = owner.clone();
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = feed.recv().await {
                // Weak handle: the task must not keep the orchestrator
                // alive after the application drops it.
                let Some(orchestrator) = this.upgrade() else {
                    break;
                };
                orchestrator.apply_remote_snapshot(&owner, snapshot);
            }
            tracing::debug!(owner = %owner, "subscription feed closed");
        });
        if let Some(previous) = self.subscriptions.insert(key, handle) {
            previous.abort();
        }
    }

    /// Schedule a recurring full sync. The first tick fires after one full
    /// `interval`. Starting a second periodic task for the same owner
    /// replaces the first.
    pub fn start_periodic(self: &Arc<Self>, owner: &Owner, interval: Duration) {
        let key = owner.storage_key();
        let this = Arc::downgrade(self);
        let owner = owner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let Some(orchestrator) = this.upgrade() else {
                    break;
                };
                // Periodic passes are full pulls: drop the window first.
                orchestrator.last_sync.remove(&owner.storage_key());
                orchestrator.sync(&owner).await;
            }
        });
        if let Some(previous) = self.periodic.insert(key, handle) {
            previous.abort();
        }
    }

    /// Stop all background tasks. Also runs on drop.
    pub fn shutdown(&self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
        self.subscriptions.clear();
        for entry in self.periodic.iter() {
            entry.value().abort();
        }
        self.periodic.clear();
    }

    /// Absorb the guest partition into an authenticated owner's partition.
    /// Effectively one-time: the guest partition is emptied afterwards.
    fn merge_guest_partition(&self, owner: &Owner) -> Result<usize> {
        let mut guest = self.cache.read_all(&Owner::Guest)?;
        let guest_tombstones = self.cache.read_pending_tombstones(&Owner::Guest)?;
        if guest.is_empty() && guest_tombstones.is_empty() {
            return Ok(0);
        }

        for record in &mut guest {
            record.ensure_sync_id();
            record.owner = owner.clone();
        }
        let absorbed = guest.len();

        let user_records = self.cache.read_all(owner)?;
        let merged = merge_partitions(user_records, guest);
        self.cache.write_all(owner, merged)?;

        // Deletions queued before sign-in propagate under the new owner.
        for sync_id in guest_tombstones {
            self.cache.append_pending_tombstone(owner, sync_id)?;
        }

        self.cache.write_all(&Owner::Guest, Vec::new())?;
        self.cache.clear_pending_tombstones(&Owner::Guest)?;

        tracing::info!(owner = %owner, absorbed, "guest partition merged");
        Ok(absorbed)
    }
}

impl<C: LocalCache, R: RemoteStore> Drop for SyncOrchestrator<C, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// RAII marker for a running session; removal on drop covers every exit
/// path, including errors.
struct InFlightGuard<'a> {
    slots: &'a DashMap<String, ()>,
    key: String,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(slots: &'a DashMap<String, ()>, key: String) -> Option<Self> {
        match slots.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self { slots, key })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slots.remove(&self.key);
    }
}
