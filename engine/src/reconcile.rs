//! Reconciliation logic for merging local and remote snapshots.
//!
//! This is the heart of the sync engine. All functions here are pure: they
//! read nothing but their arguments and touch no storage, so every merge
//! rule can be tested in isolation.
//!
//! # Algorithm
//!
//! 1. Seed an ordered map with every local record, keyed by sync id
//! 2. Fold in remote records: insert if absent, otherwise keep whichever
//!    copy has the strictly greater `updated_at` (ties keep local)
//! 3. Apply remote tombstones last, so a deletion wins over any stale copy
//!    the merge resurrected, regardless of timestamps
//!
//! [`identify_local_changes`] is the separate upstream diff: it compares
//! the local snapshot against the *raw* remote snapshot (never the merged
//! result, which would hide genuinely-local changes) and classifies each
//! record as create, update, or delete.

use crate::{
    error::{Error, Result},
    record::Prospect,
    tombstone::Tombstone,
    SyncId,
};
use std::collections::{btree_map::Entry, BTreeMap, HashMap, HashSet};

/// What a device must push upstream after a pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Local records with no remote counterpart
    pub to_create: Vec<Prospect>,
    /// Local records strictly newer than their remote counterpart
    pub to_update: Vec<Prospect>,
    /// Sync ids queued for deletion, regardless of merge outcome
    pub to_delete: Vec<SyncId>,
}

impl ChangeSet {
    /// True when nothing needs to be pushed.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Merge a local and a remote snapshot into the final record set.
///
/// Last-write-wins by `updated_at`, local wins ties, remote tombstones are
/// terminal. Local records without a sync id pass through untouched (they
/// have never been pushed, so nothing remote can refer to them); remote
/// records without one are skipped as malformed rather than aborting the
/// whole pass.
pub fn reconcile(
    local: Vec<Prospect>,
    remote: Vec<Prospect>,
    remote_tombstones: &[Tombstone],
) -> Vec<Prospect> {
    let mut merged: BTreeMap<SyncId, Prospect> = BTreeMap::new();
    let mut unkeyed: Vec<Prospect> = Vec::new();

    for record in local {
        match record.sync_id.clone() {
            Some(id) => {
                merged.insert(id, record);
            }
            None => unkeyed.push(record),
        }
    }

    for record in remote {
        // No merge key means the remote row is malformed; skip it.
        let Some(id) = record.sync_id.clone() else {
            continue;
        };
        match merged.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.is_newer_than(slot.get()) {
                    slot.insert(record);
                }
            }
        }
    }

    // Tombstones apply after the merge: deletion is terminal, not subject
    // to last-write-wins.
    let deleted: HashSet<&SyncId> = remote_tombstones.iter().map(|t| &t.sync_id).collect();

    let mut result: Vec<Prospect> = merged
        .into_iter()
        .filter(|(id, _)| !deleted.contains(id))
        .map(|(_, record)| record)
        .collect();
    result.append(&mut unkeyed);
    result
}

/// Compute the upstream diff between the local snapshot and the remote
/// snapshot actually pulled.
///
/// `pending_tombstones` are the device's own queued deletions; their ids
/// always land in `to_delete`, and a record that was both edited and
/// deleted in the same session is only deleted - never re-pushed.
///
/// Returns [`Error::MissingSyncId`] if a local record reaches this point
/// without a sync id; the orchestrator assigns ids before snapshotting, so
/// hitting this means the push invariant was violated.
pub fn identify_local_changes(
    local: &[Prospect],
    remote: &[Prospect],
    pending_tombstones: &[SyncId],
) -> Result<ChangeSet> {
    let remote_by_id: HashMap<&SyncId, &Prospect> = remote
        .iter()
        .filter_map(|r| r.sync_id.as_ref().map(|id| (id, r)))
        .collect();
    let pending: HashSet<&SyncId> = pending_tombstones.iter().collect();

    let mut changes = ChangeSet {
        to_delete: pending_tombstones.to_vec(),
        ..ChangeSet::default()
    };

    for record in local {
        let id = record
            .sync_id
            .as_ref()
            .ok_or_else(|| Error::MissingSyncId(record.local_id.clone()))?;

        // Deletion wins over a same-session edit.
        if pending.contains(id) {
            continue;
        }

        match remote_by_id.get(id) {
            None => changes.to_create.push(record.clone()),
            Some(counterpart) if record.is_newer_than(counterpart) => {
                changes.to_update.push(record.clone());
            }
            // Unchanged or older: the remote copy is authoritative and the
            // merge already pulled it in.
            Some(_) => {}
        }
    }

    Ok(changes)
}

/// One-time absorption of one partition into another, used when the guest
/// partition is merged into a user's on first authenticated sync.
///
/// Dedup by sync id with the same rules as [`reconcile`]: strictly newer
/// wins, the primary partition wins ties. Records without a sync id from
/// either side are kept as-is.
pub fn merge_partitions(primary: Vec<Prospect>, incoming: Vec<Prospect>) -> Vec<Prospect> {
    reconcile(primary, incoming, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::Owner;

    fn record(sync_id: &str, updated_at: i64) -> Prospect {
        let mut r = Prospect::new(Owner::user("alice"), 1000);
        r.sync_id = Some(sync_id.to_string());
        r.updated_at = updated_at;
        r
    }

    fn named(sync_id: &str, zone: &str, updated_at: i64) -> Prospect {
        let mut r = record(sync_id, updated_at);
        r.zone = zone.to_string();
        r
    }

    #[test]
    fn reconcile_is_identity_without_remote_data() {
        let local = vec![record("a", 1000), record("b", 2000)];
        let result = reconcile(local.clone(), vec![], &[]);
        assert_eq!(result, local);
    }

    #[test]
    fn remote_record_absent_locally_is_inserted() {
        let local = vec![record("a", 1000)];
        let remote = vec![record("b", 1500)];

        let result = reconcile(local, remote, &[]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn newer_remote_wins() {
        let local = vec![named("a", "stale", 1000)];
        let remote = vec![named("a", "fresh", 2000)];

        let result = reconcile(local, remote, &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].zone, "fresh");
    }

    #[test]
    fn newer_local_wins() {
        let local = vec![named("a", "fresh", 2000)];
        let remote = vec![named("a", "stale", 1000)];

        let result = reconcile(local, remote, &[]);
        assert_eq!(result[0].zone, "fresh");
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let local = vec![named("a", "local", 1500)];
        let remote = vec![named("a", "remote", 1500)];

        let result = reconcile(local, remote, &[]);
        assert_eq!(result[0].zone, "local");
    }

    #[test]
    fn tombstone_wins_over_newer_record() {
        // Record updated at T2, tombstone from T1 < T2: deletion still wins.
        let local = vec![record("a", 5000)];
        let tombstones = vec![Tombstone::new("a", 1000, "device-b")];

        let result = reconcile(local, vec![], &tombstones);
        assert!(result.is_empty());
    }

    #[test]
    fn tombstone_removes_record_resurrected_by_merge() {
        let local = vec![record("a", 1000)];
        let remote = vec![record("a", 9000)];
        let tombstones = vec![Tombstone::new("a", 2000, "device-b")];

        let result = reconcile(local, remote, &tombstones);
        assert!(result.is_empty());
    }

    #[test]
    fn tombstone_for_unknown_id_is_harmless() {
        let local = vec![record("a", 1000)];
        let tombstones = vec![Tombstone::new("ghost", 2000, "device-b")];

        let result = reconcile(local, vec![], &tombstones);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn malformed_remote_record_is_skipped() {
        let mut broken = record("ignored", 3000);
        broken.sync_id = None;

        let result = reconcile(vec![record("a", 1000)], vec![broken], &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].sync_id.as_deref(), Some("a"));
    }

    #[test]
    fn unkeyed_local_records_pass_through() {
        let mut legacy = Prospect::new(Owner::Guest, 1000);
        legacy.sync_id = None;

        let result = reconcile(vec![legacy.clone()], vec![record("a", 2000)], &[]);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&legacy));
    }

    #[test]
    fn identify_classifies_creates_updates_and_skips() {
        let local = vec![
            named("only-local", "new", 1000),
            named("edited", "newer", 3000),
            named("stale", "older", 1000),
            named("same", "tie", 2000),
        ];
        let remote = vec![
            named("edited", "old", 2000),
            named("stale", "fresh", 5000),
            named("same", "tie", 2000),
        ];

        let changes = identify_local_changes(&local, &remote, &[]).unwrap();

        assert_eq!(changes.to_create.len(), 1);
        assert_eq!(changes.to_create[0].sync_id.as_deref(), Some("only-local"));
        assert_eq!(changes.to_update.len(), 1);
        assert_eq!(changes.to_update[0].sync_id.as_deref(), Some("edited"));
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn pending_tombstone_beats_same_session_edit() {
        // Edited locally to a newer timestamp AND deleted locally:
        // the deletion wins and the edit is never pushed.
        let local = vec![named("a", "edited", 9000)];
        let remote = vec![named("a", "remote", 1000)];
        let pending = vec!["a".to_string()];

        let changes = identify_local_changes(&local, &remote, &pending).unwrap();

        assert!(changes.to_create.is_empty());
        assert!(changes.to_update.is_empty());
        assert_eq!(changes.to_delete, vec!["a".to_string()]);
    }

    #[test]
    fn pending_tombstones_always_deleted_even_when_record_is_gone() {
        // The record was already removed from the local snapshot; the
        // queued tombstone must still be pushed.
        let changes = identify_local_changes(&[], &[], &["gone".to_string()]).unwrap();
        assert_eq!(changes.to_delete, vec!["gone".to_string()]);
        assert!(!changes.is_empty());
    }

    #[test]
    fn missing_sync_id_is_an_error() {
        let mut legacy = Prospect::new(Owner::Guest, 1000);
        legacy.sync_id = None;

        let err = identify_local_changes(&[legacy.clone()], &[], &[]).unwrap_err();
        assert_eq!(err, Error::MissingSyncId(legacy.local_id));
    }

    #[test]
    fn round_trip_produces_no_spurious_pushes() {
        let local = vec![named("a", "x", 1000), named("b", "y", 2000)];
        let remote = local.clone();

        let merged = reconcile(local, remote.clone(), &[]);
        let changes = identify_local_changes(&merged, &remote, &[]).unwrap();

        assert!(changes.is_empty());
    }

    #[test]
    fn merge_partitions_dedups_by_sync_id() {
        let user = vec![named("a", "user-copy", 2000)];
        let guest = vec![named("a", "guest-copy", 1000), named("b", "guest-only", 500)];

        let result = merge_partitions(user, guest);

        assert_eq!(result.len(), 2);
        let a = result
            .iter()
            .find(|r| r.sync_id.as_deref() == Some("a"))
            .unwrap();
        assert_eq!(a.zone, "user-copy");
    }

    #[test]
    fn merge_partitions_newer_guest_copy_wins() {
        let user = vec![named("a", "user-copy", 1000)];
        let guest = vec![named("a", "guest-copy", 3000)];

        let result = merge_partitions(user, guest);
        assert_eq!(result[0].zone, "guest-copy");
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_record() -> impl Strategy<Value = Prospect> {
            ("[a-f]{1}", 0i64..10_000).prop_map(|(id, updated_at)| {
                let mut r = record(&id, updated_at);
                r.zone = format!("zone-{updated_at}");
                r
            })
        }

        fn arb_snapshot() -> impl Strategy<Value = Vec<Prospect>> {
            prop::collection::vec(arb_record(), 0..8).prop_map(|records| {
                // One record per sync id within a snapshot, like a real cache.
                let mut seen = HashSet::new();
                records
                    .into_iter()
                    .filter(|r| seen.insert(r.sync_id.clone()))
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_reconcile_deterministic(
                local in arb_snapshot(),
                remote in arb_snapshot(),
            ) {
                let first = reconcile(local.clone(), remote.clone(), &[]);
                let second = reconcile(local, remote, &[]);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn prop_reconcile_idempotent_over_empty_remote(local in arb_snapshot()) {
                let result = reconcile(local.clone(), vec![], &[]);
                prop_assert_eq!(result.len(), local.len());
                for record in &local {
                    prop_assert!(result.contains(record));
                }
            }

            #[test]
            fn prop_winner_has_max_timestamp(
                local in arb_snapshot(),
                remote in arb_snapshot(),
            ) {
                let result = reconcile(local.clone(), remote.clone(), &[]);
                for winner in &result {
                    let id = winner.sync_id.as_ref().unwrap();
                    let max_seen = local
                        .iter()
                        .chain(remote.iter())
                        .filter(|r| r.sync_id.as_ref() == Some(id))
                        .map(|r| r.updated_at)
                        .max()
                        .unwrap();
                    prop_assert_eq!(winner.updated_at, max_seen);
                }
            }

            #[test]
            fn prop_tombstoned_ids_never_survive(
                local in arb_snapshot(),
                remote in arb_snapshot(),
                dead_id in "[a-f]{1}",
            ) {
                let tombstones = vec![Tombstone::new(dead_id.clone(), 0, "device-x")];
                let result = reconcile(local, remote, &tombstones);
                prop_assert!(result
                    .iter()
                    .all(|r| r.sync_id.as_deref() != Some(dead_id.as_str())));
            }

            #[test]
            fn prop_round_trip_is_quiet(snapshot in arb_snapshot()) {
                let merged = reconcile(snapshot.clone(), snapshot.clone(), &[]);
                let changes = identify_local_changes(&merged, &snapshot, &[]).unwrap();
                prop_assert!(changes.is_empty());
            }
        }
    }
}
