//! Record mutation API.
//!
//! Every mutation writes the local cache synchronously, so results are
//! visible immediately regardless of connectivity, then schedules a
//! fire-and-forget sync pass for authenticated owners. Callers only ever
//! see cache errors; everything remote is the orchestrator's problem.

use std::collections::HashMap;
use std::sync::Arc;

use roost_engine::{normalize, Owner, Prospect, ProspectStatus, SyncId, Timestamp};

use crate::cache::LocalCache;
use crate::error::{Result, SyncError};
use crate::now_millis;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::RemoteStore;

/// Caller-editable fields of a prospect.
///
/// Identity fields and timestamps are managed by the store and cannot be
/// set through a draft. On update, `None` leaves the field untouched;
/// `appointment` is doubly optional so it can be explicitly cleared.
#[derive(Debug, Clone, Default)]
pub struct ProspectDraft {
    pub zone: Option<String>,
    pub price: Option<i64>,
    pub status: Option<ProspectStatus>,
    pub requirements: Option<Vec<String>>,
    pub comments: Option<String>,
    pub link: Option<String>,
    pub location_link: Option<String>,
    pub contact: Option<String>,
    pub appointment: Option<Option<Timestamp>>,
    pub externally_scheduled: Option<bool>,
}

impl ProspectDraft {
    fn apply(self, record: &mut Prospect) {
        if let Some(zone) = self.zone {
            record.zone = zone;
        }
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(requirements) = self.requirements {
            record.requirements = requirements;
        }
        if let Some(comments) = self.comments {
            record.comments = comments;
        }
        if let Some(link) = self.link {
            record.link = link;
        }
        if let Some(location_link) = self.location_link {
            record.location_link = location_link;
        }
        if let Some(contact) = self.contact {
            record.contact = contact;
        }
        if let Some(appointment) = self.appointment {
            record.appointment = appointment;
        }
        if let Some(externally_scheduled) = self.externally_scheduled {
            record.externally_scheduled = externally_scheduled;
        }
    }
}

/// Aggregate counts over one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: HashMap<ProspectStatus, usize>,
}

/// The application-facing store over one local cache.
///
/// Cheap to clone; all handles share the same cache and orchestrator.
pub struct ProspectStore<C: LocalCache, R: RemoteStore> {
    cache: Arc<C>,
    orchestrator: Arc<SyncOrchestrator<C, R>>,
}

impl<C: LocalCache, R: RemoteStore> Clone for ProspectStore<C, R> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

impl<C: LocalCache, R: RemoteStore> ProspectStore<C, R> {
    /// Build a store over an existing cache and orchestrator. They must
    /// share the same cache instance.
    pub fn new(cache: Arc<C>, orchestrator: Arc<SyncOrchestrator<C, R>>) -> Self {
        Self {
            cache,
            orchestrator,
        }
    }

    /// All records in a partition, in cache order.
    pub fn list(&self, owner: &Owner) -> Result<Vec<Prospect>> {
        Ok(self.cache.read_all(owner)?)
    }

    /// Look up one record by its device-local id.
    pub fn get(&self, owner: &Owner, local_id: &str) -> Result<Option<Prospect>> {
        Ok(self
            .cache
            .read_all(owner)?
            .into_iter()
            .find(|r| r.local_id == local_id))
    }

    /// Create a record from a draft. Returns the stored record, normalized
    /// and with fresh ids.
    pub fn create(&self, owner: &Owner, draft: ProspectDraft) -> Result<Prospect> {
        let mut record = Prospect::new(owner.clone(), now_millis());
        draft.apply(&mut record);
        normalize(&mut record);

        let mut snapshot = self.cache.read_all(owner)?;
        snapshot.push(record.clone());
        self.cache.write_all(owner, snapshot)?;

        self.mark_and_schedule(owner, record.sync_id.as_ref());
        Ok(record)
    }

    /// Apply a draft to an existing record. Identity fields and
    /// `created_at` are preserved; `updated_at` is bumped to now.
    pub fn update(&self, owner: &Owner, local_id: &str, draft: ProspectDraft) -> Result<Prospect> {
        let mut snapshot = self.cache.read_all(owner)?;
        let record = snapshot
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or_else(|| SyncError::NotFound(local_id.to_string()))?;

        draft.apply(record);
        record.touch(now_millis());
        normalize(record);
        let updated = record.clone();

        self.cache.write_all(owner, snapshot)?;

        self.mark_and_schedule(owner, updated.sync_id.as_ref());
        Ok(updated)
    }

    /// Delete a record. Idempotent: deleting an unknown id does nothing.
    ///
    /// The tombstone is queued before the record is removed, so a crash
    /// between the two writes leaves a harmless duplicate tombstone rather
    /// than a deletion other devices never learn about.
    pub fn delete(&self, owner: &Owner, local_id: &str) -> Result<()> {
        let mut snapshot = self.cache.read_all(owner)?;
        let Some(index) = snapshot.iter().position(|r| r.local_id == local_id) else {
            return Ok(());
        };

        let sync_id = snapshot[index].sync_id.clone();
        if let Some(id) = &sync_id {
            self.cache.append_pending_tombstone(owner, id.clone())?;
        }
        // A record that was never pushed needs no tombstone; nothing
        // upstream refers to it.

        snapshot.remove(index);
        self.cache.write_all(owner, snapshot)?;

        self.mark_and_schedule(owner, sync_id.as_ref());
        Ok(())
    }

    /// Replace a partition's contents wholesale, as when restoring from an
    /// exported file. Records are re-stamped with the target owner and
    /// normalized; their timestamps are kept.
    pub fn bulk_import(&self, owner: &Owner, mut records: Vec<Prospect>) -> Result<Vec<Prospect>> {
        for record in &mut records {
            record.owner = owner.clone();
            record.ensure_sync_id();
            normalize(record);
        }
        self.cache.write_all(owner, records.clone())?;

        self.mark_all_and_schedule(owner, &records);
        Ok(records)
    }

    /// Add records to a partition, deduplicating against existing contents
    /// by sync id with the usual merge rules.
    pub fn bulk_append(&self, owner: &Owner, mut records: Vec<Prospect>) -> Result<Vec<Prospect>> {
        for record in &mut records {
            record.owner = owner.clone();
            record.ensure_sync_id();
            normalize(record);
        }

        let existing = self.cache.read_all(owner)?;
        let merged = roost_engine::merge_partitions(existing, records.clone());
        self.cache.write_all(owner, merged.clone())?;

        self.mark_all_and_schedule(owner, &records);
        Ok(merged)
    }

    /// Aggregate counts for a partition.
    pub fn stats(&self, owner: &Owner) -> Result<StoreStats> {
        let records = self.cache.read_all(owner)?;
        let mut stats = StoreStats {
            total: records.len(),
            ..StoreStats::default()
        };
        for record in &records {
            *stats.by_status.entry(record.status).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Lease the mutated record and schedule an upstream pass. Guest
    /// mutations stay local: no lease, no sync.
    fn mark_and_schedule(&self, owner: &Owner, sync_id: Option<&SyncId>) {
        if !owner.is_user() {
            return;
        }
        if let Some(id) = sync_id {
            self.orchestrator.leases().acquire(id.clone());
        }
        if self.orchestrator.is_online() {
            self.orchestrator.spawn_sync(owner);
        }
    }

    fn mark_all_and_schedule(&self, owner: &Owner, records: &[Prospect]) {
        if !owner.is_user() {
            return;
        }
        for record in records {
            if let Some(id) = &record.sync_id {
                self.orchestrator.leases().acquire(id.clone());
            }
        }
        if self.orchestrator.is_online() {
            self.orchestrator.spawn_sync(owner);
        }
    }
}
