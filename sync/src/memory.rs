//! In-memory cache and remote store.
//!
//! `MemoryCache` backs the guest partition and tests. `MemoryRemote` is a
//! full in-process implementation of the remote contract with subscriber
//! fan-out and failure injection, so multi-device scenarios can run in one
//! test without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use roost_engine::{Owner, Prospect, SyncId, Timestamp, Tombstone};

use crate::cache::{CacheResult, LocalCache};
use crate::remote::{RemoteError, RemoteResult, RemoteStore, SubscriptionFeed};

/// In-memory [`LocalCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: DashMap<String, Vec<Prospect>>,
    tombstones: DashMap<String, Vec<SyncId>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn read_all(&self, owner: &Owner) -> CacheResult<Vec<Prospect>> {
        Ok(self
            .records
            .get(&owner.storage_key())
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    fn write_all(&self, owner: &Owner, records: Vec<Prospect>) -> CacheResult<()> {
        self.records.insert(owner.storage_key(), records);
        Ok(())
    }

    fn read_pending_tombstones(&self, owner: &Owner) -> CacheResult<Vec<SyncId>> {
        Ok(self
            .tombstones
            .get(&owner.storage_key())
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    fn append_pending_tombstone(&self, owner: &Owner, sync_id: SyncId) -> CacheResult<()> {
        let mut queue = self.tombstones.entry(owner.storage_key()).or_default();
        if !queue.contains(&sync_id) {
            queue.push(sync_id);
        }
        Ok(())
    }

    fn clear_pending_tombstones(&self, owner: &Owner) -> CacheResult<()> {
        self.tombstones.remove(&owner.storage_key());
        Ok(())
    }
}

/// Shared state behind every handle of a [`MemoryRemote`].
#[derive(Debug, Default)]
struct RemoteState {
    records: DashMap<String, HashMap<SyncId, Prospect>>,
    tombstones: DashMap<String, Vec<Tombstone>>,
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Vec<Prospect>>>>,
    fail_writes: AtomicBool,
}

/// In-process [`RemoteStore`].
///
/// Clones are cheap handles over the same shared backend; give each
/// simulated device its own clone and the two-device tests fall out.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<RemoteState>,
}

impl MemoryRemote {
    /// Create a fresh, empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every batch write fail with [`RemoteError::Unavailable`] until
    /// turned off again. Used to test failed-push retry behavior.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of records currently stored for a partition.
    pub fn record_count(&self, owner: &Owner) -> usize {
        self.inner
            .records
            .get(&owner.storage_key())
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Direct read of a record, bypassing the sync path. Test helper.
    pub fn get(&self, owner: &Owner, sync_id: &str) -> Option<Prospect> {
        self.inner
            .records
            .get(&owner.storage_key())
            .and_then(|p| p.get(sync_id).cloned())
    }

    fn check_writable(&self) -> RemoteResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    /// Push the full current record set to every live subscriber of the
    /// partition, dropping subscribers whose receiver is gone.
    fn notify(&self, owner: &Owner) {
        let key = owner.storage_key();
        let snapshot: Vec<Prospect> = self
            .inner
            .records
            .get(&key)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();

        if let Some(mut senders) = self.inner.subscribers.get_mut(&key) {
            senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_all(&self, owner: &Owner) -> RemoteResult<Vec<Prospect>> {
        Ok(self
            .inner
            .records
            .get(&owner.storage_key())
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_modified_since(
        &self,
        owner: &Owner,
        since: Timestamp,
    ) -> RemoteResult<Vec<Prospect>> {
        // Inclusive boundary: a record stamped exactly at a sync window must
        // still be visible to the next pass.
        Ok(self
            .inner
            .records
            .get(&owner.storage_key())
            .map(|p| {
                p.values()
                    .filter(|r| r.updated_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_tombstones(&self, owner: &Owner) -> RemoteResult<Vec<Tombstone>> {
        Ok(self
            .inner
            .tombstones
            .get(&owner.storage_key())
            .map(|t| t.clone())
            .unwrap_or_default())
    }

    async fn fetch_tombstones_modified_since(
        &self,
        owner: &Owner,
        since: Timestamp,
    ) -> RemoteResult<Vec<Tombstone>> {
        Ok(self
            .inner
            .tombstones
            .get(&owner.storage_key())
            .map(|t| {
                t.iter()
                    .filter(|tomb| tomb.deleted_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_create(&self, owner: &Owner, records: Vec<Prospect>) -> RemoteResult<()> {
        self.check_writable()?;
        {
            let mut partition = self.inner.records.entry(owner.storage_key()).or_default();
            for record in records {
                let Some(id) = record.sync_id.clone() else {
                    return Err(RemoteError::Rejected(format!(
                        "record {} has no sync id",
                        record.local_id
                    )));
                };
                partition.insert(id, record);
            }
        }
        self.notify(owner);
        Ok(())
    }

    async fn batch_update(&self, owner: &Owner, records: Vec<Prospect>) -> RemoteResult<()> {
        // Full-replacement writes; create and update share the same shape here.
        self.batch_create(owner, records).await
    }

    async fn batch_delete(&self, owner: &Owner, tombstones: Vec<Tombstone>) -> RemoteResult<()> {
        self.check_writable()?;
        {
            let key = owner.storage_key();
            let mut stored = self.inner.tombstones.entry(key.clone()).or_default();
            let mut partition = self.inner.records.entry(key).or_default();
            for tombstone in tombstones {
                partition.remove(&tombstone.sync_id);
                // The tombstone row outlives the record row.
                stored.push(tombstone);
            }
        }
        self.notify(owner);
        Ok(())
    }

    async fn subscribe(&self, owner: &Owner) -> RemoteResult<SubscriptionFeed> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .entry(owner.storage_key())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
