//! File-backed local cache.
//!
//! One records file and one tombstones file per owner partition, each a
//! serialized JSON snapshot. Writes go through a temp file and rename so a
//! crash mid-write never leaves a truncated snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use roost_engine::{Owner, Prospect, SyncId};
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{CacheResult, LocalCache};

/// Durable [`LocalCache`] persisting JSON snapshots under a root directory.
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn records_path(&self, owner: &Owner) -> PathBuf {
        self.root
            .join(format!("{}.records.json", file_key(owner)))
    }

    fn tombstones_path(&self, owner: &Owner) -> PathBuf {
        self.root
            .join(format!("{}.tombstones.json", file_key(owner)))
    }

    fn read_snapshot<T: DeserializeOwned>(&self, path: &Path) -> CacheResult<Vec<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_snapshot<T: Serialize>(&self, path: &Path, items: &[T]) -> CacheResult<()> {
        let bytes = serde_json::to_vec(items)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Owner storage keys contain `:`, which is unsafe in file names.
fn file_key(owner: &Owner) -> String {
    owner.storage_key().replace(':', "_")
}

impl LocalCache for FileCache {
    fn read_all(&self, owner: &Owner) -> CacheResult<Vec<Prospect>> {
        self.read_snapshot(&self.records_path(owner))
    }

    fn write_all(&self, owner: &Owner, records: Vec<Prospect>) -> CacheResult<()> {
        self.write_snapshot(&self.records_path(owner), &records)
    }

    fn read_pending_tombstones(&self, owner: &Owner) -> CacheResult<Vec<SyncId>> {
        self.read_snapshot(&self.tombstones_path(owner))
    }

    fn append_pending_tombstone(&self, owner: &Owner, sync_id: SyncId) -> CacheResult<()> {
        let path = self.tombstones_path(owner);
        let mut queue: Vec<SyncId> = self.read_snapshot(&path)?;
        if !queue.contains(&sync_id) {
            queue.push(sync_id);
            self.write_snapshot(&path, &queue)?;
        }
        Ok(())
    }

    fn clear_pending_tombstones(&self, owner: &Owner) -> CacheResult<()> {
        match fs::remove_file(self.tombstones_path(owner)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
