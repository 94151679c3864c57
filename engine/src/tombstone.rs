//! Durable deletion markers.

use crate::{DeviceId, SyncId, Timestamp};
use serde::{Deserialize, Serialize};

/// A record deletion, pending confirmation on every device.
///
/// Removing the remote row alone is not enough: a device that syncs later
/// would never learn the record was deleted. The tombstone is pushed as a
/// durable row in its own right and applied after merging, so it wins over
/// any stale copy regardless of timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Sync id of the deleted record
    pub sync_id: SyncId,
    /// When the deletion happened (milliseconds since epoch)
    pub deleted_at: Timestamp,
    /// Device that performed the deletion, so a device does not re-import
    /// its own deletion as a missing record
    pub origin_device: DeviceId,
}

impl Tombstone {
    /// Create a new tombstone.
    pub fn new(
        sync_id: impl Into<SyncId>,
        deleted_at: Timestamp,
        origin_device: impl Into<DeviceId>,
    ) -> Self {
        Self {
            sync_id: sync_id.into(),
            deleted_at,
            origin_device: origin_device.into(),
        }
    }
}
