//! Sync configuration.

use std::time::Duration;

use roost_engine::DeviceId;

/// Default pending-lease expiry. Bounds how long a live-subscription update
/// can be suppressed by a mutation whose sync pass silently failed.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(8);

/// Configuration for a [`crate::SyncOrchestrator`].
///
/// Constructed by the embedding application and passed in explicitly; there
/// is no environment or file layer here.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifier for this device, stamped onto tombstones it pushes
    pub device_id: DeviceId,
    /// Pending-operation lease expiry
    pub lease_timeout: Duration,
}

impl SyncConfig {
    /// Config with a fresh random device id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for a known device id.
    pub fn for_device(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }
}
