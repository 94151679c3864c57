//! Record types for property prospects.

use crate::{owner::Owner, LocalId, SyncId, Timestamp};
use serde::{Deserialize, Serialize};

/// Where a prospect currently stands in the rental pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProspectStatus {
    /// Just captured, nothing done yet (default)
    #[default]
    New,
    /// Marked as worth pursuing
    Shortlisted,
    /// Landlord or agency contacted
    Contacted,
    /// Waiting for a reply to an inquiry
    AwaitingReply,
    /// A viewing has been scheduled
    ViewingScheduled,
    /// Viewing took place
    Viewed,
    /// Application submitted
    Applied,
    /// An offer was made
    OfferMade,
    /// Application approved
    Approved,
    /// Application rejected
    Rejected,
    /// Withdrawn by the user
    Withdrawn,
    /// Paused, not actively pursued
    OnHold,
    /// Lease signed
    Leased,
    /// Kept for reference only
    Archived,
}

/// A rental property prospect.
///
/// Identity is split in two: `local_id` never leaves the device, `sync_id`
/// is the cross-device merge key. `updated_at` alone decides conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    /// Identifier stable within one device's cache; generated once, never reused
    pub local_id: LocalId,
    /// Cross-device identifier, immutable once assigned. `None` only for
    /// records created before the field existed.
    #[serde(default)]
    pub sync_id: Option<SyncId>,
    /// Partition this record belongs to
    pub owner: Owner,
    /// Neighbourhood / area
    #[serde(default)]
    pub zone: String,
    /// Monthly rent; 0 when unknown
    #[serde(default)]
    pub price: i64,
    /// Pipeline status
    #[serde(default)]
    pub status: ProspectStatus,
    /// Ordered list of requirements (deposit, guarantor, ...)
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Free-text notes
    #[serde(default)]
    pub comments: String,
    /// External listing link
    #[serde(default)]
    pub link: String,
    /// External map / location link
    #[serde(default)]
    pub location_link: String,
    /// Contact handle (phone, email, messenger)
    #[serde(default)]
    pub contact: String,
    /// Scheduled viewing, if any (milliseconds since epoch)
    #[serde(default)]
    pub appointment: Option<Timestamp>,
    /// Whether the viewing was booked through an external system
    #[serde(default)]
    pub externally_scheduled: bool,
    /// When the record was first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the record was last updated; the sole conflict authority
    pub updated_at: Timestamp,
}

impl Prospect {
    /// Create an empty prospect in the given partition, with fresh ids and
    /// both timestamps set to `now`.
    pub fn new(owner: Owner, now: Timestamp) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            sync_id: Some(uuid::Uuid::new_v4().to_string()),
            owner,
            zone: String::new(),
            price: 0,
            status: ProspectStatus::default(),
            requirements: Vec::new(),
            comments: String::new(),
            link: String::new(),
            location_link: String::new(),
            contact: String::new(),
            appointment: None,
            externally_scheduled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lazily assign a sync id to a record that predates the field.
    ///
    /// Returns `true` if an id was assigned. Existing ids are never
    /// replaced - the sync id is immutable once set.
    pub fn ensure_sync_id(&mut self) -> bool {
        if self.sync_id.is_none() {
            self.sync_id = Some(uuid::Uuid::new_v4().to_string());
            true
        } else {
            false
        }
    }

    /// Bump `updated_at` after a modification.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    /// Strictly-newer comparison used for last-write-wins merging.
    /// Equal timestamps are not "newer" - ties keep the existing copy.
    pub fn is_newer_than(&self, other: &Prospect) -> bool {
        self.updated_at > other.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_prospect_has_ids_and_defaults() {
        let record = Prospect::new(Owner::user("alice"), 1000);

        assert!(!record.local_id.is_empty());
        assert!(record.sync_id.is_some());
        assert_eq!(record.price, 0);
        assert_eq!(record.status, ProspectStatus::New);
        assert!(record.requirements.is_empty());
        assert_eq!(record.created_at, 1000);
        assert_eq!(record.updated_at, 1000);
    }

    #[test]
    fn ensure_sync_id_assigns_once() {
        let mut record = Prospect::new(Owner::Guest, 1000);
        record.sync_id = None;

        assert!(record.ensure_sync_id());
        let assigned = record.sync_id.clone();
        assert!(assigned.is_some());

        // A second call must not replace the id
        assert!(!record.ensure_sync_id());
        assert_eq!(record.sync_id, assigned);
    }

    #[test]
    fn touch_updates_timestamp() {
        let mut record = Prospect::new(Owner::Guest, 1000);
        record.touch(2000);
        assert_eq!(record.updated_at, 2000);
        assert_eq!(record.created_at, 1000);
    }

    #[test]
    fn newer_is_strict() {
        let older = Prospect::new(Owner::Guest, 1000);
        let mut newer = Prospect::new(Owner::Guest, 1000);
        newer.touch(2000);

        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));

        let tie = Prospect::new(Owner::Guest, 1000);
        assert!(!tie.is_newer_than(&older));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut record = Prospect::new(Owner::user("alice"), 1000);
        record.zone = "Kreuzberg".to_string();
        record.price = 1450;
        record.status = ProspectStatus::ViewingScheduled;
        record.requirements = vec!["3 payslips".to_string(), "guarantor".to_string()];
        record.appointment = Some(1_706_745_600_000);

        let json = serde_json::to_string(&record).unwrap();
        let parsed: Prospect = serde_json::from_str(&json).unwrap();

        assert_eq!(record, parsed);
    }

    #[test]
    fn serialization_format() {
        let record = Prospect::new(Owner::Guest, 1000);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("localId")); // camelCase
        assert!(json.contains("syncId"));
        assert!(json.contains("updatedAt"));
    }

    #[test]
    fn deserializes_legacy_record_without_sync_id() {
        // Records written before the sync id existed carry no field at all.
        let json = r#"{
            "localId": "legacy-1",
            "owner": {"kind": "guest"},
            "zone": "Mitte",
            "createdAt": 500,
            "updatedAt": 500
        }"#;

        let parsed: Prospect = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.sync_id, None);
        assert_eq!(parsed.price, 0);
        assert_eq!(parsed.status, ProspectStatus::New);
        assert!(parsed.requirements.is_empty());
    }
}
