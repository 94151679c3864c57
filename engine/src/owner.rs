//! Owner partitions.
//!
//! Every record and tombstone is scoped to one owner. Besides authenticated
//! users there is a distinguished guest partition for data captured before
//! sign-in; it is absorbed into the user's partition on the first
//! authenticated sync.

use serde::{Deserialize, Serialize};

/// The partition a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    /// The unauthenticated partition. Never synced upstream.
    Guest,
    /// An authenticated user's partition.
    User(String),
}

impl Owner {
    /// Shorthand for an authenticated owner.
    pub fn user(id: impl Into<String>) -> Self {
        Owner::User(id.into())
    }

    /// Whether this partition belongs to an authenticated user.
    pub fn is_user(&self) -> bool {
        matches!(self, Owner::User(_))
    }

    /// Stable key used to namespace cache partitions and per-owner sync
    /// state. Must never collide between guest and user partitions.
    pub fn storage_key(&self) -> String {
        match self {
            Owner::Guest => "guest".to_string(),
            Owner::User(id) => format!("user:{id}"),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_distinct() {
        assert_eq!(Owner::Guest.storage_key(), "guest");
        assert_eq!(Owner::user("alice").storage_key(), "user:alice");
        assert_ne!(
            Owner::user("guest").storage_key(),
            Owner::Guest.storage_key()
        );
    }

    #[test]
    fn is_user() {
        assert!(!Owner::Guest.is_user());
        assert!(Owner::user("bob").is_user());
    }

    #[test]
    fn serialization_roundtrip() {
        let owner = Owner::user("alice");
        let json = serde_json::to_string(&owner).unwrap();
        let parsed: Owner = serde_json::from_str(&json).unwrap();
        assert_eq!(owner, parsed);

        let json = serde_json::to_string(&Owner::Guest).unwrap();
        let parsed: Owner = serde_json::from_str(&json).unwrap();
        assert_eq!(Owner::Guest, parsed);
    }
}
