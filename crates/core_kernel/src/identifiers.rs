//! Strongly-typed identifiers for synchronized entities
//!
//! Newtype wrappers keep order identifiers, CRM record ids and run ids from
//! being mixed up. CRM ids are the remote system's integer keys; order ids
//! are whatever the shop uses and are kept as opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_crm_id {
    ($name:ident, $entity:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw CRM identifier
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw CRM identifier
            pub fn get(&self) -> i64 {
                self.0
            }

            /// Name of the CRM entity this id refers to
            pub fn entity() -> &'static str {
                $entity
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

define_crm_id!(CrmContactId, "Contact");
define_crm_id!(CrmContributionId, "Contribution");

/// Identifier of a shop order, as handed over by the calling platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is blank and cannot key a sync record
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Correlation id for one synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Creates a new time-ordered identifier (v7)
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new_v7()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYNC-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crm_id_parsing() {
        let id: CrmContactId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(CrmContactId::entity(), "Contact");
    }

    #[test]
    fn test_crm_id_serializes_as_number() {
        let json = serde_json::to_string(&CrmContributionId::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_order_id_from_number() {
        let id = OrderId::from(1234u64);
        assert_eq!(id.as_str(), "1234");
        assert!(!id.is_blank());
        assert!(OrderId::new("  ").is_blank());
    }

    #[test]
    fn test_sync_run_id_display() {
        assert!(SyncRunId::new_v7().to_string().starts_with("SYNC-"));
    }
}
