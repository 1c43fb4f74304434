//! Type-safe identifier wrappers for simulation entities.
//!
//! Agents, contracts, and trade log entries carry dense index-backed IDs
//! assigned in creation order. Dense IDs keep every ordering decision in
//! the engine reproducible for a fixed seed: sorting by ID equals sorting
//! by creation order, independent of wall clock or process state. The run
//! itself is labeled with a UUID v7 [`RunId`], which identifies report
//! artifacts but never participates in simulation decisions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a dense `u32` index with standard derives.
macro_rules! define_index_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its dense index.
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Return the inner index value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self(index)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_index_id! {
    /// Unique identifier for a factory agent.
    ///
    /// Assigned level by level at world build, so ID order equals lexical
    /// order of the generated agent names.
    AgentId
}

define_index_id! {
    /// Unique identifier for a contract, assigned at registration in
    /// creation order within the run.
    ContractId
}

define_index_id! {
    /// Unique identifier for a trade log entry.
    EntryId
}

/// Unique identifier for a single simulation run.
///
/// UUID v7 (time-ordered) so report files sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new run identifier using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let agent = AgentId::new(0);
        let contract = ContractId::new(0);
        // Different types -- the compiler enforces no mixing.
        assert_eq!(agent.into_inner(), 0);
        assert_eq!(contract.into_inner(), 0);
    }

    #[test]
    fn id_order_matches_index_order() {
        let earlier = AgentId::new(3);
        let later = AgentId::new(7);
        assert!(earlier < later);
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = ContractId::new(42);
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<ContractId, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn run_id_display_matches_uuid() {
        let id = RunId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
