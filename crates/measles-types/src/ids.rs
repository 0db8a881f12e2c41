//! Type-safe identifier wrappers.
//!
//! Agents and patches are addressed by their row in the columnar population
//! store, so their identifiers wrap a plain `u32` index. Mixing an agent
//! index with a patch index is a compile error.
//!
//! A simulation run is identified by a UUID v7 ([`RunId`]) so that logs
//! from several independent runs in the same process can be told apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a `u32` row index with standard derives.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Return the raw `u32` value.
            pub const fn get(self) -> u32 {
                self.0
            }

            /// Return the value as a `usize` suitable for slice lookups.
            pub fn index(self) -> usize {
                usize::try_from(self.0).unwrap_or(usize::MAX)
            }

            /// Build an identifier from a slice position.
            ///
            /// Returns `None` if the position does not fit in a `u32`.
            pub fn from_index(index: usize) -> Option<Self> {
                u32::try_from(index).ok().map(Self)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_index! {
    /// Row of an agent in the population store.
    AgentId
}

define_index! {
    /// Row of a spatial patch.
    PatchId
}

/// Unique identifier for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new run identifier using UUID v7 (time-ordered).
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
    fn index_round_trips_through_usize() {
        let id = AgentId::from_index(12).unwrap_or(AgentId(0));
        assert_eq!(id, AgentId(12));
        assert_eq!(id.index(), 12);
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&PatchId(3)).unwrap_or_default();
        assert_eq!(json, "3");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
