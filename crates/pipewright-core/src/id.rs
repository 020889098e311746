//! Opaque arena identifiers
//!
//! Ids are handed out by the owning graph from a monotonically increasing
//! counter and are never reused.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id value
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw id value
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Identity of a stored (source or virtual) column
    ColumnId,
    "column"
);

arena_id!(
    /// Identity of a component builder
    ComponentId,
    "component"
);

arena_id!(
    /// Identity of a pipeline builder scope
    ScopeId,
    "scope"
);

/// Counter handing out fresh ids
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub fn column(&mut self) -> ColumnId {
        ColumnId(self.bump())
    }

    pub fn component(&mut self) -> ComponentId {
        ComponentId(self.bump())
    }

    pub fn scope(&mut self) -> ScopeId {
        ScopeId(self.bump())
    }
}
