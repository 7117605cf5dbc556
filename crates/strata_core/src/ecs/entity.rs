//! # Entity Handles
//!
//! Entities are plain 64-bit ids handed out by an
//! [`EntityRegistry`](super::EntityRegistry). They carry no ownership:
//! all component storage belongs to the registry.

use bytemuck::{Pod, Zeroable};

/// Unique identifier for an entity.
///
/// Ids are issued from a monotonically increasing counter and are never
/// recycled by the registry that issued them, so a stale handle can never
/// alias a newer entity. Zero is the null entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Null/invalid entity.
    pub const NULL: Self = Self(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Checks if this is the null entity.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the entity `n` ids after this one.
    ///
    /// Entities created by a single `create` call form a contiguous range,
    /// so `first.offset(i)` addresses the `i`-th entity of the batch.
    #[inline]
    #[must_use]
    pub const fn offset(self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}
