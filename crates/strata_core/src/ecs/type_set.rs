//! # Type Sets
//!
//! Fixed-capacity bitsets over component or tag handles. A pair of them
//! ([`ComponentAndTagSets`]) is the structural key of an archetype and the
//! include/exclude filter of a query.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::types::{ComponentType, TagType, TypeHandle, MAX_COMPONENT_TYPES};

const WORDS: usize = MAX_COMPONENT_TYPES / 64;

/// A set of type handles of one kind.
pub struct TypeSet<H> {
    bits: [u64; WORDS],
    _kind: PhantomData<H>,
}

/// Set of component types.
pub type ComponentSet = TypeSet<ComponentType>;

/// Set of tag types.
pub type TagSet = TypeSet<TagType>;

impl<H: TypeHandle> TypeSet<H> {
    /// The empty set.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: [0; WORDS],
            _kind: PhantomData,
        }
    }

    /// Adds a handle.
    #[inline]
    pub fn add(&mut self, handle: H) {
        let index = handle.index();
        self.bits[index / 64] |= 1 << (index % 64);
    }

    /// Adds every handle of `other` (in-place union).
    #[inline]
    pub fn add_set(&mut self, other: &Self) {
        for (word, other) in self.bits.iter_mut().zip(other.bits) {
            *word |= other;
        }
    }

    /// Removes a handle.
    #[inline]
    pub fn remove(&mut self, handle: H) {
        let index = handle.index();
        self.bits[index / 64] &= !(1 << (index % 64));
    }

    /// Removes every handle of `other`.
    #[inline]
    pub fn remove_set(&mut self, other: &Self) {
        for (word, other) in self.bits.iter_mut().zip(other.bits) {
            *word &= !other;
        }
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        let index = handle.index();
        self.bits[index / 64] & (1 << (index % 64)) != 0
    }

    /// Checks that every handle of `other` is in `self`.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.intersection(other) == *other
    }

    /// Checks that `self` and `other` share at least one handle.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.bits.iter().zip(other.bits).any(|(a, b)| a & b != 0)
    }

    /// Handles present in both sets.
    #[inline]
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = *self;
        for (word, other) in result.bits.iter_mut().zip(other.bits) {
            *word &= other;
        }
        result
    }

    /// Handles present in either set.
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = *self;
        result.add_set(other);
        result
    }

    /// Checks if the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Number of handles in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates the handles in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = H> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_index, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(H::from_index(word_index * 64 + bit))
            })
        })
    }
}

impl<H: TypeHandle> FromIterator<H> for TypeSet<H> {
    fn from_iter<I: IntoIterator<Item = H>>(iter: I) -> Self {
        let mut set = Self::new();
        for handle in iter {
            set.add(handle);
        }
        set
    }
}

// Manual impls: deriving would put bounds on the `H` marker.

impl<H> Clone for TypeSet<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for TypeSet<H> {}

impl<H> PartialEq for TypeSet<H> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<H> Eq for TypeSet<H> {}

impl<H> Hash for TypeSet<H> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.bits.hash(state);
    }
}

impl<H: TypeHandle> Default for TypeSet<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: TypeHandle> fmt::Debug for TypeSet<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(TypeHandle::index)).finish()
    }
}

/// Components plus tags: the signature of an archetype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentAndTagSets {
    /// Component part. Decides the physical layout.
    pub components: ComponentSet,
    /// Tag part. Matched by queries, never stored.
    pub tags: TagSet,
}

impl ComponentAndTagSets {
    /// Empty signature.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            components: TypeSet::new(),
            tags: TypeSet::new(),
        }
    }

    /// Builds a signature from component and tag handles.
    #[must_use]
    pub fn from_handles(
        components: impl IntoIterator<Item = ComponentType>,
        tags: impl IntoIterator<Item = TagType>,
    ) -> Self {
        Self {
            components: components.into_iter().collect(),
            tags: tags.into_iter().collect(),
        }
    }

    /// Adds a component, builder style.
    #[must_use]
    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.components.add(component);
        self
    }

    /// Adds a tag, builder style.
    #[must_use]
    pub fn with_tag(mut self, tag: TagType) -> Self {
        self.tags.add(tag);
        self
    }

    /// In-place union with `other`.
    pub fn add(&mut self, other: &Self) {
        self.components.add_set(&other.components);
        self.tags.add_set(&other.tags);
    }

    /// In-place difference with `other`.
    pub fn remove(&mut self, other: &Self) {
        self.components.remove_set(&other.components);
        self.tags.remove_set(&other.tags);
    }

    /// Checks that both parts of `other` are contained in `self`.
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.components.contains_all(&other.components) && self.tags.contains_all(&other.tags)
    }

    /// Checks whether any component or tag of `other` is in `self`.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.components.intersects(&other.components) || self.tags.intersects(&other.tags)
    }

    /// Checks if both parts are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }
}
