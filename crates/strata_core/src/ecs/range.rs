//! # Ranges
//!
//! Typed, chunk-at-a-time queries over an [`EntityRegistry`].
//!
//! A range selects every archetype holding the requested components (plus
//! extra `with` types, minus `exclude` types) and hands out whole columns
//! per chunk. Column slices come in the order the query declared them,
//! whatever the handle order.
//!
//! ```rust,ignore
//! registry.range_mut::<(Position, Velocity)>()?.for_each_chunk(|mut chunk| {
//!     let (positions, velocities) = chunk.columns();
//!     for (p, v) in positions.iter_mut().zip(velocities.iter()) {
//!         p.x += v.x;
//!     }
//!     chunk.notify();
//! });
//! ```

// SAFETY: Column pointers come from the archetype layout of the visited
// chunk; row counts come from the same chunk.
#![allow(unsafe_code)]

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;

use super::archetype::ArchetypeId;
use super::entity::Entity;
use super::registry::EntityRegistry;
use super::tuple::{ComponentTuple, TypeList, MAX_TUPLE_LEN};
use super::type_registry::TypeRegistry;
use super::type_set::ComponentAndTagSets;
use super::types::ComponentType;
use crate::error::{EcsError, EcsResult};

/// Matching rules shared by shared and mutable ranges.
#[derive(Clone, Copy, Debug)]
struct Filter {
    include: ComponentAndTagSets,
    exclude: ComponentAndTagSets,
    /// Query components, sorted ascending.
    sorted: [ComponentType; MAX_TUPLE_LEN],
    /// `sorted[i]` is query element `mapping[i]`.
    mapping: [u8; MAX_TUPLE_LEN],
    len: usize,
    /// Only chunks stamped at or after this id.
    since: Option<u64>,
}

impl Filter {
    fn new<Q: ComponentTuple>(types: &TypeRegistry) -> EcsResult<Self> {
        let len = Q::LEN;
        let mut sorted = [ComponentType::from_value(0); MAX_TUPLE_LEN];
        let mut mapping = [0u8; MAX_TUPLE_LEN];

        Q::component_types(types, &mut sorted[..len])?;
        EntityRegistry::sort_and_map(&mut sorted[..len], &mut mapping[..len]);

        if let Some(pair) = sorted[..len].windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EcsError::DuplicateQueryComponent {
                name: types.get_component_type_desc(pair[0]).key().name().to_owned(),
            });
        }

        Ok(Self {
            include: ComponentAndTagSets::from_handles(sorted[..len].iter().copied(), std::iter::empty()),
            exclude: ComponentAndTagSets::new(),
            sorted,
            mapping,
            len,
            since: None,
        })
    }

    fn sorted(&self) -> &[ComponentType] {
        &self.sorted[..self.len]
    }

    /// Reorders sorted column pointers back into query order.
    fn unsort(&self, sorted_ptrs: &[*mut u8]) -> [*mut u8; MAX_TUPLE_LEN] {
        let mut columns = [ptr::null_mut(); MAX_TUPLE_LEN];
        for (&ptr, &slot) in sorted_ptrs.iter().zip(&self.mapping[..self.len]) {
            columns[slot as usize] = ptr;
        }
        columns
    }
}

/// Position of a range walk: current archetype and next chunk.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    next_archetype: usize,
    current: Option<ArchetypeId>,
    offsets: [u32; MAX_TUPLE_LEN],
    chunk: u32,
    used_chunks: u32,
}

impl Cursor {
    const fn new() -> Self {
        Self {
            next_archetype: 0,
            current: None,
            offsets: [0; MAX_TUPLE_LEN],
            chunk: 0,
            used_chunks: 0,
        }
    }

    /// Next accepted (archetype, chunk), in archetype then chunk order.
    fn advance(&mut self, registry: &EntityRegistry, filter: &Filter) -> Option<(ArchetypeId, u32)> {
        loop {
            if let Some(id) = self.current {
                let storage = registry.archetype(id)?;
                while self.chunk < self.used_chunks {
                    let chunk = self.chunk;
                    self.chunk += 1;

                    let stamped = storage.chunk_modification_id(chunk).unwrap_or(0);
                    if filter.since.map_or(true, |since| stamped >= since) {
                        return Some((id, chunk));
                    }
                }
                self.current = None;
            }

            let id = registry.find_first_match(self.next_archetype, &filter.include, &filter.exclude)?;
            self.next_archetype = id.index() + 1;

            let storage = registry.archetype(id)?;
            if filter.since.is_some_and(|since| storage.modification_id() < since) {
                continue;
            }

            let found = storage.fetch_component_offsets(filter.sorted(), &mut self.offsets[..filter.len]);
            debug_assert!(found, "matched archetype lacks a queried component");

            self.current = Some(id);
            self.chunk = 0;
            self.used_chunks = storage.used_chunks_count();
        }
    }

    /// Entities and query-ordered column pointers of one chunk.
    fn fetch<'r>(
        &self,
        registry: &'r EntityRegistry,
        filter: &Filter,
        id: ArchetypeId,
        chunk: u32,
    ) -> (&'r [Entity], [*mut u8; MAX_TUPLE_LEN]) {
        let mut sorted_ptrs = [ptr::null_mut(); MAX_TUPLE_LEN];
        let entities = registry.fetch_chunk_data(id, chunk, &self.offsets[..filter.len], &mut sorted_ptrs[..filter.len]);
        (entities, filter.unsort(&sorted_ptrs[..filter.len]))
    }
}

macro_rules! range_builder {
    () => {
        /// Also requires these components and tags.
        #[must_use]
        pub fn with(mut self, sets: &ComponentAndTagSets) -> Self {
            self.filter.include.add(sets);
            self
        }

        /// Also requires the types of the tuple `L` (components or tags).
        ///
        /// # Errors
        ///
        /// [`EcsError::UnregisteredType`] if an element of `L` is not registered.
        pub fn with_typed<L: TypeList>(mut self) -> EcsResult<Self> {
            let sets = self.registry.type_registry().make_type_sets::<L>()?;
            self.filter.include.add(&sets);
            Ok(self)
        }

        /// Skips archetypes holding any of these components or tags.
        #[must_use]
        pub fn exclude(mut self, sets: &ComponentAndTagSets) -> Self {
            self.filter.exclude.add(sets);
            self
        }

        /// Skips archetypes holding any type of the tuple `L`.
        ///
        /// # Errors
        ///
        /// [`EcsError::UnregisteredType`] if an element of `L` is not registered.
        pub fn exclude_typed<L: TypeList>(mut self) -> EcsResult<Self> {
            let sets = self.registry.type_registry().make_type_sets::<L>()?;
            self.filter.exclude.add(&sets);
            Ok(self)
        }

        /// Only visits chunks stamped at or after the registry's current
        /// modification id.
        #[must_use]
        pub fn notified(self) -> Self {
            let id = self.registry.modification_id();
            self.notified_since(id)
        }

        /// Only visits chunks stamped at or after `modification_id`.
        #[must_use]
        pub fn notified_since(mut self, modification_id: u64) -> Self {
            self.filter.since = Some(modification_id);
            self
        }

        /// Number of entities in the chunks this range visits.
        #[must_use]
        pub fn count(&self) -> usize {
            let registry: &EntityRegistry = &self.registry;
            let mut cursor = Cursor::new();
            let mut total = 0;

            while let Some((id, chunk)) = cursor.advance(registry, &self.filter) {
                if let Some(storage) = registry.archetype(id) {
                    total += storage.entities_count_in_chunk(chunk) as usize;
                }
            }

            total
        }
    };
}

// ============================================================================
// SHARED RANGE
// ============================================================================

/// Read-only typed query. Several may run at once, on any threads.
pub struct Range<'r, Q> {
    registry: &'r EntityRegistry,
    filter: Filter,
    _query: PhantomData<fn() -> Q>,
}

impl<'r, Q: ComponentTuple> Range<'r, Q> {
    range_builder!();

    /// Calls `f` with the entities and query columns of each matching chunk.
    pub fn for_each_chunk(&self, mut f: impl FnMut(&'r [Entity], Q::Slices<'r>)) {
        for chunk in self.iter() {
            f(chunk.entities, chunk.columns());
        }
    }

    /// Iterates the matching chunks.
    #[must_use]
    pub fn iter(&self) -> RangeIter<'r, Q> {
        RangeIter {
            registry: self.registry,
            filter: self.filter,
            cursor: Cursor::new(),
            _query: PhantomData,
        }
    }
}

impl<'r, Q: ComponentTuple> IntoIterator for &Range<'r, Q> {
    type Item = ChunkView<'r, Q>;
    type IntoIter = RangeIter<'r, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the chunks of a [`Range`].
pub struct RangeIter<'r, Q> {
    registry: &'r EntityRegistry,
    filter: Filter,
    cursor: Cursor,
    _query: PhantomData<fn() -> Q>,
}

impl<'r, Q: ComponentTuple> Iterator for RangeIter<'r, Q> {
    type Item = ChunkView<'r, Q>;

    fn next(&mut self) -> Option<Self::Item> {
        let (archetype, chunk) = self.cursor.advance(self.registry, &self.filter)?;
        let (entities, columns) = self.cursor.fetch(self.registry, &self.filter, archetype, chunk);

        Some(ChunkView {
            registry: self.registry,
            archetype,
            chunk,
            entities,
            columns,
            _query: PhantomData,
        })
    }
}

/// Read-only view of one chunk.
pub struct ChunkView<'r, Q> {
    registry: &'r EntityRegistry,
    archetype: ArchetypeId,
    chunk: u32,
    entities: &'r [Entity],
    columns: [*mut u8; MAX_TUPLE_LEN],
    _query: PhantomData<fn() -> Q>,
}

impl<'r, Q: ComponentTuple> ChunkView<'r, Q> {
    /// Entities stored in the chunk, in row order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &'r [Entity] {
        self.entities
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if the chunk holds no rows. Never true for visited chunks.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Archetype the chunk belongs to.
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Index of the chunk inside its archetype.
    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.chunk
    }

    /// Query columns, in declaration order.
    #[must_use]
    pub fn columns(&self) -> Q::Slices<'r> {
        // SAFETY: the pointers address `len` live values of each query type,
        // and the shared registry borrow forbids mutation for 'r.
        unsafe { Q::slices(&self.columns[..Q::LEN], self.entities.len()) }
    }

    /// Column of a component outside the query, if the archetype has it.
    #[must_use]
    pub fn try_get<T: 'static>(&self) -> Option<&'r [T]> {
        let component = self.registry.type_registry().component::<T>()?;
        let mut offset = [0u32];
        if !self.registry.fetch_component_offsets(self.archetype, &[component], &mut offset) {
            return None;
        }

        let mut column = [ptr::null_mut()];
        let entities = self.registry.fetch_chunk_data(self.archetype, self.chunk, &offset, &mut column);

        // SAFETY: the column holds `entities.len()` live values of `T`
        // (the descriptor's Rust type was checked by `component::<T>`).
        Some(unsafe { std::slice::from_raw_parts(column[0].cast::<T>().cast_const(), entities.len()) })
    }
}

// ============================================================================
// MUTABLE RANGE
// ============================================================================

/// Typed query with write access to the queried columns.
pub struct RangeMut<'r, Q> {
    registry: &'r mut EntityRegistry,
    filter: Filter,
    _query: PhantomData<fn() -> Q>,
}

impl<'r, Q: ComponentTuple> RangeMut<'r, Q> {
    range_builder!();

    /// Calls `f` with a writable view of each matching chunk.
    ///
    /// Chunks whose view called [`ChunkMut::notify`] are stamped with the
    /// registry's modification id once `f` returns.
    pub fn for_each_chunk(&mut self, mut f: impl FnMut(ChunkMut<'_, Q>)) {
        let mut cursor = Cursor::new();

        while let Some((archetype, chunk)) = cursor.advance(self.registry, &self.filter) {
            let notified = Cell::new(false);
            {
                let (entities, columns) = cursor.fetch(self.registry, &self.filter, archetype, chunk);
                f(ChunkMut {
                    entities,
                    columns,
                    notified: &notified,
                    _query: PhantomData,
                });
            }

            if notified.get() {
                self.registry.stamp_chunk(archetype, chunk);
            }
        }
    }
}

/// Writable view of one chunk.
pub struct ChunkMut<'a, Q> {
    entities: &'a [Entity],
    columns: [*mut u8; MAX_TUPLE_LEN],
    notified: &'a Cell<bool>,
    _query: PhantomData<fn() -> Q>,
}

impl<'a, Q: ComponentTuple> ChunkMut<'a, Q> {
    /// Entities stored in the chunk, in row order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if the chunk holds no rows. Never true for visited chunks.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Writable query columns, in declaration order.
    #[must_use]
    pub fn columns(&mut self) -> Q::SlicesMut<'_> {
        // SAFETY: distinct query components (checked when the range was
        // built) map to distinct columns; `&mut self` keeps the slices unique.
        unsafe { Q::slices_mut(&self.columns[..Q::LEN], self.entities.len()) }
    }

    /// Flags the chunk as changed at the registry's modification id.
    pub fn notify(&self) {
        self.notified.set(true);
    }
}

// ============================================================================
// REGISTRY ENTRY POINTS
// ============================================================================

impl EntityRegistry {
    /// Read-only range over entities holding every component of `Q`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnregisteredType`] if an element of `Q` is not a
    ///   registered Rust component
    /// - [`EcsError::DuplicateQueryComponent`] if `Q` names a type twice
    pub fn range<Q: ComponentTuple>(&self) -> EcsResult<Range<'_, Q>> {
        Ok(Range {
            filter: Filter::new::<Q>(self.type_registry())?,
            registry: self,
            _query: PhantomData,
        })
    }

    /// Writable range over entities holding every component of `Q`.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRegistry::range`].
    pub fn range_mut<Q: ComponentTuple>(&mut self) -> EcsResult<RangeMut<'_, Q>> {
        Ok(RangeMut {
            filter: Filter::new::<Q>(self.type_registry())?,
            registry: self,
            _query: PhantomData,
        })
    }
}
