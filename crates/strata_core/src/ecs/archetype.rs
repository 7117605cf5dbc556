//! # Archetype Storage
//!
//! One storage per distinct signature (components + tags). Entities live
//! in fixed-size chunks, each laid out as a struct of arrays:
//!
//! ```text
//! | Entity[n] | pad | ComponentA[n] | pad | ComponentB[n] | ... |
//! ```
//!
//! Columns follow ascending component handle order. `n` is the chunk
//! capacity, computed once per archetype from the chunk size and the
//! column sizes. Entities are dense: rows `[0, len)` are live, with no gaps.

// SAFETY: This module addresses type-erased component columns inside raw
// chunks. Every unsafe block states which layout invariant it relies on.
#![allow(unsafe_code)]

use std::any::TypeId;
use std::mem::size_of;

use super::component::ComponentFnTable;
use super::entity::Entity;
use super::type_registry::TypeRegistry;
use super::type_set::ComponentAndTagSets;
use super::types::{ComponentType, TagType};
use crate::memory::{Chunk, ChunkPool, PooledArray};

/// Index of an archetype inside its entity registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// Position of the archetype in registry order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(to_u32(index))
    }
}

/// Byte layout of one column inside a chunk.
#[derive(Clone, Copy, Debug)]
struct Column {
    offset: u32,
    size: u32,
}

/// Result of laying out an archetype's columns inside a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    /// Rows per chunk.
    pub entities_per_chunk: u32,
    /// Byte offset of each component column, in column order.
    pub offsets: Vec<u32>,
}

/// Lays out the entity column followed by `columns` (size, alignment) in a
/// chunk of `chunk_size` bytes.
///
/// Capacity is `(chunk_size - worst case padding) / row size`, where the
/// row size counts the entity handle plus every component.
///
/// # Panics
///
/// Panics if not even one row fits: no archetype can store such a
/// combination of components.
#[must_use]
pub fn compute_chunk_layout(columns: &[(u32, u32)], chunk_size: usize) -> ChunkLayout {
    let row_size: usize = size_of::<Entity>() + columns.iter().map(|&(size, _)| size as usize).sum::<usize>();
    let padding_worst_case: usize = columns.iter().map(|&(_, align)| align as usize - 1).sum();

    let capacity = chunk_size.saturating_sub(padding_worst_case) / row_size;
    assert!(
        capacity > 0,
        "A row of {row_size} bytes does not fit in a {chunk_size} byte chunk"
    );

    let mut offset = size_of::<Entity>() * capacity;
    let mut offsets = Vec::with_capacity(columns.len());

    for &(size, align) in columns {
        offset = align_up(offset, align as usize);
        offsets.push(to_u32(offset));
        offset += size as usize * capacity;
    }

    debug_assert!(offset <= chunk_size);

    ChunkLayout {
        entities_per_chunk: to_u32(capacity),
        offsets,
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn to_u32(value: usize) -> u32 {
    debug_assert!(u32::try_from(value).is_ok());
    value as u32
}

/// Storage for every entity sharing one signature.
pub struct ArchetypeStorage {
    /// Signature: the archetype key.
    types: ComponentAndTagSets,
    /// Component handles, sorted ascending. Parallel to the vectors below.
    components: Vec<ComponentType>,
    columns: Vec<Column>,
    fn_tables: Vec<ComponentFnTable>,
    rust_types: Vec<Option<TypeId>>,
    /// Allocated chunks. Never shrunk while entities come and go.
    chunks: PooledArray<Chunk>,
    entities_per_chunk: u32,
    /// Live entity count.
    len: u32,
    modification_id: u64,
}

impl ArchetypeStorage {
    /// Creates an empty archetype for `types`. No chunk is allocated yet.
    pub(crate) fn new(registry: &TypeRegistry, types: ComponentAndTagSets, chunk_size: usize) -> Self {
        let components: Vec<ComponentType> = types.components.iter().collect();

        let descs: Vec<_> = components
            .iter()
            .map(|&c| registry.get_component_type_desc(c))
            .collect();

        let sizes: Vec<(u32, u32)> = descs.iter().map(|d| (d.size(), d.alignment())).collect();
        let layout = compute_chunk_layout(&sizes, chunk_size);

        let columns = layout
            .offsets
            .iter()
            .zip(&sizes)
            .map(|(&offset, &(size, _))| Column { offset, size })
            .collect();

        Self {
            types,
            components,
            columns,
            fn_tables: descs.iter().map(|d| d.fn_table()).collect(),
            rust_types: descs.iter().map(|d| d.rust_type()).collect(),
            chunks: PooledArray::new(),
            entities_per_chunk: layout.entities_per_chunk,
            len: 0,
            modification_id: 0,
        }
    }

    // ========================================================================
    // READ ACCESS
    // ========================================================================

    /// Components and tags of this archetype.
    #[inline]
    #[must_use]
    pub fn signature(&self) -> &ComponentAndTagSets {
        &self.types
    }

    /// Component handles in column order (ascending).
    #[inline]
    #[must_use]
    pub fn component_types(&self) -> &[ComponentType] {
        &self.components
    }

    /// Tag handles in ascending order.
    pub fn tag_types(&self) -> impl Iterator<Item = TagType> + '_ {
        self.types.tags.iter()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Checks if no entity is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rows per chunk.
    #[inline]
    #[must_use]
    pub fn entities_per_chunk(&self) -> u32 {
        self.entities_per_chunk
    }

    /// Chunks allocated, used or not.
    #[inline]
    #[must_use]
    pub fn allocated_chunks_count(&self) -> u32 {
        to_u32(self.chunks.len())
    }

    /// Chunks holding at least one live entity.
    #[inline]
    #[must_use]
    pub fn used_chunks_count(&self) -> u32 {
        self.len.div_ceil(self.entities_per_chunk)
    }

    /// Live rows in chunk `chunk_index`. Only the last used chunk may be partial.
    #[must_use]
    pub fn entities_count_in_chunk(&self, chunk_index: u32) -> u32 {
        let start = chunk_index.saturating_mul(self.entities_per_chunk);
        self.len.saturating_sub(start).min(self.entities_per_chunk)
    }

    /// Highest modification id stamped on any chunk of this archetype.
    #[inline]
    #[must_use]
    pub fn modification_id(&self) -> u64 {
        self.modification_id
    }

    /// Modification id of one chunk.
    #[must_use]
    pub fn chunk_modification_id(&self, chunk_index: u32) -> Option<u64> {
        self.chunks.get(chunk_index as usize).map(|c| c.modification_id)
    }

    /// Column of `component`, if this archetype has it.
    #[inline]
    #[must_use]
    pub fn component_index(&self, component: ComponentType) -> Option<usize> {
        self.components.binary_search(&component).ok()
    }

    /// Entity stored at dense index `index`.
    #[must_use]
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        if index >= self.len {
            return None;
        }
        let (chunk, row) = self.location(index);
        Some(self.chunk_entities(chunk, row + 1)[row])
    }

    /// Entities of chunk `chunk_index`, in row order.
    #[must_use]
    pub fn entities_in_chunk(&self, chunk_index: u32) -> &[Entity] {
        let rows = self.entities_count_in_chunk(chunk_index) as usize;
        if rows == 0 {
            return &[];
        }
        self.chunk_entities(chunk_index as usize, rows)
    }

    /// Iterates every live entity in (chunk, row) order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.used_chunks_count()).flat_map(move |c| self.entities_in_chunk(c).iter().copied())
    }

    /// Typed reference to a component value.
    ///
    /// `None` when out of range or when the column does not hold `T`.
    #[must_use]
    pub(crate) fn get<T: 'static>(&self, index: u32, column: usize) -> Option<&T> {
        let ptr = self.typed_ptr::<T>(index, column)?;
        // SAFETY: the column holds live, aligned `T` values (checked by
        // typed_ptr) and `&self` prevents concurrent mutation.
        Some(unsafe { &*ptr })
    }

    /// Typed mutable reference to a component value.
    #[must_use]
    pub(crate) fn get_mut<T: 'static>(&mut self, index: u32, column: usize) -> Option<&mut T> {
        let ptr = self.typed_ptr::<T>(index, column)?;
        // SAFETY: as in `get`; `&mut self` makes the access exclusive.
        Some(unsafe { &mut *ptr })
    }

    /// Address of a component value, for byte-level consumers.
    #[must_use]
    pub(crate) fn component_data(&self, index: u32, column: usize) -> Option<std::ptr::NonNull<u8>> {
        if index >= self.len || column >= self.columns.len() {
            return None;
        }
        let (chunk, row) = self.location(index);
        std::ptr::NonNull::new(self.component_ptr(chunk, row, column))
    }

    fn typed_ptr<T: 'static>(&self, index: u32, column: usize) -> Option<*mut T> {
        if index >= self.len || self.rust_types.get(column)? != &Some(TypeId::of::<T>()) {
            return None;
        }
        let (chunk, row) = self.location(index);
        Some(self.component_ptr(chunk, row, column).cast::<T>())
    }

    // ========================================================================
    // CHUNK ADDRESSING
    // ========================================================================

    /// Chunk index and row of dense index `index`.
    #[inline]
    fn location(&self, index: u32) -> (usize, usize) {
        let epc = self.entities_per_chunk;
        ((index / epc) as usize, (index % epc) as usize)
    }

    #[inline]
    fn chunk_entities(&self, chunk: usize, rows: usize) -> &[Entity] {
        debug_assert!(rows <= self.entities_per_chunk as usize);
        // SAFETY: the entity column starts the chunk and spans
        // `entities_per_chunk` handles. Chunks are zeroed on acquire and
        // only ever receive `Entity` values there, so every byte is initialized.
        let bytes = unsafe {
            std::slice::from_raw_parts(self.chunks[chunk].as_ptr(), rows * size_of::<Entity>())
        };
        bytemuck::cast_slice(bytes)
    }

    #[inline]
    fn entity_ptr(&self, chunk: usize, row: usize) -> *mut Entity {
        // SAFETY: row < entities_per_chunk, inside the entity column.
        unsafe { self.chunks[chunk].data_ptr().cast::<Entity>().add(row) }
    }

    #[inline]
    fn column_base(&self, chunk: usize, column: usize) -> *mut u8 {
        // SAFETY: column offsets were computed to lie within the chunk.
        unsafe { self.chunks[chunk].data_ptr().add(self.columns[column].offset as usize) }
    }

    #[inline]
    fn component_ptr(&self, chunk: usize, row: usize, column: usize) -> *mut u8 {
        let size = self.columns[column].size as usize;
        // SAFETY: row < entities_per_chunk, so the value lies inside its column.
        unsafe { self.column_base(chunk, column).add(row * size) }
    }

    // ========================================================================
    // QUERY SUPPORT
    // ========================================================================

    /// Resolves the column offset of each requested component.
    ///
    /// `component_types` must be sorted ascending. Returns `false` if any of
    /// them is missing from this archetype.
    #[must_use]
    pub fn fetch_component_offsets(&self, component_types: &[ComponentType], offsets: &mut [u32]) -> bool {
        debug_assert!(component_types.windows(2).all(|w| w[0] <= w[1]));
        debug_assert!(offsets.len() >= component_types.len());

        let mut column = 0;

        for (requested, out) in component_types.iter().zip(offsets.iter_mut()) {
            while column < self.components.len() && self.components[column] < *requested {
                column += 1;
            }

            if column == self.components.len() || self.components[column] != *requested {
                return false;
            }

            *out = self.columns[column].offset;
            column += 1;
        }

        true
    }

    /// Entities of one chunk plus the base pointer of each requested column.
    ///
    /// `offsets` come from [`ArchetypeStorage::fetch_component_offsets`].
    /// The returned slice length is the chunk's row count.
    pub fn fetch_chunk_data(&self, chunk_index: u32, offsets: &[u32], out: &mut [*mut u8]) -> &[Entity] {
        let entities = self.entities_in_chunk(chunk_index);
        if entities.is_empty() {
            return entities;
        }

        let base = self.chunks[chunk_index as usize].data_ptr();
        for (&offset, ptr) in offsets.iter().zip(out.iter_mut()) {
            // SAFETY: offsets were produced from this archetype's layout.
            *ptr = unsafe { base.add(offset as usize) };
        }

        entities
    }

    // ========================================================================
    // STRUCTURAL MUTATION
    // ========================================================================

    /// Makes sure `required` chunks are allocated.
    pub(crate) fn reserve_chunks(&mut self, pool: &mut ChunkPool, required: u32) {
        let current = self.chunks.len();
        let required = required as usize;
        if required <= current {
            return;
        }

        tracing::trace!(
            allocated = current,
            required,
            components = self.components.len(),
            "reserving archetype chunks"
        );

        self.chunks.reserve_total(required);
        for _ in current..required {
            self.chunks.push(pool.acquire());
        }
    }

    /// Appends `count` default-constructed entities with consecutive ids
    /// starting at `first`. Returns the dense index of the first one.
    pub(crate) fn push_entities(
        &mut self,
        pool: &mut ChunkPool,
        first: Entity,
        count: u32,
        modification_id: u64,
    ) -> u32 {
        let epc = self.entities_per_chunk;
        let old_len = self.len;
        let new_len = old_len + count;

        self.reserve_chunks(pool, new_len.div_ceil(epc));

        let mut index = old_len;
        let mut next = first;

        while index < new_len {
            let (chunk, row) = self.location(index);
            let rows = (epc as usize - row).min((new_len - index) as usize);

            for r in 0..rows {
                // SAFETY: row + r < entities_per_chunk, inside the entity column.
                unsafe { self.entity_ptr(chunk, row + r).write(next) };
                next = next.offset(1);
            }

            for column in 0..self.columns.len() {
                let dst = self.component_ptr(chunk, row, column);
                // SAFETY: rows [row, row + rows) are past `len`, so they hold
                // no live values, and they fit inside this chunk's column.
                unsafe { self.fn_tables[column].do_create(dst, rows) };
            }

            self.stamp_chunk(chunk, modification_id);
            index += to_u32(rows);
        }

        self.len = new_len;
        old_len
    }

    /// Removes the entity at `index`, moving the last entity into its slot.
    ///
    /// With `destroy`, the removed values are dropped. Without it, the
    /// caller must already have moved or dropped every value of that slot.
    ///
    /// Returns the entity that now occupies `index`, if one was moved.
    pub(crate) fn swap_remove(&mut self, index: u32, destroy: bool) -> Option<Entity> {
        debug_assert!(index < self.len);

        let last = self.len - 1;
        let (chunk, row) = self.location(index);
        let (last_chunk, last_row) = self.location(last);

        let moved = if index == last {
            if destroy {
                for column in 0..self.columns.len() {
                    let ptr = self.component_ptr(chunk, row, column);
                    // SAFETY: slot `index` is live.
                    unsafe { self.fn_tables[column].do_destroy(ptr, 1) };
                }
            }
            None
        } else {
            // SAFETY: `last` is a live slot distinct from `index`.
            let moved = unsafe { self.entity_ptr(last_chunk, last_row).read() };

            for column in 0..self.columns.len() {
                let dst = self.component_ptr(chunk, row, column);
                let src = self.component_ptr(last_chunk, last_row, column);
                let table = self.fn_tables[column];
                // SAFETY: both slots are distinct. `src` is live; `dst` is live
                // when destroying, already vacated otherwise.
                unsafe {
                    if destroy {
                        table.do_relocate_assign(dst, src, 1);
                    } else {
                        table.do_relocate(dst, src, 1);
                    }
                }
            }

            // SAFETY: both rows lie inside their chunks' entity columns.
            unsafe { self.entity_ptr(chunk, row).write(moved) };
            Some(moved)
        };

        // SAFETY: last row lies inside its chunk's entity column.
        unsafe { self.entity_ptr(last_chunk, last_row).write(Entity::NULL) };
        self.len = last;

        moved
    }

    /// Destroys every live value and returns all chunks to the pool.
    pub(crate) fn clear(&mut self, pool: &mut ChunkPool) {
        self.destroy_values();
        self.chunks.drain_into(|chunk| pool.release(chunk));
    }

    /// Stamps chunk `chunk` with `modification_id`.
    ///
    /// The archetype keeps the highest id it has seen, so it can be skipped
    /// as a whole by queries asking for newer changes.
    #[inline]
    pub(crate) fn stamp_chunk(&mut self, chunk: usize, modification_id: u64) {
        self.chunks[chunk].modification_id = modification_id;
        self.modification_id = self.modification_id.max(modification_id);
    }

    /// Stamps the chunk holding dense index `index`.
    #[inline]
    pub(crate) fn stamp_index(&mut self, index: u32, modification_id: u64) {
        let (chunk, _) = self.location(index);
        self.stamp_chunk(chunk, modification_id);
    }

    fn destroy_values(&mut self) {
        let mut remaining = self.len;

        for chunk in 0..self.chunks.len() {
            if remaining == 0 {
                break;
            }
            let rows = remaining.min(self.entities_per_chunk);

            for column in 0..self.columns.len() {
                let ptr = self.column_base(chunk, column);
                // SAFETY: the first `rows` rows of this chunk are live.
                unsafe { self.fn_tables[column].do_destroy(ptr, rows as usize) };
            }

            remaining -= rows;
        }

        self.len = 0;
    }
}

impl Drop for ArchetypeStorage {
    fn drop(&mut self) {
        self.destroy_values();
    }
}

/// Outcome of moving an entity between archetypes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Migration {
    /// Dense index of the entity in the destination.
    pub dst_index: u32,
    /// Entity moved into the vacated source slot, if any.
    pub moved: Option<Entity>,
}

/// Moves the entity at `src_index` of `src` to the end of `dst`.
///
/// Components present in both are relocated, components only in `dst`
/// are default-created, and components only in `src` are destroyed.
pub(crate) fn migrate(
    src: &mut ArchetypeStorage,
    src_index: u32,
    dst: &mut ArchetypeStorage,
    pool: &mut ChunkPool,
    modification_id: u64,
) -> Migration {
    debug_assert!(src_index < src.len);

    let dst_index = dst.len;
    dst.reserve_chunks(pool, (dst_index + 1).div_ceil(dst.entities_per_chunk));

    let (src_chunk, src_row) = src.location(src_index);
    let (dst_chunk, dst_row) = dst.location(dst_index);

    // SAFETY: the source slot is live, the destination slot is past `len`.
    unsafe {
        let entity = src.entity_ptr(src_chunk, src_row).read();
        dst.entity_ptr(dst_chunk, dst_row).write(entity);
    }

    let mut s = 0;
    for d in 0..dst.components.len() {
        let component = dst.components[d];

        while s < src.components.len() && src.components[s] < component {
            let ptr = src.component_ptr(src_chunk, src_row, s);
            // SAFETY: the source value is live and has no destination column.
            unsafe { src.fn_tables[s].do_destroy(ptr, 1) };
            s += 1;
        }

        let dst_ptr = dst.component_ptr(dst_chunk, dst_row, d);

        if s < src.components.len() && src.components[s] == component {
            let src_ptr = src.component_ptr(src_chunk, src_row, s);
            // SAFETY: distinct archetypes, so distinct chunks; same component
            // so same layout. The source value is dead afterwards.
            unsafe { dst.fn_tables[d].do_relocate(dst_ptr, src_ptr, 1) };
            s += 1;
        } else {
            // SAFETY: the destination slot holds no value yet.
            unsafe { dst.fn_tables[d].do_create(dst_ptr, 1) };
        }
    }

    while s < src.components.len() {
        let ptr = src.component_ptr(src_chunk, src_row, s);
        // SAFETY: the source value is live and has no destination column.
        unsafe { src.fn_tables[s].do_destroy(ptr, 1) };
        s += 1;
    }

    dst.len += 1;
    dst.stamp_chunk(dst_chunk, modification_id);

    let moved = src.swap_remove(src_index, false);

    Migration { dst_index, moved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::ComponentTypeDesc;
    use crate::ecs::types::TypeKey;

    #[test]
    fn test_layout_respects_alignment() {
        // u8, then u64, then [u8; 3]
        let layout = compute_chunk_layout(&[(1, 1), (8, 8), (3, 1)], 1 << 14);
        let n = layout.entities_per_chunk as usize;

        assert_eq!(n, (16384 - 7) / (8 + 1 + 8 + 3));
        assert_eq!(layout.offsets[0] as usize, 8 * n);
        assert_eq!(layout.offsets[1] % 8, 0);
        assert!(layout.offsets[1] as usize >= layout.offsets[0] as usize + n);
        assert!(layout.offsets[2] as usize + 3 * n <= 1 << 14);
    }

    #[test]
    fn test_layout_entity_only() {
        let layout = compute_chunk_layout(&[], 1024);
        assert_eq!(layout.entities_per_chunk, 128);
        assert!(layout.offsets.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_layout_row_too_large() {
        let _ = compute_chunk_layout(&[(4096, 4)], 1024);
    }

    fn storage_for(sizes: &[u32]) -> (TypeRegistry, ArchetypeStorage) {
        let mut registry = TypeRegistry::new();
        let mut sets = ComponentAndTagSets::new();
        for (i, &size) in sizes.iter().enumerate() {
            let desc = ComponentTypeDesc::from_raw(TypeKey::named(format!("c{i}")), size, 4);
            sets.components.add(registry.register_component(desc).unwrap());
        }
        let storage = ArchetypeStorage::new(&registry, sets, 1024);
        (registry, storage)
    }

    #[test]
    fn test_push_and_swap_remove() {
        let (_registry, mut storage) = storage_for(&[4]);
        let mut pool = ChunkPool::new(1024);
        let epc = storage.entities_per_chunk();

        let first = storage.push_entities(&mut pool, Entity::from_raw(1), epc + 2, 5);
        assert_eq!(first, 0);
        assert_eq!(storage.len(), epc + 2);
        assert_eq!(storage.used_chunks_count(), 2);
        assert_eq!(storage.entities_count_in_chunk(0), epc);
        assert_eq!(storage.entities_count_in_chunk(1), 2);
        assert_eq!(storage.chunk_modification_id(1), Some(5));

        let moved = storage.swap_remove(0, true);
        assert_eq!(moved, Some(Entity::from_raw(u64::from(epc) + 2)));
        assert_eq!(storage.entity_at(0), moved);
        assert_eq!(storage.len(), epc + 1);

        let last = storage.len() - 1;
        assert_eq!(storage.swap_remove(last, true), None);
        assert_eq!(storage.entities_in_chunk(1).len(), 0);

        storage.clear(&mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_fetch_component_offsets_merge_join() {
        let (registry, storage) = storage_for(&[4, 8, 12]);
        let all = storage.component_types().to_vec();

        let mut offsets = [0u32; 3];
        assert!(storage.fetch_component_offsets(&all, &mut offsets));
        assert!(offsets[0] < offsets[1] && offsets[1] < offsets[2]);

        let mut one = [0u32; 1];
        assert!(storage.fetch_component_offsets(&all[2..], &mut one));
        assert_eq!(one[0], offsets[2]);

        let mut registry = registry;
        let missing = registry
            .register_component(ComponentTypeDesc::from_raw(TypeKey::named("absent"), 4, 4))
            .unwrap();
        assert!(!storage.fetch_component_offsets(&[all[0], missing], &mut [0; 2]));
    }
}
