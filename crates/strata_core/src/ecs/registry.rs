//! # Entity Registry
//!
//! Top-level store. Owns one [`ArchetypeStorage`] per signature in use,
//! the entity lookup table and the chunk pool backing every archetype.
//!
//! ## Threading
//!
//! Structural operations (`create`, `destroy`, `add`, `remove`) take
//! `&mut self`. Shared ranges take `&self` and may run on many threads at
//! once, since they never touch the structure.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use super::archetype::{migrate, ArchetypeId, ArchetypeStorage};
use super::entity::Entity;
use super::tuple::{Bundle, TypeList};
use super::type_registry::TypeRegistry;
use super::type_set::ComponentAndTagSets;
use super::types::{ComponentType, TypeKey};
use crate::config::RegistryConfig;
use crate::error::EcsResult;
use crate::memory::{ChunkPool, PooledArray};

/// Where an entity lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EntityData {
    archetype: ArchetypeId,
    index: u32,
}

/// Entity store with chunked, archetype-based component storage.
pub struct EntityRegistry {
    types: Arc<TypeRegistry>,
    pool: ChunkPool,
    archetypes: PooledArray<ArchetypeStorage>,
    archetype_map: HashMap<ComponentAndTagSets, ArchetypeId>,
    entities: HashMap<Entity, EntityData>,
    /// Next id to hand out. Ids are never reused.
    next_entity: u64,
    modification_id: u64,
}

impl EntityRegistry {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self::build(types, &RegistryConfig::default())
    }

    /// Creates a registry from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`](crate::EcsError::InvalidConfig)
    /// if the configuration does not validate.
    pub fn with_config(types: Arc<TypeRegistry>, config: &RegistryConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(types, config))
    }

    fn build(types: Arc<TypeRegistry>, config: &RegistryConfig) -> Self {
        tracing::debug!(
            chunk_size = config.chunk_size,
            components = types.components_count(),
            tags = types.tags_count(),
            "creating entity registry"
        );

        Self {
            types,
            pool: ChunkPool::new(config.chunk_size as usize),
            archetypes: PooledArray::new(),
            archetype_map: HashMap::new(),
            entities: HashMap::with_capacity(config.entity_capacity),
            next_entity: 1,
            modification_id: config.initial_modification_id,
        }
    }

    /// The type registry this registry resolves handles against.
    #[inline]
    #[must_use]
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    // ========================================================================
    // STRUCTURAL OPERATIONS
    // ========================================================================

    /// Creates `count` entities with the given components and tags.
    ///
    /// Components are default-constructed. The new entities have consecutive
    /// ids: the first one is returned, the rest follow with
    /// [`Entity::offset`]. A `count` of zero returns [`Entity::NULL`].
    ///
    /// # Panics
    ///
    /// Panics if `sets` holds a handle not issued by this registry's type
    /// registry, or if one row of these components cannot fit in a chunk.
    pub fn create(&mut self, sets: &ComponentAndTagSets, count: u32) -> Entity {
        if count == 0 {
            return Entity::NULL;
        }

        let archetype = self.find_or_create_archetype(sets);

        let first = Entity::from_raw(self.next_entity);
        self.next_entity += u64::from(count);

        let storage = &mut self.archetypes[archetype.index()];
        let first_index = storage.push_entities(&mut self.pool, first, count, self.modification_id);

        self.entities.reserve(count as usize);
        for i in 0..count {
            self.entities.insert(
                first.offset(u64::from(i)),
                EntityData {
                    archetype,
                    index: first_index + i,
                },
            );
        }

        first
    }

    /// Creates `count` entities whose components and tags are the elements
    /// of the tuple `L`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`](crate::EcsError::UnregisteredType) if
    /// an element of `L` is not registered.
    pub fn create_typed<L: TypeList>(&mut self, count: u32) -> EcsResult<Entity> {
        let sets = self.types.make_type_sets::<L>()?;
        Ok(self.create(&sets, count))
    }

    /// Creates one entity and moves the bundle's component values into it.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRegistry::create_typed`].
    pub fn create_bundle<B: Bundle>(&mut self, values: B) -> EcsResult<Entity> {
        let entity = self.create_typed::<B>(1)?;
        values.write(self, entity);
        Ok(entity)
    }

    /// Destroys an entity and its components. Does nothing if it is not alive.
    pub fn destroy(&mut self, entity: Entity) {
        let Some(data) = self.entities.remove(&entity) else {
            return;
        };

        let storage = &mut self.archetypes[data.archetype.index()];
        if let Some(moved) = storage.swap_remove(data.index, true) {
            if let Some(moved_data) = self.entities.get_mut(&moved) {
                moved_data.index = data.index;
            }
        }
    }

    /// Destroys every entity. Archetypes stay registered, empty, and their
    /// chunks go back to the pool.
    pub fn destroy_all(&mut self) {
        tracing::debug!(
            entities = self.entities.len(),
            archetypes = self.archetypes.len(),
            "destroying all entities"
        );

        for storage in self.archetypes.iter_mut() {
            storage.clear(&mut self.pool);
        }

        self.entities.clear();
    }

    /// Adds components and tags to an entity, moving it to the matching
    /// archetype. Kept components keep their values; new ones are
    /// default-constructed.
    ///
    /// Does nothing if the entity is dead or already has all of them.
    pub fn add(&mut self, entity: Entity, sets: &ComponentAndTagSets) {
        let Some(mut target) = self.get_component_and_tag_sets(entity) else {
            return;
        };
        target.add(sets);
        self.move_to(entity, &target);
    }

    /// Removes components and tags from an entity. Removed components are
    /// destroyed.
    ///
    /// Does nothing if the entity is dead or has none of them.
    pub fn remove(&mut self, entity: Entity, sets: &ComponentAndTagSets) {
        let Some(mut target) = self.get_component_and_tag_sets(entity) else {
            return;
        };
        target.remove(sets);
        self.move_to(entity, &target);
    }

    /// Typed form of [`EntityRegistry::add`].
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`](crate::EcsError::UnregisteredType) if
    /// an element of `L` is not registered.
    pub fn add_typed<L: TypeList>(&mut self, entity: Entity) -> EcsResult<()> {
        let sets = self.types.make_type_sets::<L>()?;
        self.add(entity, &sets);
        Ok(())
    }

    /// Adds the bundle's types to an entity, then writes its values.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRegistry::add_typed`].
    pub fn add_bundle<B: Bundle>(&mut self, entity: Entity, values: B) -> EcsResult<()> {
        self.add_typed::<B>(entity)?;
        values.write(self, entity);
        Ok(())
    }

    /// Typed form of [`EntityRegistry::remove`].
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`](crate::EcsError::UnregisteredType) if
    /// an element of `L` is not registered.
    pub fn remove_typed<L: TypeList>(&mut self, entity: Entity) -> EcsResult<()> {
        let sets = self.types.make_type_sets::<L>()?;
        self.remove(entity, &sets);
        Ok(())
    }

    fn move_to(&mut self, entity: Entity, target: &ComponentAndTagSets) {
        let Some(&data) = self.entities.get(&entity) else {
            return;
        };

        let dst_id = self.find_or_create_archetype(target);
        if dst_id == data.archetype {
            return;
        }

        let (src, dst) = pair_mut(&mut self.archetypes, data.archetype.index(), dst_id.index());
        let migration = migrate(src, data.index, dst, &mut self.pool, self.modification_id);

        if let Some(moved) = migration.moved {
            if let Some(moved_data) = self.entities.get_mut(&moved) {
                moved_data.index = data.index;
            }
        }

        self.entities.insert(
            entity,
            EntityData {
                archetype: dst_id,
                index: migration.dst_index,
            },
        );
    }

    fn find_or_create_archetype(&mut self, sets: &ComponentAndTagSets) -> ArchetypeId {
        if let Some(&id) = self.archetype_map.get(sets) {
            return id;
        }

        let id = ArchetypeId::from_index(self.archetypes.len());
        let storage = ArchetypeStorage::new(&self.types, *sets, self.pool.chunk_size());

        tracing::debug!(
            archetype = id.0,
            components = sets.components.len(),
            tags = sets.tags.len(),
            entities_per_chunk = storage.entities_per_chunk(),
            "created archetype"
        );

        self.archetypes.push(storage);
        self.archetype_map.insert(*sets, id);

        id
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    /// Checks if an entity is alive.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entities_count(&self) -> usize {
        self.entities.len()
    }

    /// Typed access to a component.
    ///
    /// `None` if the entity is dead, lacks the component, or `T` is not
    /// registered as a Rust component.
    #[must_use]
    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let data = *self.entities.get(&entity)?;
        let component = self.types.component::<T>()?;
        let storage = &self.archetypes[data.archetype.index()];
        let column = storage.component_index(component)?;
        storage.get::<T>(data.index, column)
    }

    /// Typed mutable access to a component.
    ///
    /// Does not notify: call [`EntityRegistry::notify`] to flag the change.
    #[must_use]
    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let data = *self.entities.get(&entity)?;
        let component = self.types.component::<T>()?;
        let storage = &mut self.archetypes[data.archetype.index()];
        let column = storage.component_index(component)?;
        storage.get_mut::<T>(data.index, column)
    }

    /// Address of a component's bytes, found by type key.
    ///
    /// Works for byte-only components as well as Rust ones. The pointer
    /// stays valid until the next structural operation and must only be
    /// read through.
    #[must_use]
    pub fn find_component_data(&self, entity: Entity, key: &TypeKey) -> Option<NonNull<u8>> {
        let data = *self.entities.get(&entity)?;
        let component = self.types.find_component(key)?;
        let storage = &self.archetypes[data.archetype.index()];
        let column = storage.component_index(component)?;
        storage.component_data(data.index, column)
    }

    /// Same as [`EntityRegistry::find_component_data`], but the pointer may
    /// be written through.
    #[must_use]
    pub fn find_component_data_mut(&mut self, entity: Entity, key: &TypeKey) -> Option<NonNull<u8>> {
        self.find_component_data(entity, key)
    }

    /// Components and tags of an entity.
    #[must_use]
    pub fn get_component_and_tag_sets(&self, entity: Entity) -> Option<ComponentAndTagSets> {
        let data = self.entities.get(&entity)?;
        Some(*self.archetypes[data.archetype.index()].signature())
    }

    /// Archetype an entity belongs to.
    #[must_use]
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeId> {
        self.entities.get(&entity).map(|data| data.archetype)
    }

    /// Dense index of an entity inside its archetype.
    #[must_use]
    pub fn index_of(&self, entity: Entity) -> Option<u32> {
        self.entities.get(&entity).map(|data| data.index)
    }

    /// Every archetype created so far, in creation order. Empty ones included.
    pub fn archetypes(&self) -> impl Iterator<Item = &ArchetypeStorage> + '_ {
        self.archetypes.iter()
    }

    /// Number of archetypes created so far.
    #[inline]
    #[must_use]
    pub fn archetypes_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Archetype by id.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&ArchetypeStorage> {
        self.archetypes.get(id.index())
    }

    // ========================================================================
    // CHANGE NOTIFICATION
    // ========================================================================

    /// Id stamped on chunks by `create`, migration and `notify`.
    #[inline]
    #[must_use]
    pub fn modification_id(&self) -> u64 {
        self.modification_id
    }

    /// Sets the id stamped by subsequent changes (typically a frame counter).
    #[inline]
    pub fn set_modification_id(&mut self, id: u64) {
        self.modification_id = id;
    }

    /// Flags the chunk holding `entity` as changed at the current
    /// modification id. Does nothing if the entity is dead.
    pub fn notify(&mut self, entity: Entity) {
        let Some(&data) = self.entities.get(&entity) else {
            return;
        };
        self.archetypes[data.archetype.index()].stamp_index(data.index, self.modification_id);
    }

    pub(crate) fn stamp_chunk(&mut self, archetype: ArchetypeId, chunk: u32) {
        let id = self.modification_id;
        self.archetypes[archetype.index()].stamp_chunk(chunk as usize, id);
    }

    // ========================================================================
    // LOW-LEVEL CHUNK ACCESS
    // ========================================================================

    /// First non-empty archetype at or after `from` whose signature holds
    /// all of `include` and none of `exclude`.
    #[must_use]
    pub fn find_first_match(
        &self,
        from: usize,
        include: &ComponentAndTagSets,
        exclude: &ComponentAndTagSets,
    ) -> Option<ArchetypeId> {
        self.archetypes
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, storage)| {
                let signature = storage.signature();
                !storage.is_empty() && signature.contains_all(include) && !signature.intersects(exclude)
            })
            .map(|(index, _)| ArchetypeId::from_index(index))
    }

    /// Sorts component handles ascending and records where each came from:
    /// after the call, `component_types[i]` was originally at `mapping[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length or hold more than 256 entries.
    pub fn sort_and_map(component_types: &mut [ComponentType], mapping: &mut [u8]) {
        assert_eq!(component_types.len(), mapping.len());
        assert!(mapping.len() <= usize::from(u8::MAX) + 1);

        let mut pairs: Vec<(ComponentType, u8)> = component_types
            .iter()
            .zip(0..=u8::MAX)
            .map(|(&component, index)| (component, index))
            .collect();
        pairs.sort_by_key(|&(component, _)| component);

        for ((component, index), (out_component, out_index)) in
            pairs.into_iter().zip(component_types.iter_mut().zip(mapping.iter_mut()))
        {
            *out_component = component;
            *out_index = index;
        }
    }

    /// Chunks holding at least one entity in an archetype. Zero for an id
    /// this registry never issued.
    #[must_use]
    pub fn used_chunks_count(&self, archetype: ArchetypeId) -> u32 {
        self.archetype(archetype).map_or(0, ArchetypeStorage::used_chunks_count)
    }

    /// Column offsets of sorted `component_types` in an archetype.
    ///
    /// Returns `false` if the archetype lacks any of them, or if this
    /// registry never issued the id.
    #[must_use]
    pub fn fetch_component_offsets(
        &self,
        archetype: ArchetypeId,
        component_types: &[ComponentType],
        offsets: &mut [u32],
    ) -> bool {
        self.archetype(archetype)
            .is_some_and(|storage| storage.fetch_component_offsets(component_types, offsets))
    }

    /// Entities of a chunk, with the base pointer of each column in `out`.
    ///
    /// The row count is the length of the returned slice. An unknown
    /// archetype or an unused chunk yields no rows and leaves `out` untouched.
    pub fn fetch_chunk_data(
        &self,
        archetype: ArchetypeId,
        chunk: u32,
        offsets: &[u32],
        out: &mut [*mut u8],
    ) -> &[Entity] {
        match self.archetype(archetype) {
            Some(storage) => storage.fetch_chunk_data(chunk, offsets, out),
            None => &[],
        }
    }
}

/// Two distinct elements of a slice, both mutable.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct Mass(f32);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Name(String);

    fn registry() -> (EntityRegistry, ComponentType, ComponentType) {
        let mut types = TypeRegistry::new();
        let mass = types.register::<Mass>().unwrap();
        let name = types.register::<Name>().unwrap();
        (EntityRegistry::new(Arc::new(types)), mass, name)
    }

    #[test]
    fn test_create_zero_is_null() {
        let (mut reg, mass, _) = registry();
        let sets = ComponentAndTagSets::new().with_component(mass);

        assert!(reg.create(&sets, 0).is_null());
        assert_eq!(reg.entities_count(), 0);
        assert_eq!(reg.archetypes_count(), 0);
    }

    #[test]
    fn test_ids_are_sequential_and_never_reused() {
        let (mut reg, mass, _) = registry();
        let sets = ComponentAndTagSets::new().with_component(mass);

        let first = reg.create(&sets, 3);
        assert_eq!(first, Entity::from_raw(1));
        assert!(reg.contains(first.offset(2)));

        reg.destroy(first.offset(2));
        let next = reg.create(&sets, 1);
        assert_eq!(next, Entity::from_raw(4));
    }

    #[test]
    fn test_destroy_dead_entity_is_noop() {
        let (mut reg, mass, _) = registry();
        let e = reg.create(&ComponentAndTagSets::new().with_component(mass), 1);

        reg.destroy(e);
        reg.destroy(e);
        reg.destroy(Entity::NULL);
        assert!(!reg.contains(e));
        assert_eq!(reg.entities_count(), 0);
    }

    #[test]
    fn test_owned_values_are_dropped() {
        let (mut reg, _, name) = registry();
        let sets = ComponentAndTagSets::new().with_component(name);

        let e = reg.create(&sets, 4);
        for i in 0..4 {
            reg.get_mut::<Name>(e.offset(i)).unwrap().0 = format!("entity {i}");
        }

        reg.destroy(e.offset(1));
        assert_eq!(reg.get::<Name>(e.offset(3)).unwrap().0, "entity 3");
        assert_eq!(reg.index_of(e.offset(3)), Some(1));

        reg.destroy_all();
        assert_eq!(reg.entities_count(), 0);
        assert_eq!(reg.archetypes_count(), 1);
        assert!(reg.archetypes().all(ArchetypeStorage::is_empty));
    }

    #[test]
    fn test_chunk_access_with_foreign_archetype_id() {
        let (mut reg, mass, _) = registry();
        let (mut other, other_mass, other_name) = registry();

        let light = ComponentAndTagSets::new().with_component(other_mass);
        other.create(&light, 1);
        other.create(&light.with_component(other_name), 1);
        let foreign = ArchetypeId::from_index(1);
        assert!(other.archetype(foreign).is_some());

        reg.create(&ComponentAndTagSets::new().with_component(mass), 1);
        assert!(reg.archetype(foreign).is_none());
        assert_eq!(reg.used_chunks_count(foreign), 0);
        assert!(!reg.fetch_component_offsets(foreign, &[mass], &mut [0]));

        let mut out = [std::ptr::null_mut(); 1];
        assert!(reg.fetch_chunk_data(foreign, 0, &[0], &mut out).is_empty());
        assert!(out[0].is_null());

        let own = ArchetypeId::from_index(0);
        assert_eq!(reg.used_chunks_count(own), 1);
        assert!(reg.fetch_component_offsets(own, &[mass], &mut [0]));
    }

    #[test]
    fn test_sort_and_map() {
        let mut types: Vec<ComponentType> = [7, 2, 5].into_iter().map(ComponentType::from_value).collect();
        let mut mapping = [0u8; 3];

        EntityRegistry::sort_and_map(&mut types, &mut mapping);

        let values: Vec<u32> = types.iter().map(|c| c.value()).collect();
        assert_eq!(values, vec![2, 5, 7]);
        assert_eq!(mapping, [1, 2, 0]);
    }

    #[test]
    fn test_typed_access_checks_membership() {
        let (mut reg, mass, _) = registry();
        let e = reg.create(&ComponentAndTagSets::new().with_component(mass), 1);

        *reg.get_mut::<Mass>(e).unwrap() = Mass(2.5);
        assert_eq!(reg.get::<Mass>(e), Some(&Mass(2.5)));
        assert!(reg.get::<Name>(e).is_none());
        assert!(reg.get::<u64>(e).is_none());
    }
}
