//! # Migration Tests
//!
//! Adding and removing components and tags moves an entity between
//! archetypes while keeping the values it keeps.
//!
//! Run with: cargo test -p strata_core --test migration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_core::{ComponentAndTagSets, Entity, EntityRegistry, RegistryConfig, Tag, TypeRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Name(char);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Audio(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Sprite(u32);

#[allow(dead_code)]
struct Selected;
impl Tag for Selected {}

static LIVE_TRACKERS: AtomicUsize = AtomicUsize::new(0);

/// Counts live instances, to catch leaks and double drops.
#[derive(Debug, PartialEq)]
struct Tracked(String);

impl Default for Tracked {
    fn default() -> Self {
        LIVE_TRACKERS.fetch_add(1, Ordering::SeqCst);
        Self(String::from("default"))
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE_TRACKERS.fetch_sub(1, Ordering::SeqCst);
    }
}

static LIVE_LABELS: AtomicUsize = AtomicUsize::new(0);

/// Same as `Tracked`, with its own counter so tests can run side by side.
#[derive(Debug, PartialEq)]
struct Label(u64);

impl Default for Label {
    fn default() -> Self {
        LIVE_LABELS.fetch_add(1, Ordering::SeqCst);
        Self(0)
    }
}

impl Drop for Label {
    fn drop(&mut self) {
        LIVE_LABELS.fetch_sub(1, Ordering::SeqCst);
    }
}

fn types() -> Arc<TypeRegistry> {
    let mut types = TypeRegistry::new();
    types.register::<Name>().unwrap();
    types.register::<Audio>().unwrap();
    types.register::<Sprite>().unwrap();
    types.register::<Tracked>().unwrap();
    types.register::<Label>().unwrap();
    types.register_tag_type::<Selected>().unwrap();
    Arc::new(types)
}

/// Only the entity's own archetype may hold entities.
fn assert_single_occupant(registry: &EntityRegistry, e: Entity) {
    let own = registry.archetype_of(e).unwrap();
    for (index, storage) in registry.archetypes().enumerate() {
        let expected = u32::from(index == own.index());
        assert_eq!(storage.len(), expected);
        assert_eq!(storage.entities_count_in_chunk(0), expected);
    }
}

#[test]
fn test_remove_component() {
    let mut registry = EntityRegistry::new(types());
    let e = registry.create_typed::<(Name, Audio)>(1).unwrap();

    *registry.get_mut::<Name>(e).unwrap() = Name('A');
    *registry.get_mut::<Audio>(e).unwrap() = Audio(42);
    assert_eq!(registry.archetypes_count(), 1);
    assert_single_occupant(&registry, e);

    // Not present: nothing happens.
    registry.remove_typed::<(Sprite,)>(e).unwrap();
    assert_eq!(registry.get::<Name>(e), Some(&Name('A')));
    assert_eq!(registry.get::<Audio>(e), Some(&Audio(42)));
    assert_eq!(registry.archetypes_count(), 1);
    assert_single_occupant(&registry, e);

    registry.remove_typed::<(Audio,)>(e).unwrap();
    assert_eq!(registry.get::<Name>(e), Some(&Name('A')));
    assert_eq!(registry.get::<Audio>(e), None);
    assert_eq!(registry.archetypes_count(), 2);
    assert_single_occupant(&registry, e);
}

#[test]
fn test_add_keeps_values_and_defaults_new_ones() {
    let mut registry = EntityRegistry::new(types());
    let e = registry.create_typed::<(Name,)>(1).unwrap();
    *registry.get_mut::<Name>(e).unwrap() = Name('Z');

    registry.add_typed::<(Sprite, Selected)>(e).unwrap();

    assert_eq!(registry.get::<Name>(e), Some(&Name('Z')));
    assert_eq!(registry.get::<Sprite>(e), Some(&Sprite(0)));

    let sets = registry.get_component_and_tag_sets(e).unwrap();
    let selected = registry.type_registry().tag::<Selected>().unwrap();
    assert!(sets.tags.contains(selected));

    // Tag changes move the entity without touching its values.
    registry.remove_typed::<(Selected,)>(e).unwrap();
    assert_eq!(registry.get::<Sprite>(e), Some(&Sprite(0)));
    assert_eq!(registry.get::<Name>(e), Some(&Name('Z')));
}

#[test]
fn test_migration_patches_swapped_entity() {
    let mut registry = EntityRegistry::new(types());
    let first = registry.create_typed::<(Name, Audio)>(3).unwrap();
    for (i, c) in ['a', 'b', 'c'].into_iter().enumerate() {
        *registry.get_mut::<Name>(first.offset(i as u64)).unwrap() = Name(c);
    }

    // Moving the first entity out swaps the last one into slot 0.
    registry.add_typed::<(Sprite,)>(first).unwrap();

    let last = first.offset(2);
    assert_eq!(registry.index_of(last), Some(0));
    assert_eq!(registry.get::<Name>(last), Some(&Name('c')));
    assert_eq!(registry.get::<Name>(first), Some(&Name('a')));
    assert_eq!(registry.index_of(first), Some(0));
    assert_ne!(registry.archetype_of(first), registry.archetype_of(last));
}

#[test]
fn test_add_bundle_writes_values() {
    let mut registry = EntityRegistry::new(types());
    let e = registry.create_bundle((Name('q'),)).unwrap();

    registry.add_bundle(e, (Audio(7), Sprite(9))).unwrap();
    assert_eq!(registry.get::<Name>(e), Some(&Name('q')));
    assert_eq!(registry.get::<Audio>(e), Some(&Audio(7)));
    assert_eq!(registry.get::<Sprite>(e), Some(&Sprite(9)));
}

#[test]
fn test_dead_entity_is_ignored() {
    let mut registry = EntityRegistry::new(types());
    let e = registry.create_typed::<(Name,)>(1).unwrap();
    registry.destroy(e);

    let sets = registry.type_registry().make_type_sets::<(Audio,)>().unwrap();
    registry.add(e, &sets);
    registry.remove(e, &sets);
    assert!(registry.add_bundle(e, (Audio(1),)).is_ok());

    assert!(!registry.contains(e));
    assert_eq!(registry.archetypes_count(), 1);
    assert!(registry.get_component_and_tag_sets(e).is_none());
}

#[test]
fn test_owned_components_are_never_leaked_or_dropped_twice() {
    let before = LIVE_TRACKERS.load(Ordering::SeqCst);

    {
        let mut registry = EntityRegistry::new(types());
        let first = registry.create_typed::<(Name, Tracked)>(10).unwrap();
        assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before + 10);

        registry.get_mut::<Tracked>(first.offset(4)).unwrap().0 = String::from("moved");

        // Shuffle entities through archetypes that keep or drop the tracker.
        registry.add_typed::<(Audio,)>(first.offset(4)).unwrap();
        assert_eq!(registry.get::<Tracked>(first.offset(4)).unwrap().0, "moved");

        registry.remove_typed::<(Tracked,)>(first.offset(5)).unwrap();
        assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before + 9);

        registry.add_typed::<(Tracked,)>(first.offset(5)).unwrap();
        assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before + 10);

        registry.destroy(first);
        registry.destroy(first.offset(4));
        assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before + 8);

        registry.remove(first.offset(1), &ComponentAndTagSets::new());
        assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before + 8);
    }

    // Dropping the registry drops what is left.
    assert_eq!(LIVE_TRACKERS.load(Ordering::SeqCst), before);
}

#[test]
fn test_drops_balance_across_chunks() {
    let mut registry = EntityRegistry::with_config(types(), &RegistryConfig::small_chunks()).unwrap();
    let first = registry.create_typed::<(Name, Label)>(300).unwrap();

    let storage = registry.archetype(registry.archetype_of(first).unwrap()).unwrap();
    assert!(storage.used_chunks_count() > 3);
    assert_eq!(LIVE_LABELS.load(Ordering::SeqCst), 300);

    for i in 0..300 {
        registry.get_mut::<Label>(first.offset(i)).unwrap().0 = i;
    }

    // Early slots get refilled from the last chunk.
    for i in (0..300).step_by(3) {
        registry.destroy(first.offset(i));
    }
    assert_eq!(LIVE_LABELS.load(Ordering::SeqCst), 200);

    for i in (0..300).filter(|i| i % 3 != 0) {
        assert_eq!(registry.get::<Label>(first.offset(i)), Some(&Label(i)));
    }

    registry.destroy_all();
    assert_eq!(LIVE_LABELS.load(Ordering::SeqCst), 0);
    assert_eq!(registry.entities_count(), 0);
}
