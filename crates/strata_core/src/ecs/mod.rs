//! # Entity Component System
//!
//! Archetype-based entity storage.
//!
//! ## Design Philosophy
//!
//! - Entities sharing a signature (components + tags) share an archetype
//! - Archetypes store components column by column in fixed-size chunks
//! - Destroying an entity swaps the last one into its slot: no holes
//! - Queries walk whole chunks, never single entities

mod archetype;
mod component;
mod deferred;
mod entity;
mod range;
mod registry;
mod tuple;
mod type_registry;
mod type_set;
mod types;

pub use archetype::{compute_chunk_layout, ArchetypeId, ArchetypeStorage, ChunkLayout};
pub use component::{
    Component, ComponentFnTable, ComponentTypeDesc, CreateFn, DestroyFn, RelocateFn, Tag, TagTypeDesc,
};
pub use deferred::Deferred;
pub use entity::Entity;
pub use range::{ChunkMut, ChunkView, Range, RangeIter, RangeMut};
pub use registry::EntityRegistry;
pub use tuple::{Bundle, ComponentTuple, TypeList, MAX_TUPLE_LEN};
pub use type_registry::{AnyType, TypeRegistry};
pub use type_set::{ComponentAndTagSets, ComponentSet, TagSet, TypeSet};
pub use types::{ComponentType, TagType, TypeHandle, TypeKey, MAX_COMPONENT_TYPES};
