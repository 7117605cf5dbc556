//! # STRATA Core
//!
//! Archetype-based Entity Component System (ECS) storage engine:
//! - Chunked, column-major component storage
//! - O(1) entity lookup, create and destroy
//! - Chunk-at-a-time typed queries, safe to run from many threads at once
//!
//! ## Architecture Rules
//!
//! 1. **The registry owns all component memory** - entities are plain ids
//! 2. **Dense archetypes** - live entities always occupy `[0, len)`
//! 3. **Single writer** - structural changes need `&mut EntityRegistry`
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{EntityRegistry, TypeRegistry};
//!
//! #[derive(Clone, Copy, Default)]
//! struct Position { x: f32, y: f32, z: f32 }
//!
//! #[derive(Clone, Copy, Default)]
//! struct Velocity { x: f32, y: f32, z: f32 }
//!
//! let mut types = TypeRegistry::new();
//! types.register::<Position>().unwrap();
//! types.register::<Velocity>().unwrap();
//!
//! let mut registry = EntityRegistry::new(Arc::new(types));
//! let first = registry.create_typed::<(Position, Velocity)>(3).unwrap();
//! registry.get_mut::<Velocity>(first).unwrap().x = 1.0;
//!
//! registry.range_mut::<(Position, Velocity)>().unwrap().for_each_chunk(|mut chunk| {
//!     let (positions, velocities) = chunk.columns();
//!     for (p, v) in positions.iter_mut().zip(velocities.iter()) {
//!         p.x += v.x;
//!         p.y += v.y;
//!         p.z += v.z;
//!     }
//! });
//!
//! assert_eq!(registry.get::<Position>(first).unwrap().x, 1.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::RegistryConfig;
pub use ecs::{
    ArchetypeId, ArchetypeStorage, ChunkMut, ChunkView, Component, ComponentAndTagSets, ComponentType,
    ComponentTypeDesc, Deferred, Entity, EntityRegistry, Range, RangeMut, Tag, TagType, TagTypeDesc,
    TypeKey, TypeRegistry,
};
pub use error::{EcsError, EcsResult};
pub use memory::{ChunkPool, PooledArray};
