//! # Memory Management
//!
//! Chunk pool and growable bookkeeping arrays backing the ECS.
//!
//! ## Design Philosophy
//!
//! - Archetype data lives in fixed-size chunks, never in per-entity boxes
//! - Released chunks are recycled before new memory is requested
//! - Chunks are never shrunk while their archetype is alive

mod pool;
mod pooled_array;

pub use pool::{Chunk, ChunkPool, CHUNK_ALIGNMENT};
pub use pooled_array::{next_capacity, PooledArray, GROWTH_FACTOR, MIN_ALLOCATION};
