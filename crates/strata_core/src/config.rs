//! # Registry Configuration
//!
//! Tuning knobs for an [`EntityRegistry`](crate::ecs::EntityRegistry),
//! loaded once at startup from TOML.
//!
//! ```toml
//! chunk_size = 16384
//! initial_modification_id = 0
//! entity_capacity = 100000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Default size in bytes of one archetype chunk.
pub const DEFAULT_CHUNK_SIZE: u32 = 1 << 14;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: u32 = 1 << 10;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: u32 = 1 << 20;

/// Largest number of entities the lookup table may reserve up front.
pub const MAX_ENTITY_CAPACITY: usize = 1 << 24;

/// Configuration for an entity registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Size in bytes of each chunk. Must be a power of two.
    pub chunk_size: u32,
    /// Modification id the registry starts with.
    pub initial_modification_id: u64,
    /// Number of entities the lookup table reserves up front. At most
    /// [`MAX_ENTITY_CAPACITY`].
    pub entity_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_modification_id: 0,
            entity_capacity: 0,
        }
    }
}

impl RegistryConfig {
    /// Small chunks, useful to exercise chunk boundaries with few entities.
    #[must_use]
    pub const fn small_chunks() -> Self {
        Self {
            chunk_size: MIN_CHUNK_SIZE,
            initial_modification_id: 0,
            entity_capacity: 0,
        }
    }

    /// Large chunks for archetypes streamed in bulk (e.g. render data).
    #[must_use]
    pub const fn large_chunks() -> Self {
        Self {
            chunk_size: 1 << 16,
            initial_modification_id: 0,
            entity_capacity: 1 << 16,
        }
    }

    /// Parses and validates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConfigParse`] for malformed TOML and
    /// [`EcsError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EcsError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`RegistryConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EcsError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks that every value is within its supported range.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> EcsResult<()> {
        if !self.chunk_size.is_power_of_two() {
            return Err(EcsError::InvalidConfig(format!(
                "chunk_size {} is not a power of two",
                self.chunk_size
            )));
        }

        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(EcsError::InvalidConfig(format!(
                "chunk_size {} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                self.chunk_size
            )));
        }

        if self.entity_capacity > MAX_ENTITY_CAPACITY {
            return Err(EcsError::InvalidConfig(format!(
                "entity_capacity {} above {MAX_ENTITY_CAPACITY}",
                self.entity_capacity
            )));
        }

        Ok(())
    }
}
