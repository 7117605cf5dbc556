//! # ECS Error Types
//!
//! Errors surfaced by registration, typed lookups and configuration.
//! Absence (dead entity, missing component) is reported through `Option`
//! and `bool`, never through this type.

use thiserror::Error;

/// Errors that can occur in the ECS storage engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The type key was already registered as a component or a tag.
    #[error("type already registered: {name}")]
    DuplicateType {
        /// Name of the type key.
        name: String,
    },

    /// The registry has no more handles for this kind of type.
    #[error("too many {kind} types registered (max {max})")]
    TooManyTypes {
        /// "component" or "tag".
        kind: &'static str,
        /// The limit that was hit.
        max: usize,
    },

    /// A typed API was used with a type that was never registered.
    #[error("type not registered: {name}")]
    UnregisteredType {
        /// Name of the type key.
        name: String,
    },

    /// The type is registered, but as the other kind.
    #[error("type {name} is not registered as a {expected}")]
    KindMismatch {
        /// Name of the type key.
        name: String,
        /// The kind the caller asked for.
        expected: &'static str,
    },

    /// A typed range requested the same component more than once.
    #[error("component {name} appears more than once in a range")]
    DuplicateQueryComponent {
        /// Name of the repeated component.
        name: String,
    },

    /// A component descriptor has an unusable layout.
    #[error("invalid descriptor for {name}: {reason}")]
    InvalidDescriptor {
        /// Name of the type key.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(String),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
