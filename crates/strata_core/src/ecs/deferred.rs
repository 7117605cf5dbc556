//! # Deferred Commands
//!
//! Structural changes recorded while the registry is being iterated, and
//! replayed once iteration is over.

use super::entity::Entity;
use super::registry::EntityRegistry;
use super::tuple::Bundle;
use super::type_set::ComponentAndTagSets;
use crate::error::EcsResult;

type BundleCommand = Box<dyn FnOnce(&mut EntityRegistry) -> EcsResult<()> + Send>;

enum Command {
    Create { sets: ComponentAndTagSets, count: u32 },
    Add { entity: Entity, sets: ComponentAndTagSets },
    Remove { entity: Entity, sets: ComponentAndTagSets },
    Destroy { entity: Entity },
    Bundle(BundleCommand),
}

/// Buffer of structural commands, applied in recording order.
#[derive(Default)]
pub struct Deferred {
    commands: Vec<Command>,
}

impl Deferred {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the creation of `count` entities.
    pub fn create(&mut self, sets: &ComponentAndTagSets, count: u32) {
        self.commands.push(Command::Create { sets: *sets, count });
    }

    /// Records the creation of one entity holding `values`.
    pub fn create_bundle<B: Bundle>(&mut self, values: B) {
        self.commands.push(Command::Bundle(Box::new(move |registry: &mut EntityRegistry| {
            registry.create_bundle(values).map(|_| ())
        })));
    }

    /// Records adding components and tags to `entity`.
    pub fn add(&mut self, entity: Entity, sets: &ComponentAndTagSets) {
        self.commands.push(Command::Add { entity, sets: *sets });
    }

    /// Records adding `values` to `entity`.
    pub fn add_bundle<B: Bundle>(&mut self, entity: Entity, values: B) {
        self.commands.push(Command::Bundle(Box::new(move |registry: &mut EntityRegistry| {
            registry.add_bundle(entity, values)
        })));
    }

    /// Records removing components and tags from `entity`.
    pub fn remove(&mut self, entity: Entity, sets: &ComponentAndTagSets) {
        self.commands.push(Command::Remove { entity, sets: *sets });
    }

    /// Records the destruction of `entity`.
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy { entity });
    }

    /// Number of pending commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Checks if no command is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops every pending command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Replays the commands on `registry` and empties the buffer.
    ///
    /// # Errors
    ///
    /// The first error returned by a bundle command. Commands after it are
    /// dropped, commands before it stay applied.
    pub fn apply(&mut self, registry: &mut EntityRegistry) -> EcsResult<()> {
        tracing::debug!(commands = self.commands.len(), "applying deferred commands");

        for command in self.commands.drain(..) {
            match command {
                Command::Create { sets, count } => {
                    registry.create(&sets, count);
                }
                Command::Add { entity, sets } => registry.add(entity, &sets),
                Command::Remove { entity, sets } => registry.remove(entity, &sets),
                Command::Destroy { entity } => registry.destroy(entity),
                Command::Bundle(command) => command(registry)?,
            }
        }

        Ok(())
    }
}

impl Drop for Deferred {
    fn drop(&mut self) {
        if !self.commands.is_empty() {
            tracing::warn!(
                commands = self.commands.len(),
                "deferred buffer dropped with pending commands"
            );
        }
    }
}
