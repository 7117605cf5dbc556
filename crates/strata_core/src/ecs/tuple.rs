//! # Type Tuples
//!
//! Tuples of Rust types stand in for variadic type lists:
//! - [`TypeList`]: a signature made of components and tags
//! - [`ComponentTuple`]: the columns a range yields per chunk
//! - [`Bundle`]: component values written into a new or existing entity

// SAFETY: Column pointers handed to `ComponentTuple` come from archetype
// storage, which guarantees type, alignment and row count.
#![allow(unsafe_code)]

use super::component::Component;
use super::entity::Entity;
use super::registry::EntityRegistry;
use super::type_registry::{AnyType, TypeRegistry};
use super::type_set::ComponentAndTagSets;
use super::types::{ComponentType, TypeKey};
use crate::error::{EcsError, EcsResult};

/// Largest tuple accepted by ranges and bundles.
pub const MAX_TUPLE_LEN: usize = 8;

/// A tuple of registered types, each resolved as a component or a tag.
pub trait TypeList: 'static {
    /// Adds every element to `sets`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`] for an element that is unknown, or a
    /// component whose descriptor does not describe the Rust type.
    fn collect(types: &TypeRegistry, sets: &mut ComponentAndTagSets) -> EcsResult<()>;
}

/// A tuple of component types iterated column by column.
pub trait ComponentTuple: TypeList {
    /// Number of elements.
    const LEN: usize;

    /// Shared slices, one per element.
    type Slices<'a>;

    /// Mutable slices, one per element.
    type SlicesMut<'a>;

    /// Writes the handle of each element, in declaration order, to `out`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`] if an element is not a registered
    /// component of that exact Rust type.
    fn component_types(types: &TypeRegistry, out: &mut [ComponentType]) -> EcsResult<()>;

    /// Builds shared slices from column base pointers.
    ///
    /// # Safety
    ///
    /// `columns[i]` must point to `rows` live, aligned values of element `i`,
    /// not mutated for `'a`.
    unsafe fn slices<'a>(columns: &[*mut u8], rows: usize) -> Self::Slices<'a>;

    /// Builds mutable slices from column base pointers.
    ///
    /// # Safety
    ///
    /// Same as [`ComponentTuple::slices`], plus the columns must be distinct
    /// and not otherwise accessed for `'a`.
    unsafe fn slices_mut<'a>(columns: &[*mut u8], rows: usize) -> Self::SlicesMut<'a>;
}

/// A tuple of values: components are written, tags only mark the signature.
pub trait Bundle: TypeList + Send {
    /// Moves each component value into `entity`.
    fn write(self, registry: &mut EntityRegistry, entity: Entity);
}

fn collect_one<T: 'static>(types: &TypeRegistry, sets: &mut ComponentAndTagSets) -> EcsResult<()> {
    let key = TypeKey::of::<T>();
    match types.resolve(&key) {
        Some(AnyType::Tag(tag)) => {
            sets.tags.add(tag);
            Ok(())
        }
        Some(AnyType::Component(_)) => {
            sets.components.add(typed_component::<T>(types)?);
            Ok(())
        }
        None => Err(EcsError::UnregisteredType {
            name: key.name().to_owned(),
        }),
    }
}

fn typed_component<T: 'static>(types: &TypeRegistry) -> EcsResult<ComponentType> {
    types
        .component::<T>()
        .ok_or_else(|| EcsError::UnregisteredType {
            name: TypeKey::of::<T>().name().to_owned(),
        })
}

impl TypeList for () {
    fn collect(_types: &TypeRegistry, _sets: &mut ComponentAndTagSets) -> EcsResult<()> {
        Ok(())
    }
}

impl ComponentTuple for () {
    const LEN: usize = 0;
    type Slices<'a> = ();
    type SlicesMut<'a> = ();

    fn component_types(_types: &TypeRegistry, _out: &mut [ComponentType]) -> EcsResult<()> {
        Ok(())
    }

    unsafe fn slices<'a>(_columns: &[*mut u8], _rows: usize) -> Self::Slices<'a> {}

    unsafe fn slices_mut<'a>(_columns: &[*mut u8], _rows: usize) -> Self::SlicesMut<'a> {}
}

impl Bundle for () {
    fn write(self, _registry: &mut EntityRegistry, _entity: Entity) {}
}

macro_rules! impl_tuple {
    ($len:expr; $($name:ident $index:tt),+) => {
        impl<$($name: 'static),+> TypeList for ($($name,)+) {
            fn collect(types: &TypeRegistry, sets: &mut ComponentAndTagSets) -> EcsResult<()> {
                $(collect_one::<$name>(types, sets)?;)+
                Ok(())
            }
        }

        impl<$($name: Component),+> ComponentTuple for ($($name,)+) {
            const LEN: usize = $len;
            type Slices<'a> = ($(&'a [$name],)+);
            type SlicesMut<'a> = ($(&'a mut [$name],)+);

            fn component_types(types: &TypeRegistry, out: &mut [ComponentType]) -> EcsResult<()> {
                $(out[$index] = typed_component::<$name>(types)?;)+
                Ok(())
            }

            unsafe fn slices<'a>(columns: &[*mut u8], rows: usize) -> Self::Slices<'a> {
                ($(std::slice::from_raw_parts(columns[$index].cast::<$name>().cast_const(), rows),)+)
            }

            unsafe fn slices_mut<'a>(columns: &[*mut u8], rows: usize) -> Self::SlicesMut<'a> {
                ($(std::slice::from_raw_parts_mut(columns[$index].cast::<$name>(), rows),)+)
            }
        }

        impl<$($name: Send + 'static),+> Bundle for ($($name,)+) {
            fn write(self, registry: &mut EntityRegistry, entity: Entity) {
                $(
                    if let Some(slot) = registry.get_mut::<$name>(entity) {
                        *slot = self.$index;
                    }
                )+
            }
        }
    };
}

impl_tuple!(1; A 0);
impl_tuple!(2; A 0, B 1);
impl_tuple!(3; A 0, B 1, C 2);
impl_tuple!(4; A 0, B 1, C 2, D 3);
impl_tuple!(5; A 0, B 1, C 2, D 3, E 4);
impl_tuple!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_tuple!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_tuple!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
