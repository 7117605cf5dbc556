//! # Type Registry
//!
//! Catalog of component and tag kinds. Built once at startup, then shared
//! (read-only) by every entity registry that uses it.

use std::any::TypeId;
use std::collections::HashMap;

use super::component::{Component, ComponentTypeDesc, Tag, TagTypeDesc};
use super::tuple::TypeList;
use super::type_set::ComponentAndTagSets;
use super::types::{ComponentType, TagType, TypeKey, MAX_COMPONENT_TYPES};
use crate::error::{EcsError, EcsResult};
use crate::memory::CHUNK_ALIGNMENT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeKind {
    Component,
    Tag,
}

/// Registered kind and handle value of a type key.
#[derive(Clone, Copy, Debug)]
struct AnyTypeInfo {
    id: u32,
    kind: TypeKind,
}

/// Either handle, as resolved from a [`TypeKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnyType {
    /// The key names a component.
    Component(ComponentType),
    /// The key names a tag.
    Tag(TagType),
}

/// Maps type keys to handles and descriptors.
///
/// Handle values start at 1 and index directly into the descriptor tables.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeKey, AnyTypeInfo>,
    components: Vec<ComponentTypeDesc>,
    tags: Vec<TagTypeDesc>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component kind.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateType`] if the key is already registered (as either kind)
    /// - [`EcsError::TooManyTypes`] if the component table is full
    /// - [`EcsError::InvalidDescriptor`] for a non power-of-two alignment or
    ///   one above [`CHUNK_ALIGNMENT`]
    pub fn register_component(&mut self, desc: ComponentTypeDesc) -> EcsResult<ComponentType> {
        if self.components.len() + 1 >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyTypes {
                kind: "component",
                max: MAX_COMPONENT_TYPES - 1,
            });
        }

        if !desc.alignment().is_power_of_two() || desc.alignment() as usize > CHUNK_ALIGNMENT {
            return Err(EcsError::InvalidDescriptor {
                name: desc.key().name().to_owned(),
                reason: format!(
                    "alignment {} must be a power of two no larger than {CHUNK_ALIGNMENT}",
                    desc.alignment()
                ),
            });
        }

        if self.types.contains_key(desc.key()) {
            return Err(EcsError::DuplicateType {
                name: desc.key().name().to_owned(),
            });
        }

        let handle = ComponentType::from_value(next_handle_value(self.components.len()));
        self.types.insert(
            desc.key().clone(),
            AnyTypeInfo {
                id: handle.value(),
                kind: TypeKind::Component,
            },
        );
        self.components.push(desc);

        Ok(handle)
    }

    /// Returns the existing handle for the descriptor's key, or registers it.
    ///
    /// # Errors
    ///
    /// Same as [`TypeRegistry::register_component`]; additionally
    /// [`EcsError::KindMismatch`] if the key is registered as a tag.
    pub fn get_or_register_component(
        &mut self,
        desc: ComponentTypeDesc,
    ) -> EcsResult<ComponentType> {
        match self.resolve(desc.key()) {
            Some(AnyType::Component(component)) => Ok(component),
            Some(AnyType::Tag(_)) => Err(EcsError::KindMismatch {
                name: desc.key().name().to_owned(),
                expected: "component",
            }),
            None => self.register_component(desc),
        }
    }

    /// Registers a tag kind.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateType`] if the key is already registered (as either kind)
    /// - [`EcsError::TooManyTypes`] if the tag table is full
    pub fn register_tag(&mut self, desc: TagTypeDesc) -> EcsResult<TagType> {
        if self.tags.len() + 1 >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyTypes {
                kind: "tag",
                max: MAX_COMPONENT_TYPES - 1,
            });
        }

        if self.types.contains_key(desc.key()) {
            return Err(EcsError::DuplicateType {
                name: desc.key().name().to_owned(),
            });
        }

        let handle = TagType::from_value(next_handle_value(self.tags.len()));
        self.types.insert(
            desc.key().clone(),
            AnyTypeInfo {
                id: handle.value(),
                kind: TypeKind::Tag,
            },
        );
        self.tags.push(desc);

        Ok(handle)
    }

    /// Returns the existing handle for the descriptor's key, or registers it.
    ///
    /// # Errors
    ///
    /// Same as [`TypeRegistry::register_tag`]; additionally
    /// [`EcsError::KindMismatch`] if the key is registered as a component.
    pub fn get_or_register_tag(&mut self, desc: TagTypeDesc) -> EcsResult<TagType> {
        match self.resolve(desc.key()) {
            Some(AnyType::Tag(tag)) => Ok(tag),
            Some(AnyType::Component(_)) => Err(EcsError::KindMismatch {
                name: desc.key().name().to_owned(),
                expected: "tag",
            }),
            None => self.register_tag(desc),
        }
    }

    /// Registers a Rust component type.
    ///
    /// # Errors
    ///
    /// Same as [`TypeRegistry::register_component`].
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentType> {
        self.register_component(ComponentTypeDesc::of::<T>())
    }

    /// Registers a Rust tag type.
    ///
    /// # Errors
    ///
    /// Same as [`TypeRegistry::register_tag`].
    pub fn register_tag_type<T: Tag>(&mut self) -> EcsResult<TagType> {
        self.register_tag(TagTypeDesc::of::<T>())
    }

    /// Looks up a component by key. `None` if absent or registered as a tag.
    #[must_use]
    pub fn find_component(&self, key: &TypeKey) -> Option<ComponentType> {
        match self.resolve(key)? {
            AnyType::Component(component) => Some(component),
            AnyType::Tag(_) => None,
        }
    }

    /// Looks up a tag by key. `None` if absent or registered as a component.
    #[must_use]
    pub fn find_tag(&self, key: &TypeKey) -> Option<TagType> {
        match self.resolve(key)? {
            AnyType::Tag(tag) => Some(tag),
            AnyType::Component(_) => None,
        }
    }

    /// Looks up a key of either kind.
    #[must_use]
    pub fn resolve(&self, key: &TypeKey) -> Option<AnyType> {
        let info = self.types.get(key)?;
        Some(match info.kind {
            TypeKind::Component => AnyType::Component(ComponentType::from_value(info.id)),
            TypeKind::Tag => AnyType::Tag(TagType::from_value(info.id)),
        })
    }

    /// Component handle of a Rust type.
    ///
    /// Unlike [`TypeRegistry::find_component`], this also checks that the
    /// registered descriptor really describes `T`, so the handle may be used
    /// for typed access.
    #[must_use]
    pub fn component<T: 'static>(&self) -> Option<ComponentType> {
        let component = self.find_component(&TypeKey::of::<T>())?;
        let desc = self.get_component_type_desc(component);
        (desc.rust_type() == Some(TypeId::of::<T>())).then_some(component)
    }

    /// Tag handle of a Rust type.
    #[must_use]
    pub fn tag<T: 'static>(&self) -> Option<TagType> {
        self.find_tag(&TypeKey::of::<T>())
    }

    /// Descriptor of a registered component.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not issued by this registry.
    #[must_use]
    pub fn get_component_type_desc(&self, component: ComponentType) -> &ComponentTypeDesc {
        &self.components[component.value() as usize - 1]
    }

    /// Descriptor of a registered tag.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not issued by this registry.
    #[must_use]
    pub fn get_tag_type_desc(&self, tag: TagType) -> &TagTypeDesc {
        &self.tags[tag.value() as usize - 1]
    }

    /// Builds the signature for a tuple of registered Rust types, each
    /// resolved as a component or a tag.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredType`] for a tuple element that is not
    /// registered, or whose component descriptor does not match the Rust type.
    pub fn make_type_sets<L: TypeList>(&self) -> EcsResult<ComponentAndTagSets> {
        let mut sets = ComponentAndTagSets::new();
        L::collect(self, &mut sets)?;
        Ok(sets)
    }

    /// Number of registered component kinds.
    #[must_use]
    pub fn components_count(&self) -> usize {
        self.components.len()
    }

    /// Number of registered tag kinds.
    #[must_use]
    pub fn tags_count(&self) -> usize {
        self.tags.len()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn next_handle_value(registered: usize) -> u32 {
    (registered + 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    #[allow(dead_code)]
    struct U8Component(u8);

    #[derive(Default)]
    #[allow(dead_code)]
    struct I32Component(i32);

    #[derive(Default)]
    #[allow(dead_code)]
    struct F64Component(f64);

    #[allow(dead_code)]
    struct TagA;
    impl Tag for TagA {}

    #[allow(dead_code)]
    struct TagB;
    impl Tag for TagB {}

    #[test]
    fn test_registration() {
        let mut types = TypeRegistry::new();

        let a = types.register::<U8Component>().unwrap();
        let b = types.register::<I32Component>().unwrap();
        let c = types.register::<F64Component>().unwrap();
        assert_eq!(a.value(), 1);
        assert!(a < b && b < c);

        assert!(matches!(
            types.register::<U8Component>(),
            Err(EcsError::DuplicateType { .. })
        ));

        let ta = types.register_tag_type::<TagA>().unwrap();
        let tb = types.register_tag_type::<TagB>().unwrap();
        assert_eq!(ta.value(), 1);
        assert_eq!(tb.value(), 2);
        assert!(types.register_tag_type::<TagA>().is_err());

        assert_eq!(types.components_count(), 3);
        assert_eq!(types.tags_count(), 2);
    }

    #[test]
    fn test_find_respects_kind() {
        let mut types = TypeRegistry::new();
        let component = types.register::<U8Component>().unwrap();
        let tag = types.register_tag_type::<TagA>().unwrap();

        assert_eq!(types.find_component(&TypeKey::of::<U8Component>()), Some(component));
        assert_eq!(types.find_tag(&TypeKey::of::<U8Component>()), None);
        assert_eq!(types.find_tag(&TypeKey::of::<TagA>()), Some(tag));
        assert_eq!(types.find_component(&TypeKey::of::<TagA>()), None);
        assert_eq!(types.find_component(&TypeKey::of::<I32Component>()), None);
    }

    #[test]
    fn test_get_or_register() {
        let mut types = TypeRegistry::new();
        let first = types.get_or_register_component(ComponentTypeDesc::of::<I32Component>()).unwrap();
        let second = types.get_or_register_component(ComponentTypeDesc::of::<I32Component>()).unwrap();
        assert_eq!(first, second);

        let tag = types.get_or_register_tag(TagTypeDesc::of::<TagA>()).unwrap();
        assert_eq!(types.get_or_register_tag(TagTypeDesc::of::<TagA>()).unwrap(), tag);

        assert!(matches!(
            types.get_or_register_tag(TagTypeDesc::named(TypeKey::of::<I32Component>())),
            Err(EcsError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_capacity_limit() {
        let mut types = TypeRegistry::new();
        for i in 0..MAX_COMPONENT_TYPES - 1 {
            types
                .register_component(ComponentTypeDesc::from_raw(TypeKey::named(format!("raw{i}")), 4, 4))
                .unwrap();
        }

        let overflow = types.register_component(ComponentTypeDesc::from_raw(TypeKey::named("one_too_many"), 4, 4));
        assert!(matches!(overflow, Err(EcsError::TooManyTypes { .. })));
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let mut types = TypeRegistry::new();
        let odd = ComponentTypeDesc::from_raw(TypeKey::named("odd"), 6, 3);
        assert!(matches!(types.register_component(odd), Err(EcsError::InvalidDescriptor { .. })));

        let huge = ComponentTypeDesc::from_raw(TypeKey::named("huge"), 128, 128);
        assert!(types.register_component(huge).is_err());
    }

    #[test]
    fn test_typed_lookup_requires_matching_rust_type() {
        let mut types = TypeRegistry::new();
        // A byte-only component that happens to carry the Rust type's name.
        let raw = ComponentTypeDesc::from_raw(TypeKey::of::<U8Component>(), 1, 1);
        let handle = types.register_component(raw).unwrap();

        assert_eq!(types.find_component(&TypeKey::of::<U8Component>()), Some(handle));
        assert_eq!(types.component::<U8Component>(), None);
    }

    #[test]
    fn test_descriptors() {
        let mut types = TypeRegistry::new();
        let c = types.register::<F64Component>().unwrap();
        let t = types.register_tag_type::<TagB>().unwrap();

        let desc = types.get_component_type_desc(c);
        assert_eq!(desc.size(), 8);
        assert_eq!(desc.alignment(), 8);
        assert_eq!(types.get_tag_type_desc(t).key, TypeKey::of::<TagB>());
    }
}
