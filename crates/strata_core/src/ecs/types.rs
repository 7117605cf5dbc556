//! # Type Identity
//!
//! [`TypeKey`] names a kind of component or tag independently of any
//! registry. [`ComponentType`] and [`TagType`] are the small handles a
//! [`TypeRegistry`](super::TypeRegistry) assigns to those keys.

use std::borrow::Cow;
use std::fmt;

/// Maximum number of component types (and, separately, tag types) a
/// registry can hold. Handle values live in `1..MAX_COMPONENT_TYPES`.
pub const MAX_COMPONENT_TYPES: usize = 128;

/// Name-based identifier for a component or tag kind.
///
/// Rust types use their [`std::any::type_name`]; types defined at runtime
/// (scripts, data files) pick any unique name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(Cow<'static, str>);

impl TypeKey {
    /// Key of a Rust type.
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// Key for a type known only by name.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A handle that can be stored in a [`TypeSet`](super::TypeSet).
pub trait TypeHandle: Copy + Eq + Ord + fmt::Debug {
    /// Bit index of the handle inside a type set.
    fn index(self) -> usize;

    /// Rebuilds a handle from a bit index.
    fn from_index(index: usize) -> Self;
}

macro_rules! type_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Raw handle value. Never zero.
            #[inline]
            #[must_use]
            pub const fn value(self) -> u32 {
                self.0
            }

            #[inline]
            pub(crate) const fn from_value(value: u32) -> Self {
                Self(value)
            }
        }

        impl TypeHandle for $name {
            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            #[allow(clippy::cast_possible_truncation)]
            fn from_index(index: usize) -> Self {
                debug_assert!(index > 0 && index < MAX_COMPONENT_TYPES);
                Self(index as u32)
            }
        }
    };
}

type_handle!(
    /// Handle of a registered component type.
    ComponentType
);

type_handle!(
    /// Handle of a registered tag type.
    TagType
);
