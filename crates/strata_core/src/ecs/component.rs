//! # Component and Tag Descriptors
//!
//! A component kind is described by its layout and a small table of
//! function pointers (create, destroy, relocate) attached at registration.
//! Tags carry identity only and are never stored in chunks.

// SAFETY: The function tables operate on type-erased chunk memory.
// Each generated function documents the contract it relies on.
#![allow(unsafe_code)]

use std::any::TypeId;

use super::types::TypeKey;

/// Default-constructs `count` values at `dst`.
pub type CreateFn = unsafe fn(dst: *mut u8, count: usize);

/// Drops `count` values at `dst` in place.
pub type DestroyFn = unsafe fn(dst: *mut u8, count: usize);

/// Moves `count` values from `src` into uninitialized memory at `dst`.
/// Afterwards `src` is logically uninitialized.
pub type RelocateFn = unsafe fn(dst: *mut u8, src: *mut u8, count: usize);

/// Marker trait for types stored as components.
///
/// Implemented for every `Default + Send + Sync + 'static` type.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position { x: f32, y: f32, z: f32 }
///
/// let position = types.register::<Position>()?;
/// ```
pub trait Component: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Component for T {}

/// Marker trait for tag types.
///
/// Tags are attached to an entity's signature but own no data.
pub trait Tag: 'static {}

/// Describes a component kind to the [`TypeRegistry`](super::TypeRegistry).
///
/// Fields are private so a descriptor built for a Rust type always agrees
/// with that type's layout.
#[derive(Clone, Debug)]
pub struct ComponentTypeDesc {
    key: TypeKey,
    size: u32,
    alignment: u32,
    create: Option<CreateFn>,
    destroy: Option<DestroyFn>,
    relocate: Option<RelocateFn>,
    rust_type: Option<TypeId>,
}

impl ComponentTypeDesc {
    /// Descriptor for a Rust component type.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of<T: Component>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            size: std::mem::size_of::<T>() as u32,
            alignment: std::mem::align_of::<T>() as u32,
            create: Some(create_default::<T> as CreateFn),
            destroy: if std::mem::needs_drop::<T>() {
                Some(destroy_in_place::<T> as DestroyFn)
            } else {
                None
            },
            relocate: None,
            rust_type: Some(TypeId::of::<T>()),
        }
    }

    /// Descriptor for a plain-bytes component known only by name.
    ///
    /// Values start zeroed, are copied bytewise and need no destructor.
    #[must_use]
    pub fn from_raw(key: TypeKey, size: u32, alignment: u32) -> Self {
        Self {
            key,
            size,
            alignment,
            create: None,
            destroy: None,
            relocate: None,
            rust_type: None,
        }
    }

    /// Replaces the constructor.
    ///
    /// # Safety
    ///
    /// `create` must fully initialize `count` values of this descriptor's
    /// layout at `dst`.
    #[must_use]
    pub unsafe fn with_create(mut self, create: CreateFn) -> Self {
        self.create = Some(create);
        self
    }

    /// Replaces the destructor.
    ///
    /// # Safety
    ///
    /// `destroy` must accept `count` values previously produced by this
    /// descriptor's constructor or relocation.
    #[must_use]
    pub unsafe fn with_destroy(mut self, destroy: DestroyFn) -> Self {
        self.destroy = Some(destroy);
        self
    }

    /// Replaces the relocation function.
    ///
    /// # Safety
    ///
    /// `relocate` must move `count` values so that `dst` holds them and
    /// `src` no longer needs destroying.
    #[must_use]
    pub unsafe fn with_relocate(mut self, relocate: RelocateFn) -> Self {
        self.relocate = Some(relocate);
        self
    }

    /// Identity of the kind.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Size of one value in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Alignment of one value in bytes.
    #[inline]
    #[must_use]
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// The Rust type behind the descriptor, if any. Typed access is only
    /// granted when it matches.
    #[inline]
    #[must_use]
    pub fn rust_type(&self) -> Option<TypeId> {
        self.rust_type
    }

    /// Whether values need a destructor call.
    #[inline]
    #[must_use]
    pub fn needs_destroy(&self) -> bool {
        self.destroy.is_some()
    }

    /// Function table used by archetype storage.
    #[must_use]
    pub fn fn_table(&self) -> ComponentFnTable {
        ComponentFnTable {
            size: self.size as usize,
            create: self.create,
            destroy: self.destroy,
            relocate: self.relocate,
        }
    }
}

/// Describes a tag kind to the [`TypeRegistry`](super::TypeRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagTypeDesc {
    /// Identity of the kind.
    pub key: TypeKey,
}

impl TagTypeDesc {
    /// Descriptor for a Rust tag type.
    #[must_use]
    pub fn of<T: Tag>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
        }
    }

    /// Descriptor for a tag known only by name.
    #[must_use]
    pub fn named(key: TypeKey) -> Self {
        Self { key }
    }

    /// Identity of the kind.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &TypeKey {
        &self.key
    }
}

/// Per-column operations of an archetype, with the fallbacks applied.
#[derive(Clone, Copy, Debug)]
pub struct ComponentFnTable {
    size: usize,
    create: Option<CreateFn>,
    destroy: Option<DestroyFn>,
    relocate: Option<RelocateFn>,
}

impl ComponentFnTable {
    /// Constructs `count` values at `dst`.
    ///
    /// # Safety
    ///
    /// `dst` must point to `count * size` writable, suitably aligned bytes
    /// holding no live values.
    pub unsafe fn do_create(&self, dst: *mut u8, count: usize) {
        match self.create {
            Some(create) => create(dst, count),
            None => std::ptr::write_bytes(dst, 0, self.size * count),
        }
    }

    /// Destroys `count` values at `dst`.
    ///
    /// # Safety
    ///
    /// `dst` must point to `count` live values of this component.
    pub unsafe fn do_destroy(&self, dst: *mut u8, count: usize) {
        if let Some(destroy) = self.destroy {
            destroy(dst, count);
        }
    }

    /// Moves `count` values from `src` into empty slots at `dst`.
    ///
    /// # Safety
    ///
    /// `src` must hold `count` live values, `dst` must hold none, and the
    /// two ranges must not overlap. `src` is dead afterwards.
    pub unsafe fn do_relocate(&self, dst: *mut u8, src: *mut u8, count: usize) {
        match self.relocate {
            Some(relocate) => relocate(dst, src, count),
            None => std::ptr::copy_nonoverlapping(src, dst, self.size * count),
        }
    }

    /// Replaces the values at `dst` with the ones moved out of `src`.
    ///
    /// # Safety
    ///
    /// Both ranges must hold `count` live values and must not overlap.
    /// `src` is dead afterwards.
    pub unsafe fn do_relocate_assign(&self, dst: *mut u8, src: *mut u8, count: usize) {
        self.do_destroy(dst, count);
        self.do_relocate(dst, src, count);
    }
}

/// # Safety
///
/// `dst` must be valid for `count` aligned writes of `T`.
unsafe fn create_default<T: Default>(dst: *mut u8, count: usize) {
    let dst = dst.cast::<T>();
    for i in 0..count {
        dst.add(i).write(T::default());
    }
}

/// # Safety
///
/// `dst` must point to `count` initialized values of `T`.
unsafe fn destroy_in_place<T>(dst: *mut u8, count: usize) {
    let slice = std::ptr::slice_from_raw_parts_mut(dst.cast::<T>(), count);
    std::ptr::drop_in_place(slice);
}
