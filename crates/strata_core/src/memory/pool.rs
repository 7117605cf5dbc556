//! # Chunk Pool
//!
//! Fixed-size block allocator for archetype chunks. Chunks released by an
//! archetype go on a free list and are handed out again before any new
//! allocation is made.

// SAFETY: This module owns raw, aligned byte allocations.
// Every allocation is paired with exactly one deallocation in `Drop`.
#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Alignment of every chunk. No component may require more than this.
pub const CHUNK_ALIGNMENT: usize = 64;

/// A fixed-size, [`CHUNK_ALIGNMENT`]-aligned block of bytes.
///
/// Freshly acquired chunks are zero-filled. What lives inside is decided
/// by the archetype that owns the chunk.
pub struct Chunk {
    /// Start of the allocation.
    data: NonNull<u8>,
    /// Layout used for the allocation.
    layout: Layout,
    /// Last modification id stamped on this chunk.
    pub(crate) modification_id: u64,
}

impl Chunk {
    fn allocate(layout: Layout) -> Self {
        // SAFETY: layout has a non-zero size (checked by ChunkPool::new).
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(data) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Self {
            data,
            layout,
            modification_id: 0,
        }
    }

    /// Size of the chunk in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Pointer to the first byte of the chunk.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Mutable pointer to the first byte of the chunk.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Writable base pointer, reached through a shared reference.
    ///
    /// The archetype owning the chunk decides who may write where.
    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    fn reset(&mut self) {
        // SAFETY: the allocation is `layout.size()` bytes long and owned by us.
        unsafe {
            std::ptr::write_bytes(self.data.as_ptr(), 0, self.layout.size());
        }
        self.modification_id = 0;
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: allocated in `Chunk::allocate` with this exact layout.
        unsafe {
            dealloc(self.data.as_ptr(), self.layout);
        }
    }
}

// SAFETY: a chunk exclusively owns its bytes. Values stored in it are
// required to be Send + Sync when they have a Rust type.
unsafe impl Send for Chunk {}
// SAFETY: shared access only hands out shared views of the bytes.
unsafe impl Sync for Chunk {}

/// Pool of equally sized chunks.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It lives inside a registry, which is
/// mutated by a single writer.
pub struct ChunkPool {
    /// Layout shared by every chunk of this pool.
    layout: Layout,
    /// Chunks ready to be reused.
    free_list: Vec<Chunk>,
    /// Chunks currently handed out.
    live_count: usize,
}

impl ChunkPool {
    /// Creates an empty pool for chunks of `chunk_size` bytes.
    ///
    /// Nothing is allocated until the first [`ChunkPool::acquire`].
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero or not a multiple of [`CHUNK_ALIGNMENT`].
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be greater than zero");
        assert!(
            chunk_size % CHUNK_ALIGNMENT == 0,
            "Chunk size must be a multiple of {CHUNK_ALIGNMENT}"
        );

        let Ok(layout) = Layout::from_size_align(chunk_size, CHUNK_ALIGNMENT) else {
            panic!("Invalid chunk layout: {chunk_size} bytes");
        };

        Self {
            layout,
            free_list: Vec::new(),
            live_count: 0,
        }
    }

    /// Size in bytes of the chunks handed out by this pool.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.layout.size()
    }

    /// Number of chunks currently handed out.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of chunks waiting on the free list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Hands out a zero-filled chunk, reusing a released one if possible.
    pub fn acquire(&mut self) -> Chunk {
        self.live_count += 1;

        match self.free_list.pop() {
            Some(mut chunk) => {
                chunk.reset();
                chunk
            }
            None => Chunk::allocate(self.layout),
        }
    }

    /// Returns a chunk to the free list.
    ///
    /// The caller must have destroyed every value stored in it.
    pub fn release(&mut self, chunk: Chunk) {
        debug_assert_eq!(chunk.layout, self.layout, "Chunk released to the wrong pool");
        debug_assert!(self.live_count > 0);

        self.live_count -= 1;
        self.free_list.push(chunk);
    }

    /// Frees every chunk on the free list.
    pub fn shrink(&mut self) {
        self.free_list.clear();
    }
}
