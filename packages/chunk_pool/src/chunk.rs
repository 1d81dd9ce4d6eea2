use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use crate::align_up;

/// A contiguous region of memory owned by the pool, handed out via a bump cursor.
///
/// The cursor only ever moves forward. Memory behind the cursor that is returned by callers goes
/// to the free list of the pool, not back to the chunk.
#[derive(Debug)]
pub(crate) struct Chunk {
    memory: NonNull<u8>,
    layout: Layout,

    /// Number of bytes consumed by bump allocation so far.
    used: usize,
}

impl Chunk {
    /// Allocates a chunk of `size` bytes whose start address is aligned to `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if the layout cannot be represented (size overflowing `isize` after alignment)
    /// or if `size` is zero. Running out of memory aborts via [`handle_alloc_error`].
    #[must_use]
    pub(crate) fn new(size: usize, alignment: usize) -> Self {
        assert!(size > 0, "memory pool chunks must have non-zero size");

        let layout = Layout::from_size_align(size, alignment)
            .expect("chunk size and alignment are validated by the pool before chunk creation");

        // SAFETY: The layout is not zero-sized (guarded by assertion above).
        let ptr = unsafe { alloc(layout) };

        let Some(memory) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Self {
            memory,
            layout,
            used: 0,
        }
    }

    #[must_use]
    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }

    #[must_use]
    #[cfg(any(debug_assertions, test))]
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available to bump allocation once the cursor is aligned.
    #[must_use]
    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.size()
            .saturating_sub(align_up(self.used, self.layout.align()))
    }

    /// Advances the cursor by `footprint` bytes and returns the offset of the carved region,
    /// or `None` if the chunk does not have enough room left.
    pub(crate) fn bump(&mut self, footprint: usize) -> Option<usize> {
        let offset = align_up(self.used, self.layout.align());

        let end = offset.checked_add(footprint)?;
        if end > self.size() {
            return None;
        }

        self.used = end;
        Some(offset)
    }

    /// Pointer to the byte at `offset` within the chunk.
    ///
    /// # Panics
    ///
    /// Panics if the offset is beyond the end of the chunk.
    #[must_use]
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(
            offset <= self.size(),
            "offset {offset} is out of bounds of a chunk of {} bytes",
            self.size()
        );

        // SAFETY: Guarded by bounds check above, so the result stays within (or one past the end
        // of) the same allocated object.
        unsafe { self.memory.add(offset) }
    }

    /// Returns the offset of `ptr` within this chunk, or `None` if `ptr` does not point into it.
    #[must_use]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let start = self.memory.as_ptr().addr();
        let address = ptr.as_ptr().addr();

        let offset = address.checked_sub(start)?;
        (offset < self.size()).then_some(offset)
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(self.memory.as_ptr(), self.layout);
        }
    }
}

// SAFETY: The chunk exclusively owns its memory block; nothing about it is tied to the
// thread that allocated it.
unsafe impl Send for Chunk {}

// SAFETY: Shared references only expose addresses and sizes, never the contents.
unsafe impl Sync for Chunk {}
