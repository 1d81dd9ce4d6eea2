//! Byte-oriented allocation interface for consumers that do not know about `T`.

use std::alloc::{GlobalAlloc, Layout, alloc, dealloc};
use std::any::type_name;
use std::ptr::{self, NonNull};

use tracing::warn;

use crate::{Error, MemoryPool, Result};

impl<T> MemoryPool<T> {
    /// Allocates `bytes` bytes aligned to `alignment`.
    ///
    /// Requests that fit the pool (alignment no stricter than the pool alignment, size within one
    /// block) are served as an allocation of enough `T` elements to cover `bytes`. Anything else
    /// is forwarded to the system allocator and accounted for in
    /// [`PoolStats::fallback_allocated`][crate::PoolStats::fallback_allocated].
    ///
    /// # Errors
    ///
    /// Returns [`Error::FallbackAllocationFailure`] if the request had to be forwarded to the
    /// system allocator and that failed, including when `bytes` and `alignment` do not form a
    /// valid memory layout.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_pool::MemoryPool;
    ///
    /// let pool = MemoryPool::<u8>::new();
    ///
    /// let small = pool.raw_allocate(100, 8).unwrap();
    /// assert!(pool.is_from_pool(small.as_ptr()));
    ///
    /// // Page-aligned memory is beyond what the pool guarantees.
    /// let page = pool.raw_allocate(100, 4096).unwrap();
    /// assert!(!pool.is_from_pool(page.as_ptr()));
    ///
    /// // SAFETY: Both pointers came from `raw_allocate()` with the same size and alignment.
    /// unsafe {
    ///     pool.raw_deallocate(small, 100, 8);
    ///     pool.raw_deallocate(page, 100, 4096);
    /// }
    /// ```
    pub fn raw_allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        if let Some(count) = self.pooled_count(bytes, alignment) {
            return self.allocate(count).map(NonNull::cast);
        }

        let layout = fallback_layout(bytes, alignment).ok_or(Error::FallbackAllocationFailure {
            size: bytes,
            alignment,
        })?;

        // SAFETY: The layout is not zero-sized, see `fallback_layout()`.
        let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or(
            Error::FallbackAllocationFailure {
                size: bytes,
                alignment,
            },
        )?;

        self.stats_counters().record_fallback_allocation(bytes);

        warn!(
            bytes,
            alignment,
            block_size = self.block_size(),
            pool_alignment = self.alignment(),
            item_type = type_name::<T>(),
            "memory pool forwarded request to the system allocator"
        );

        Ok(ptr)
    }

    /// Releases memory obtained from [`raw_allocate()`][Self::raw_allocate].
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by `raw_allocate()` on this pool with the
    /// same `bytes` and `alignment`, has not been released since and is not accessed afterwards.
    pub unsafe fn raw_deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        let pooled_count = self
            .pooled_count(bytes, alignment)
            .filter(|_| self.is_from_pool(ptr.as_ptr().cast::<T>()));

        if let Some(count) = pooled_count {
            // SAFETY: Forwarding the caller's guarantees; the same size and alignment map to the
            // same element count that was used for allocation.
            unsafe {
                self.deallocate(ptr.as_ptr().cast::<T>(), count);
            }
            return;
        }

        let layout = fallback_layout(bytes, alignment)
            .expect("the layout was valid when the memory was allocated");

        // SAFETY: The caller guarantees the memory came from the fallback path of
        // `raw_allocate()`, which allocated it with this exact layout.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }

        self.stats_counters().record_fallback_deallocation(bytes);
    }

    /// Whether `other` is the very same pool. Memory allocated from one pool can only be
    /// released to that same pool.
    #[must_use]
    pub fn is_equal(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }

    /// Number of `T` elements needed to serve `bytes` from the pool, or `None` if the request
    /// must go to the system allocator instead.
    fn pooled_count(&self, bytes: usize, alignment: usize) -> Option<usize> {
        if alignment > self.alignment() || bytes > self.block_size() {
            return None;
        }

        let count = bytes.div_ceil(size_of::<T>());

        // Rounding up to whole elements may push the request beyond the block size.
        (count.checked_mul(size_of::<T>())? <= self.block_size()).then_some(count)
    }
}

fn fallback_layout(bytes: usize, alignment: usize) -> Option<Layout> {
    // Zero-sized requests still get a unique address.
    Layout::from_size_align(bytes.max(1), alignment).ok()
}

// SAFETY: Memory handed out is valid for the requested layout until released: pool memory is
// aligned to the pool alignment, which is at least the requested alignment, and fallback memory
// comes from the system allocator with the exact layout.
unsafe impl<T> GlobalAlloc for MemoryPool<T> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.raw_allocate(layout.size(), layout.align())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            // SAFETY: The caller guarantees the pointer came from `alloc()` with this layout,
            // which in turn came from `raw_allocate()` with the same size and alignment.
            unsafe {
                self.raw_deallocate(ptr, layout.size(), layout.align());
            }
        }
    }
}
