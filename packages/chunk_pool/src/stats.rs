use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters of a pool. Updated with relaxed atomics so they can be read without taking
/// the pool lock, at the cost of being only eventually consistent with the pool structure.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    total_allocated: AtomicUsize,
    total_available: AtomicUsize,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
    chunk_count: AtomicUsize,
    fallback_allocated: AtomicUsize,
}

impl StatsCounters {
    // Relaxed is sufficient: we only need atomicity, not ordering w.r.t. other memory ops.

    pub(crate) fn record_chunk(&self, size: usize) {
        self.total_available.fetch_add(size, Ordering::Relaxed);
        self.chunk_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allocation(&self, bytes: usize) {
        self.total_allocated.fetch_add(bytes, Ordering::Relaxed);
        self.total_available.fetch_sub(bytes, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deallocation(&self, bytes: usize) {
        self.total_allocated.fetch_sub(bytes, Ordering::Relaxed);
        self.total_available.fetch_add(bytes, Ordering::Relaxed);
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_allocation(&self, bytes: usize) {
        self.fallback_allocated.fetch_add(bytes, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_deallocation(&self, bytes: usize) {
        self.fallback_allocated.fetch_sub(bytes, Ordering::Relaxed);
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.total_allocated.store(0, Ordering::Relaxed);
        self.total_available.store(0, Ordering::Relaxed);
        self.allocation_count.store(0, Ordering::Relaxed);
        self.deallocation_count.store(0, Ordering::Relaxed);
        self.chunk_count.store(0, Ordering::Relaxed);
    }

    pub(crate) fn total_allocated(&self) -> usize {
        self.total_allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn total_available(&self) -> usize {
        self.total_available.load(Ordering::Relaxed)
    }

    pub(crate) fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    pub(crate) fn deallocation_count(&self) -> usize {
        self.deallocation_count.load(Ordering::Relaxed)
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunk_count.load(Ordering::Relaxed)
    }

    pub(crate) fn fallback_allocated(&self) -> usize {
        self.fallback_allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            total_allocated: self.total_allocated(),
            total_available: self.total_available(),
            allocation_count: self.allocation_count(),
            deallocation_count: self.deallocation_count(),
            chunk_count: self.chunk_count(),
            fallback_allocated: self.fallback_allocated(),
        }
    }
}

/// Point-in-time copy of the usage counters of a [`MemoryPool`][crate::MemoryPool].
///
/// The individual fields are read one after another without a lock, so a snapshot taken while
/// other threads are allocating may mix values from slightly different moments.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolStats {
    /// Bytes currently handed out from pool chunks.
    pub total_allocated: usize,

    /// Bytes of chunk memory not currently handed out.
    pub total_available: usize,

    /// Number of successful allocations, including those served by the fallback allocator.
    pub allocation_count: usize,

    /// Number of deallocations, including those returned to the fallback allocator.
    pub deallocation_count: usize,

    /// Number of chunks currently owned by the pool.
    pub chunk_count: usize,

    /// Bytes currently handed out by the fallback allocator on behalf of the pool.
    pub fallback_allocated: usize,
}

impl PoolStats {
    /// Total bytes of chunk memory owned by the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.total_allocated.wrapping_add(self.total_available)
    }
}
