use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    BoxedGrowthStrategy, Chunk, Error, FreeBlock, FreeList, MemoryPoolBuilder, PoolStats, Result,
    StatsCounters, Tag, TagStore, align_up,
};

/// A thread-safe memory pool that hands out memory for arrays of `T` from pre-reserved chunks.
///
/// Every allocation request is served, in order of preference, by:
///
/// 1. The first free block (memory previously returned to the pool) that is large enough. Blocks
///    much larger than the request are split and the remainder stays available.
/// 2. Bump allocation from the first existing chunk that still has enough room.
/// 3. A new chunk, sized by the pool's [growth strategy][crate::ChunkGrowthStrategy].
///
/// Returned memory is freed with [`deallocate()`][Self::deallocate], after which adjacent free
/// blocks are merged. Chunk memory is only released back to the system when the pool is
/// [reset][Self::reset] or dropped.
///
/// A single allocation never spans chunks, so requests larger than the configured block size
/// fail with [`Error::AllocationTooLarge`].
///
/// # Examples
///
/// ```
/// use chunk_pool::MemoryPool;
///
/// let pool = MemoryPool::<u32>::new();
///
/// let ptr = pool.allocate(10).unwrap();
/// assert_eq!(pool.total_allocated(), 40);
///
/// // SAFETY: The pool handed us memory for 10 u32 values.
/// unsafe {
///     for index in 0..10 {
///         ptr.add(index).write(u32::try_from(index).unwrap());
///     }
/// }
///
/// // SAFETY: The pointer came from this pool with the same count and is not used afterwards.
/// unsafe { pool.deallocate(ptr.as_ptr(), 10) };
/// assert_eq!(pool.total_allocated(), 0);
/// ```
///
/// # Thread safety
///
/// The pool is thread-safe ([`Send`] and [`Sync`]). All operations take `&self`; structural
/// changes are serialized by an internal reader/writer lock while the usage counters can be read
/// without any lock.
///
/// The pool never reads or writes the memory it hands out. Values stored there are the
/// responsibility of the caller and are never dropped by the pool.
pub struct MemoryPool<T> {
    block_size: usize,
    alignment: usize,
    growth_strategy: BoxedGrowthStrategy,

    state: RwLock<PoolState>,

    stats: StatsCounters,

    _item: PhantomData<fn() -> T>,
}

#[derive(Debug)]
struct PoolState {
    /// In order of creation. Free blocks refer to chunks by index into this.
    chunks: Vec<Chunk>,
    free_list: FreeList,
    tags: TagStore,
}

impl PoolState {
    /// Finds the chunk that contains `ptr`, returning the chunk index and the offset within it.
    fn locate(&self, ptr: NonNull<u8>) -> Option<(usize, usize)> {
        self.chunks
            .iter()
            .enumerate()
            .find_map(|(index, chunk)| chunk.offset_of(ptr).map(|offset| (index, offset)))
    }

    fn ptr_of(&self, chunk: usize, offset: usize) -> NonNull<u8> {
        self.chunks
            .get(chunk)
            .expect("free blocks only ever refer to existing chunks")
            .ptr_at(offset)
    }
}

impl<T> MemoryPool<T> {
    /// Creates a pool with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or larger than the default block size.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring and constructing a [`MemoryPool`].
    #[inline]
    pub fn builder() -> MemoryPoolBuilder<T> {
        MemoryPoolBuilder::new()
    }

    /// Creates the pool with its initial chunk of `block_size` bytes. The configuration has
    /// already been validated by the builder.
    #[must_use]
    pub(crate) fn new_inner(
        block_size: usize,
        alignment: usize,
        growth_strategy: BoxedGrowthStrategy,
    ) -> Self {
        let pool = Self {
            block_size,
            alignment,
            growth_strategy,
            state: RwLock::new(PoolState {
                chunks: Vec::new(),
                free_list: FreeList::new(),
                tags: TagStore::new(),
            }),
            stats: StatsCounters::default(),
            _item: PhantomData,
        };

        pool.add_chunk(&mut pool.state.write(), block_size);

        pool
    }

    /// The largest number of bytes a single allocation may request, also the size of the
    /// first chunk.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The alignment of every address handed out by the pool.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Allocates uninitialized memory for `count` consecutive values of `T`.
    ///
    /// The returned pointer is aligned to [`alignment()`][Self::alignment] and stays valid until
    /// it is passed to [`deallocate()`][Self::deallocate] or the pool is reset or dropped.
    ///
    /// A `count` of zero is valid and returns a unique address that must still be deallocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationTooLarge`] if `count` values of `T` do not fit into one block.
    /// The pool is left untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if the growth strategy asks for a chunk size that cannot be represented as a
    /// memory layout. Running out of memory aborts the process, as with any Rust allocation.
    pub fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        self.allocate_with_tag(count, None)
    }

    /// Allocates like [`allocate()`][Self::allocate] and attaches a debug tag to the result.
    ///
    /// The tag can be looked up with [`find_tag()`][Self::find_tag] until the memory is
    /// deallocated. Tags have no effect on allocation behavior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationTooLarge`] if `count` values of `T` do not fit into one block.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_pool::MemoryPool;
    ///
    /// let pool = MemoryPool::<u8>::new();
    ///
    /// let ptr = pool.allocate_tagged(64, "header", "codec.rs", 12).unwrap();
    /// let tag = pool.find_tag(ptr.as_ptr()).unwrap();
    /// assert_eq!(tag.name(), "header");
    ///
    /// // SAFETY: The pointer came from this pool with the same count.
    /// unsafe { pool.deallocate(ptr.as_ptr(), 64) };
    /// assert!(pool.find_tag(ptr.as_ptr()).is_none());
    /// ```
    pub fn allocate_tagged(
        &self,
        count: usize,
        name: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Result<NonNull<T>> {
        self.allocate_with_tag(count, Some(Tag::new(name, file, line)))
    }

    /// Allocates like [`allocate_tagged()`][Self::allocate_tagged], using the source location of
    /// the caller as the file and line of the tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationTooLarge`] if `count` values of `T` do not fit into one block.
    #[track_caller]
    pub fn allocate_tagged_here(&self, count: usize, name: impl Into<String>) -> Result<NonNull<T>> {
        self.allocate_with_tag(count, Some(Tag::here(name)))
    }

    fn allocate_with_tag(&self, count: usize, tag: Option<Tag>) -> Result<NonNull<T>> {
        let bytes = self.byte_size(count)?;
        let footprint = align_up(bytes.max(1), self.alignment);

        let mut state = self.state.write();

        let ptr = self.allocate_footprint(&mut state, footprint);

        if let Some(tag) = tag {
            state.tags.insert(ptr, tag);
        }

        self.stats.record_allocation(bytes);

        #[cfg(debug_assertions)]
        self.integrity_check(&state);

        Ok(ptr.cast())
    }

    /// Converts an element count into a byte count, rejecting anything that does not fit into
    /// one block.
    fn byte_size(&self, count: usize) -> Result<usize> {
        let requested = count.checked_mul(size_of::<T>()).unwrap_or(usize::MAX);

        if requested > self.block_size {
            return Err(Error::AllocationTooLarge {
                requested,
                maximum: self.block_size,
            });
        }

        Ok(requested)
    }

    fn allocate_footprint(&self, state: &mut PoolState, footprint: usize) -> NonNull<u8> {
        let split_threshold = size_of::<usize>()
            .checked_add(self.alignment)
            .expect("alignment is bounded by the block size");

        if let Some(block) = state.free_list.take_first_fit(footprint, split_threshold) {
            trace!(
                chunk = block.chunk,
                offset = block.offset,
                size = block.size,
                footprint,
                "allocated from free list"
            );

            return state.ptr_of(block.chunk, block.offset);
        }

        for (index, chunk) in state.chunks.iter_mut().enumerate() {
            if let Some(offset) = chunk.bump(footprint) {
                trace!(chunk = index, offset, footprint, "allocated from existing chunk");
                return chunk.ptr_at(offset);
            }
        }

        let reference_size = state.chunks.last().map_or(self.block_size, Chunk::size);
        let chunk_size = self
            .growth_strategy
            .0
            .calculate(reference_size)
            .max(footprint);

        let index = self.add_chunk(state, chunk_size);
        let chunk = state
            .chunks
            .get_mut(index)
            .expect("we just added the chunk at this index");

        let offset = chunk
            .bump(footprint)
            .expect("new chunks are at least as large as the request that created them");

        trace!(chunk = index, offset, footprint, "allocated from new chunk");
        chunk.ptr_at(offset)
    }

    /// Appends a chunk of at least `size` bytes and returns its index.
    fn add_chunk(&self, state: &mut PoolState, size: usize) -> usize {
        let size = align_up(size, self.alignment);

        state.chunks.push(Chunk::new(size, self.alignment));
        self.stats.record_chunk(size);

        let index = state
            .chunks
            .len()
            .checked_sub(1)
            .expect("we just pushed a chunk");

        debug!(
            chunk = index,
            size,
            item_type = type_name::<T>(),
            "memory pool created chunk"
        );

        index
    }

    /// Returns memory for `count` values of `T` to the pool.
    ///
    /// Any tag attached to the address is removed. Adjacent free blocks are merged afterwards.
    /// A null pointer is ignored.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// * `ptr` was returned by an allocation method of this pool with the same `count` and has
    ///   not been deallocated since (and the pool has not been reset since).
    /// * The memory is not accessed after this call.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point into a chunk of this pool.
    pub unsafe fn deallocate(&self, ptr: *mut T, count: usize) {
        let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
            return;
        };

        let bytes = count
            .checked_mul(size_of::<T>())
            .expect("the count must match the count used for allocation, which did not overflow");
        let footprint = align_up(bytes.max(1), self.alignment);

        let mut state = self.state.write();

        let Some((chunk, offset)) = state.locate(ptr) else {
            panic!(
                "deallocated pointer {ptr:?} was not allocated from this memory pool of {}",
                type_name::<T>()
            );
        };

        state.tags.remove(ptr);

        state.free_list.push(FreeBlock {
            chunk,
            offset,
            size: footprint,
        });

        let merged = state.free_list.coalesce();
        trace!(chunk, offset, footprint, merged, "returned block to free list");

        self.stats.record_deallocation(bytes);

        #[cfg(debug_assertions)]
        self.integrity_check(&state);
    }

    /// Returns `true` if `ptr` points into memory owned by one of the chunks of this pool.
    ///
    /// This says nothing about whether the address is currently allocated.
    #[must_use]
    pub fn is_from_pool(&self, ptr: *const T) -> bool {
        NonNull::new(ptr.cast::<u8>().cast_mut())
            .is_some_and(|ptr| self.state.read().locate(ptr).is_some())
    }

    /// Returns the tag attached to the allocation starting at `ptr`, if any.
    #[must_use]
    pub fn find_tag(&self, ptr: *const T) -> Option<Tag> {
        let ptr = NonNull::new(ptr.cast::<u8>().cast_mut())?;

        self.state.read().tags.get(ptr).cloned()
    }

    /// Returns a copy of all tags of live tagged allocations, keyed by allocation address.
    #[must_use]
    pub fn all_tags(&self) -> HashMap<NonNull<T>, Tag> {
        self.state
            .read()
            .tags
            .iter()
            .map(|(ptr, tag)| (ptr.cast::<T>(), tag.clone()))
            .collect()
    }

    /// Releases all chunks and forgets all free blocks, tags and statistics.
    ///
    /// Every pointer previously handed out by the pool becomes dangling. The pool stays usable;
    /// the next allocation creates a fresh chunk via the growth strategy.
    pub fn reset(&self) {
        let mut state = self.state.write();

        let released_chunks = state.chunks.len();
        let released_tags = state.tags.len();

        state.chunks.clear();
        state.free_list.clear();
        state.tags.clear();
        self.stats.reset();

        debug!(
            released_chunks,
            released_tags,
            item_type = type_name::<T>(),
            "memory pool reset"
        );
    }

    /// Merges adjacent free blocks and returns the number of bytes absorbed into other blocks.
    ///
    /// Deallocation already merges blocks, so this usually returns zero. Calling it twice in a row
    /// always returns zero the second time.
    pub fn compact(&self) -> usize {
        let mut state = self.state.write();

        let merged = state.free_list.coalesce();
        trace!(merged, free_blocks = state.free_list.len(), "compacted free list");

        merged
    }

    /// Adds one chunk large enough that `expected_allocations * avg_size` bytes are available,
    /// if fewer bytes than that are available now. Never shrinks the pool.
    ///
    /// Use `size_of::<T>()` as `avg_size` when reserving for single-element allocations.
    ///
    /// # Panics
    ///
    /// Panics if the resulting chunk size cannot be represented as a memory layout.
    pub fn reserve(&self, expected_allocations: usize, avg_size: usize) {
        let wanted = expected_allocations.saturating_mul(avg_size);

        let mut state = self.state.write();

        let available = self.stats.total_available();
        if let Some(missing) = wanted.checked_sub(available).filter(|missing| *missing > 0) {
            let index = self.add_chunk(&mut state, missing);
            debug!(chunk = index, wanted, available, "memory pool reserved capacity");
        }
    }

    /// Bytes currently handed out from pool chunks.
    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.stats.total_allocated()
    }

    /// Bytes of chunk memory not currently handed out.
    #[must_use]
    pub fn total_available(&self) -> usize {
        self.stats.total_available()
    }

    /// Number of allocations performed since creation or the last reset.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.stats.allocation_count()
    }

    /// Number of deallocations performed since creation or the last reset.
    #[must_use]
    pub fn deallocation_count(&self) -> usize {
        self.stats.deallocation_count()
    }

    /// Number of chunks owned by the pool.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.stats.chunk_count()
    }

    /// A copy of all usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Heuristic estimate in `0.0..=1.0` of how scattered the free blocks are, where higher means
    /// more fragmented.
    ///
    /// Calculated as one minus the ratio of the average free block size to the total available
    /// bytes. Returns `0.0` when there are no free blocks or nothing is available, even if the
    /// available memory is spread over many chunks.
    #[must_use]
    pub fn fragmentation_ratio(&self) -> f64 {
        let state = self.state.read();

        let available = self.stats.total_available();
        if state.free_list.is_empty() || available == 0 {
            return 0.0;
        }

        #[expect(
            clippy::cast_precision_loss,
            reason = "a heuristic - precision loss on enormous pools is irrelevant"
        )]
        let average_block_size =
            state.free_list.total_size() as f64 / state.free_list.len() as f64;

        #[expect(
            clippy::cast_precision_loss,
            reason = "a heuristic - precision loss on enormous pools is irrelevant"
        )]
        let available = available as f64;

        (1.0 - average_block_size / available).clamp(0.0, 1.0)
    }

    pub(crate) fn stats_counters(&self) -> &StatsCounters {
        &self.stats
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    fn integrity_check(&self, state: &PoolState) {
        let mut blocks = state.free_list.iter().copied().collect::<Vec<_>>();
        blocks.sort_unstable_by_key(|block| (block.chunk, block.offset));

        for block in &blocks {
            let chunk = state.chunks.get(block.chunk).unwrap_or_else(|| {
                panic!(
                    "free block {block:?} refers to a missing chunk in pool of {}",
                    type_name::<T>()
                )
            });

            assert!(
                block.offset.checked_rem(self.alignment) == Some(0),
                "free block {block:?} is not aligned to {} in pool of {}",
                self.alignment,
                type_name::<T>()
            );

            assert!(
                block
                    .offset
                    .checked_add(block.size)
                    .is_some_and(|end| end <= chunk.used()),
                "free block {block:?} extends beyond the used part of its chunk in pool of {}",
                type_name::<T>()
            );
        }

        for pair in blocks.windows(2) {
            let [previous, next] = pair else {
                unreachable!("windows(2) always yields pairs");
            };

            assert!(
                previous.chunk != next.chunk
                    || previous
                        .offset
                        .checked_add(previous.size)
                        .is_some_and(|end| end <= next.offset),
                "free blocks {previous:?} and {next:?} overlap in pool of {}",
                type_name::<T>()
            );
        }
    }
}

impl<T> Default for MemoryPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MemoryPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("block_size", &self.block_size)
            .field("alignment", &self.alignment)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::LinearGrowth;

    assert_impl_all!(MemoryPool<u32>: Send, Sync, fmt::Debug);
    assert_impl_all!(MemoryPool<std::rc::Rc<u32>>: Send, Sync);

    fn small_pool() -> MemoryPool<u8> {
        MemoryPool::builder().block_size(256).alignment(16).build()
    }

    fn distance(from: NonNull<u8>, to: NonNull<u8>) -> usize {
        to.as_ptr()
            .addr()
            .checked_sub(from.as_ptr().addr())
            .expect("second pointer must not precede the first")
    }

    #[test]
    fn smoke_test() {
        let pool = MemoryPool::<u32>::new();

        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.total_available(), 4096);

        let ptr = pool.allocate(10).unwrap();

        assert_eq!(pool.total_allocated(), 40);
        assert_eq!(pool.total_available(), 4056);
        assert_eq!(pool.allocation_count(), 1);

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(ptr.as_ptr(), 10) };

        assert_eq!(pool.total_allocated(), 0);
        assert_eq!(pool.total_available(), 4096);
        assert_eq!(pool.deallocation_count(), 1);
    }

    #[test]
    fn too_large_fails_without_side_effects() {
        let pool = MemoryPool::<u8>::new();

        let result = pool.allocate(4097);

        assert!(matches!(
            result,
            Err(Error::AllocationTooLarge {
                requested: 4097,
                maximum: 4096
            })
        ));
        assert_eq!(pool.stats(), PoolStats {
            total_allocated: 0,
            total_available: 4096,
            allocation_count: 0,
            deallocation_count: 0,
            chunk_count: 1,
            fallback_allocated: 0,
        });
    }

    #[test]
    fn overflowing_count_is_too_large() {
        let pool = MemoryPool::<u64>::new();

        assert!(matches!(
            pool.allocate(usize::MAX),
            Err(Error::AllocationTooLarge { .. })
        ));
    }

    #[test]
    fn exactly_block_size_fits() {
        let pool = small_pool();

        let ptr = pool.allocate(256).unwrap();
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.total_available(), 0);

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(ptr.as_ptr(), 256) };
    }

    #[test]
    fn freed_block_is_reused_first_fit() {
        let pool = MemoryPool::<u8>::new();

        let a = pool.allocate(100).unwrap();
        let _b = pool.allocate(100).unwrap();

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(a.as_ptr(), 100) };

        let c = pool.allocate(100).unwrap();

        assert_eq!(c, a);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn bump_allocations_are_contiguous_footprints() {
        let pool = small_pool();

        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(16).unwrap();
        let c = pool.allocate(17).unwrap();

        assert_eq!(distance(a, b), 16);
        assert_eq!(distance(b, c), 16);
    }

    #[test]
    fn large_free_block_is_split() {
        let pool = small_pool();

        let a = pool.allocate(128).unwrap();
        let _guard = pool.allocate(16).unwrap();

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(a.as_ptr(), 128) };

        let c = pool.allocate(32).unwrap();
        let d = pool.allocate(32).unwrap();

        assert_eq!(c, a);
        assert_eq!(distance(c, d), 32);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn slightly_larger_free_block_is_not_split() {
        let pool = small_pool();

        let a = pool.allocate(64).unwrap();
        let _guard = pool.allocate(16).unwrap();

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(a.as_ptr(), 64) };

        // The 16 byte remainder is below the split threshold, so the whole block is taken.
        let c = pool.allocate(48).unwrap();
        assert_eq!(c, a);

        // The next small allocation therefore comes from the bump cursor, behind the guard.
        let e = pool.allocate(16).unwrap();
        assert_eq!(distance(a, e), 80);
    }

    #[test]
    fn adjacent_free_blocks_are_coalesced() {
        let pool = small_pool();

        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();
        let _guard = pool.allocate(32).unwrap();

        // SAFETY: The pointers came from this pool with the same counts.
        unsafe {
            pool.deallocate(a.as_ptr(), 32);
            pool.deallocate(c.as_ptr(), 32);
            pool.deallocate(b.as_ptr(), 32);
        }

        // All three blocks were merged, so one 96 byte request fits where `a` was.
        let merged = pool.allocate(96).unwrap();
        assert_eq!(merged, a);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn compact_is_idempotent() {
        let pool = small_pool();

        let a = pool.allocate(32).unwrap();
        let _b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();

        // SAFETY: The pointers came from this pool with the same counts.
        unsafe {
            pool.deallocate(a.as_ptr(), 32);
            pool.deallocate(c.as_ptr(), 32);
        }

        _ = pool.compact();
        assert_eq!(pool.compact(), 0);
    }

    #[test]
    fn new_chunk_uses_growth_strategy() {
        let pool = small_pool();

        let _a = pool.allocate(256).unwrap();
        let b = pool.allocate(16).unwrap();

        // Default growth doubles the previous chunk.
        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.stats().capacity(), 256 + 512);
        assert_eq!(pool.total_allocated(), 272);
        assert_eq!(pool.total_available(), 496);

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(b.as_ptr(), 16) };
        assert_eq!(pool.stats().capacity(), 768);
    }

    #[test]
    fn new_chunk_size_is_aligned() {
        let pool = MemoryPool::<u8>::builder()
            .block_size(256)
            .alignment(16)
            .growth_strategy(LinearGrowth::new(100))
            .build();

        let _a = pool.allocate(256).unwrap();
        let _b = pool.allocate(1).unwrap();

        // 256 + 100 rounded up to the alignment.
        assert_eq!(pool.stats().capacity(), 256 + 368);
    }

    #[test]
    fn new_chunk_is_never_smaller_than_request() {
        let pool = MemoryPool::<u8>::builder()
            .block_size(256)
            .alignment(16)
            .growth_strategy(|_: usize| -> usize { 1 })
            .build();

        let _a = pool.allocate(200).unwrap();
        let _b = pool.allocate(200).unwrap();

        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.stats().capacity(), 256 + 208);
    }

    #[test]
    fn earlier_chunks_are_preferred() {
        let pool = small_pool();

        let _a = pool.allocate(200).unwrap();
        let b = pool.allocate(100).unwrap();

        // 48 bytes are left in the first chunk, so a small request goes back there.
        let c = pool.allocate(32).unwrap();

        let state = pool.state.read();
        assert_eq!(state.locate(c.cast()).map(|(chunk, _)| chunk), Some(0));
        assert_eq!(state.locate(b.cast()).map(|(chunk, _)| chunk), Some(1));
    }

    #[test]
    fn addresses_are_aligned() {
        let pool = MemoryPool::<u8>::builder()
            .block_size(4096)
            .alignment(64)
            .build();

        for count in [1, 3, 64, 65, 200, 1000, 0, 7] {
            let ptr = pool.allocate(count).unwrap();
            assert_eq!(ptr.as_ptr().addr() % 64, 0, "count {count}");
        }
    }

    #[test]
    fn live_allocations_never_overlap() {
        let pool = MemoryPool::<u16>::builder().block_size(1024).build();

        let mut live = Vec::new();

        for round in 0_usize..200 {
            let count = round.wrapping_mul(37) % 97 + 1;
            let ptr = pool.allocate(count).unwrap();
            live.push((ptr, count));

            if round % 3 == 0 {
                let (ptr, count) = live.swap_remove(round % live.len());
                // SAFETY: The pointer came from this pool with the same count.
                unsafe { pool.deallocate(ptr.as_ptr(), count) };
            }
        }

        let mut ranges = live
            .iter()
            .map(|(ptr, count)| {
                let start = ptr.as_ptr().addr();
                (start, start + count * size_of::<u16>())
            })
            .collect::<Vec<_>>();
        ranges.sort_unstable();

        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn allocated_memory_is_writable() {
        let pool = MemoryPool::<u64>::new();

        let first = pool.allocate(16).unwrap();
        let second = pool.allocate(16).unwrap();

        // SAFETY: Both allocations are live and hold 16 u64 each.
        unsafe {
            for index in 0..16 {
                first.add(index).write(index as u64);
                second.add(index).write(u64::MAX - index as u64);
            }

            for index in 0..16 {
                assert_eq!(first.add(index).read(), index as u64);
                assert_eq!(second.add(index).read(), u64::MAX - index as u64);
            }
        }
    }

    #[test]
    fn zero_count_allocations_are_distinct() {
        let pool = small_pool();

        let a = pool.allocate(0).unwrap();
        let b = pool.allocate(0).unwrap();

        assert_ne!(a, b);
        assert_eq!(pool.total_allocated(), 0);

        // SAFETY: The pointers came from this pool with the same counts.
        unsafe {
            pool.deallocate(a.as_ptr(), 0);
            pool.deallocate(b.as_ptr(), 0);
        }

        assert_eq!(pool.deallocation_count(), 2);
    }

    #[test]
    fn null_deallocation_is_noop() {
        let pool = small_pool();

        // SAFETY: Null is explicitly allowed.
        unsafe { pool.deallocate(std::ptr::null_mut(), 10) };

        assert_eq!(pool.deallocation_count(), 0);
    }

    #[test]
    #[should_panic]
    fn foreign_pointer_deallocation_panics() {
        let pool = small_pool();
        let mut foreign = 0_u8;

        // SAFETY: Not safe at all - we expect the pool to detect the foreign pointer and panic.
        unsafe { pool.deallocate(&raw mut foreign, 1) };
    }

    #[test]
    fn is_from_pool_checks_chunk_ranges() {
        let pool = small_pool();
        let foreign = 0_u8;

        let ptr = pool.allocate(8).unwrap();

        assert!(pool.is_from_pool(ptr.as_ptr()));
        assert!(!pool.is_from_pool(&raw const foreign));
        assert!(!pool.is_from_pool(std::ptr::null()));
    }

    #[test]
    fn tag_lifecycle() {
        let pool = small_pool();

        let tagged = pool.allocate_tagged(16, "tagged", "pool.rs", 7).unwrap();
        let untagged = pool.allocate(16).unwrap();

        let tag = pool.find_tag(tagged.as_ptr()).unwrap();
        assert_eq!(tag.name(), "tagged");
        assert_eq!(tag.file(), "pool.rs");
        assert_eq!(tag.line(), 7);
        assert!(pool.find_tag(untagged.as_ptr()).is_none());

        let all = pool.all_tags();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get(&tagged), Some(&tag));

        // SAFETY: The pointers came from this pool with the same counts.
        unsafe {
            pool.deallocate(tagged.as_ptr(), 16);
            pool.deallocate(untagged.as_ptr(), 16);
        }

        assert!(pool.find_tag(tagged.as_ptr()).is_none());
        assert!(pool.all_tags().is_empty());
    }

    #[test]
    fn tag_here_records_caller() {
        let pool = small_pool();

        let expected_line = line!() + 1;
        let ptr = pool.allocate_tagged_here(4, "here").unwrap();

        let tag = pool.find_tag(ptr.as_ptr()).unwrap();
        assert_eq!(tag.file(), file!());
        assert_eq!(tag.line(), expected_line);
    }

    #[test]
    fn tags_do_not_change_allocation() {
        let pool = small_pool();

        let a = pool.allocate_tagged(32, "a", "", 0).unwrap();
        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(a.as_ptr(), 32) };

        let b = pool.allocate(32).unwrap();
        assert_eq!(a, b);
        assert!(pool.find_tag(b.as_ptr()).is_none());
    }

    #[test]
    fn reset_releases_everything() {
        let pool = small_pool();

        let _a = pool.allocate_tagged(256, "a", "", 0).unwrap();
        let _b = pool.allocate(64).unwrap();
        assert_eq!(pool.chunk_count(), 2);

        pool.reset();

        assert_eq!(pool.stats(), PoolStats::default());
        assert!(pool.all_tags().is_empty());

        // The pool grows again from the configured block size.
        let c = pool.allocate(16).unwrap();
        assert!(pool.is_from_pool(c.as_ptr()));
        assert_eq!(pool.chunk_count(), 1);
        assert_eq!(pool.stats().capacity(), 512);
    }

    #[test]
    fn reserve_adds_missing_capacity() {
        let pool = MemoryPool::<u8>::new();

        pool.reserve(100, 64);

        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.total_available(), 6400);

        // Already satisfied, nothing happens.
        pool.reserve(10, 10);
        pool.reserve(100, 64);
        assert_eq!(pool.chunk_count(), 2);
    }

    #[test]
    fn reserve_rounds_to_alignment() {
        let pool = small_pool();

        pool.reserve(1, 300);

        assert_eq!(pool.chunk_count(), 2);
        // 44 missing bytes rounded up to 48.
        assert_eq!(pool.total_available(), 304);
    }

    #[test]
    fn fragmentation_ratio_without_free_blocks_is_zero() {
        let pool = small_pool();
        assert!(pool.fragmentation_ratio().abs() < f64::EPSILON);

        let _a = pool.allocate(16).unwrap();
        assert!(pool.fragmentation_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn fragmentation_ratio_grows_with_scattered_blocks() {
        let pool = MemoryPool::<u8>::new();

        let a = pool.allocate(32).unwrap();
        let _b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();

        // SAFETY: The pointers came from this pool with the same counts.
        unsafe {
            pool.deallocate(a.as_ptr(), 32);
            pool.deallocate(c.as_ptr(), 32);
        }

        let ratio = pool.fragmentation_ratio();
        assert!(ratio > 0.99, "{ratio}");
        assert!(ratio <= 1.0, "{ratio}");
    }

    #[test]
    fn fragmentation_ratio_of_full_pool_is_zero() {
        let pool = small_pool();

        let a = pool.allocate(128).unwrap();
        let _b = pool.allocate(128).unwrap();

        // SAFETY: The pointer came from this pool with the same count.
        unsafe { pool.deallocate(a.as_ptr(), 128) };
        let _c = pool.allocate(128).unwrap();

        assert_eq!(pool.total_available(), 0);
        assert!(pool.fragmentation_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn counters_conserve_capacity() {
        let pool = MemoryPool::<u32>::builder().block_size(512).build();

        let mut live = Vec::new();
        for round in 0_usize..100 {
            let count = round % 50 + 1;
            live.push((pool.allocate(count).unwrap(), count));

            if round % 4 == 1 {
                let (ptr, count) = live.remove(0);
                // SAFETY: The pointer came from this pool with the same count.
                unsafe { pool.deallocate(ptr.as_ptr(), count) };
            }

            let chunk_bytes: usize = pool.state.read().chunks.iter().map(Chunk::size).sum();
            assert_eq!(pool.total_allocated() + pool.total_available(), chunk_bytes);
        }
    }

    #[test]
    fn multithreaded_allocations() {
        let pool = Arc::new(MemoryPool::<u64>::builder().block_size(1024).build());

        let threads = (0..4_u64)
            .map(|thread_index| {
                let pool = Arc::clone(&pool);

                thread::spawn(move || {
                    for round in 0..500_usize {
                        let count = round % 16 + 1;
                        let ptr = pool.allocate(count).unwrap();

                        // SAFETY: The allocation is live and exclusively ours.
                        unsafe {
                            for index in 0..count {
                                ptr.add(index).write(thread_index);
                            }

                            for index in 0..count {
                                assert_eq!(ptr.add(index).read(), thread_index);
                            }

                            pool.deallocate(ptr.as_ptr(), count);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(pool.total_allocated(), 0);
        assert_eq!(pool.allocation_count(), 2000);
        assert_eq!(pool.deallocation_count(), 2000);
    }
}
