#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A thread-safe, chunked memory pool that serves arrays of a fixed element type from
//! pre-reserved memory.
//!
//! This crate provides [`MemoryPool`], which reserves memory in chunks and hands out sub-ranges
//! of them. Memory returned to the pool goes onto a free list that is searched before any new
//! memory is used, with adjacent free blocks merged to counteract fragmentation.
//!
//! # Key Features
//!
//! - **Chunked storage**: Memory is reserved in chunks and handed out via bump allocation
//! - **Free-list reuse**: Returned memory is reused first-fit, large blocks are split
//! - **Coalescing**: Adjacent free blocks are merged after every deallocation
//! - **Pluggable growth**: A [`ChunkGrowthStrategy`] decides how large new chunks are
//! - **Lock-free statistics**: Usage counters can be read without taking the pool lock
//! - **Debug tags**: Allocations can be labeled with a name and source location
//! - **Byte-oriented adapter**: [`raw_allocate()`][MemoryPool::raw_allocate] and a
//!   [`GlobalAlloc`][std::alloc::GlobalAlloc] implementation for type-agnostic consumers
//!
//! # Examples
//!
//! ```rust
//! use chunk_pool::MemoryPool;
//!
//! let pool = MemoryPool::<u32>::builder().block_size(4096).build();
//!
//! let a = pool.allocate(25).unwrap();
//! let b = pool.allocate(25).unwrap();
//!
//! // SAFETY: `a` came from this pool with the same count and is not used afterwards.
//! unsafe { pool.deallocate(a.as_ptr(), 25) };
//!
//! // The freed block is reused for the next request of the same size.
//! let c = pool.allocate(25).unwrap();
//! assert_eq!(c, a);
//!
//! // SAFETY: Both pointers came from this pool with the same count.
//! unsafe {
//!     pool.deallocate(b.as_ptr(), 25);
//!     pool.deallocate(c.as_ptr(), 25);
//! }
//!
//! assert_eq!(pool.total_allocated(), 0);
//! assert_eq!(pool.allocation_count(), 3);
//! ```
//!
//! # Requests larger than one block
//!
//! A single allocation never spans chunks. Requests larger than the block size fail with
//! [`Error::AllocationTooLarge`] without touching the pool:
//!
//! ```rust
//! use chunk_pool::{Error, MemoryPool};
//!
//! let pool = MemoryPool::<u8>::new();
//!
//! assert!(matches!(
//!     pool.allocate(4097),
//!     Err(Error::AllocationTooLarge { .. })
//! ));
//! ```

mod adapter;
mod builder;
mod chunk;
mod error;
mod free_list;
mod growth;
mod pool;
mod stats;
mod tag;

pub use builder::*;
pub(crate) use chunk::*;
pub use error::*;
pub(crate) use free_list::*;
pub use growth::{ChunkGrowthStrategy, ExponentialGrowth, LinearGrowth};
pub(crate) use growth::BoxedGrowthStrategy;
pub use pool::MemoryPool;
pub use stats::PoolStats;
pub(crate) use stats::StatsCounters;
pub use tag::Tag;
pub(crate) use tag::TagStore;

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
///
/// # Panics
///
/// Panics if the result does not fit in `usize`.
#[must_use]
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());

    value
        .checked_next_multiple_of(alignment)
        .expect("aligned sizes are expected to fit in usize")
}
