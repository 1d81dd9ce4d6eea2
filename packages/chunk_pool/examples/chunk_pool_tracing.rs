//! Shows the diagnostics a pool emits:
//!
//! * Structured `tracing` events for chunk creation, reuse and fallback allocations.
//! * Debug tags that label allocations with their origin.
//! * The fragmentation ratio of the free list.

use chunk_pool::{LinearGrowth, MemoryPool};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .init();

    let pool = MemoryPool::<u8>::builder()
        .block_size(256)
        .growth_strategy(LinearGrowth::new(256))
        .build();

    let header = pool.allocate_tagged_here(64, "header").unwrap();
    let payload = pool.allocate_tagged(200, "payload", "protocol.rs", 17).unwrap();
    let trailer = pool.allocate_tagged_here(16, "trailer").unwrap();

    for (ptr, tag) in pool.all_tags() {
        println!("{ptr:?} -> {tag}");
    }

    // SAFETY: The pointers came from this pool with the same counts.
    unsafe {
        pool.deallocate(header.as_ptr(), 64);
        pool.deallocate(trailer.as_ptr(), 16);
    }

    println!("Fragmentation ratio: {:.3}", pool.fragmentation_ratio());

    // Over-aligned requests are forwarded to the system allocator and logged as warnings.
    let page = pool.raw_allocate(128, 4096).unwrap();

    // SAFETY: Same size and alignment as used for allocation.
    unsafe {
        pool.raw_deallocate(page, 128, 4096);
        pool.deallocate(payload.as_ptr(), 200);
    }

    pool.reset();
}
