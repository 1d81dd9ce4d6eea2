//! Basic usage of the `chunk_pool` crate:
//!
//! * Creating a pool.
//! * Allocating and writing to memory.
//! * Returning memory and observing reuse.
//! * Reading statistics.

use chunk_pool::MemoryPool;

fn main() {
    let pool = MemoryPool::<f64>::builder().block_size(1024).build();

    // Allocation gives you uninitialized memory for the requested number of elements.
    let samples = pool.allocate(32).unwrap();

    // SAFETY: The pool handed us memory for 32 f64 values that nobody else uses.
    unsafe {
        let mut value = 0.0;
        for index in 0..32 {
            samples.add(index).write(value);
            value += 0.5;
        }

        println!("Last sample: {}", samples.add(31).read());
    }

    println!(
        "Allocated {} of {} bytes in {} chunk(s)",
        pool.total_allocated(),
        pool.stats().capacity(),
        pool.chunk_count()
    );

    // SAFETY: The pointer came from this pool with the same count and is not used afterwards.
    unsafe { pool.deallocate(samples.as_ptr(), 32) };

    // The returned block is the first candidate for the next request that fits into it.
    let reused = pool.allocate(16).unwrap();
    println!("Memory was reused: {}", reused == samples);

    // Requests larger than one block are rejected instead of spanning chunks.
    match pool.allocate(1000) {
        Ok(_) => unreachable!("1000 f64 values do not fit into a 1024 byte block"),
        Err(error) => println!("Large request rejected: {error}"),
    }

    // SAFETY: The pointer came from this pool with the same count.
    unsafe { pool.deallocate(reused.as_ptr(), 16) };

    println!("Final statistics: {:?}", pool.stats());
}
