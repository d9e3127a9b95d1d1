//! Basic usage of the `chunk_pool` crate:
//!
//! * Allocating and freeing raw chunks.
//! * Observing LIFO reuse and growth.
//! * Allocating typed values through a chunk-backed policy.

use chunk_pool::{ChunkPolicy, ChunkPool, ChunkPoolRegistry, PolicyBox};

fn main() {
    let mut pool = ChunkPool::builder()
        .object_size_of::<[u64; 2]>()
        .chunks_per_block(4)
        .build();

    println!(
        "Chunks of {} bytes hold objects of {} bytes",
        pool.chunk_size(),
        pool.object_size()
    );

    let chunks: Vec<_> = (0..5).filter_map(|_| pool.alloc()).collect();
    println!(
        "Allocated {} chunks, which needed {} blocks",
        chunks.len(),
        pool.block_count()
    );

    for chunk in &chunks {
        // SAFETY: Each chunk came from this pool and is not used after this.
        unsafe { pool.free(chunk.as_ptr()) };
    }

    // The chunk that was freed last is handed out first.
    let reused = pool.alloc();
    println!(
        "Reused the last freed chunk: {}",
        reused == chunks.last().copied()
    );

    if let Some(chunk) = reused {
        // SAFETY: The chunk came from this pool and is not used after this.
        unsafe { pool.free(chunk.as_ptr()) };
    }

    println!("Pool statistics: {:?}", pool.stats());

    // Typed values through the registry of shared pools.
    let registry = ChunkPoolRegistry::new();

    let names: Vec<_> = ["Alice", "Bob", "Charlie"]
        .into_iter()
        .filter_map(|name| PolicyBox::new_in(name.to_string(), ChunkPolicy::new(&registry)).ok())
        .collect();

    for name in &names {
        println!("Pooled name: {}", **name);
    }

    println!(
        "The registry holds {} pool with {} live chunks",
        registry.len(),
        registry.pool_for::<String>().stats().live
    );
}
