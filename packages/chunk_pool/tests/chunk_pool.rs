//! End-to-end behavior of chunk pools, registries and allocation policies, observed through the
//! public API only.

#![allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "we do not need to worry about these things when writing test code"
)]

use std::collections::HashSet;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::thread;

use chunk_pool::{
    AllocationPolicy, CHUNK_ALIGN, CHUNK_HEADER_SIZE, ChunkPolicy, ChunkPool, ChunkPoolRegistry,
    Error, HeapPolicy, LocalChunkPool, PolicyBox, Rebind,
};

fn pool_with_capacity(capacity: usize) -> ChunkPool {
    ChunkPool::builder()
        .object_size(32)
        .chunks_per_block(capacity)
        .build()
}

fn free_all(pool: &mut ChunkPool, chunks: impl IntoIterator<Item = NonNull<u8>>) {
    for chunk in chunks {
        // SAFETY: Every chunk passed in was allocated from this pool and is not used afterwards.
        unsafe { pool.free(chunk.as_ptr()) };
    }
}

#[test]
fn growth_happens_exactly_once_on_first_overflow() {
    const CAPACITY: usize = 10;

    let mut pool = pool_with_capacity(CAPACITY);

    let mut chunks: Vec<_> = (0..CAPACITY).map(|_| pool.alloc().unwrap()).collect();
    assert_eq!(pool.block_count(), 1);

    chunks.push(pool.alloc().unwrap());
    assert_eq!(pool.block_count(), 2);

    // The new block has room for more without growing again.
    for _ in 1..CAPACITY {
        chunks.push(pool.alloc().unwrap());
    }
    assert_eq!(pool.block_count(), 2);

    let unique: HashSet<_> = chunks.iter().copied().collect();
    assert_eq!(unique.len(), 2 * CAPACITY);

    free_all(&mut pool, chunks);
}

#[test]
fn freed_chunk_is_next_to_be_allocated() {
    let mut pool = pool_with_capacity(4);

    let first = pool.alloc().unwrap();
    let second = pool.alloc().unwrap();

    free_all(&mut pool, [second]);
    assert_eq!(pool.alloc(), Some(second));

    free_all(&mut pool, [first, second]);

    // Last in, first out.
    assert_eq!(pool.alloc(), Some(second));
    assert_eq!(pool.alloc(), Some(first));

    free_all(&mut pool, [first, second]);
}

#[test]
fn disallowed_growth_fails_until_a_chunk_is_freed() {
    let mut pool = pool_with_capacity(3);
    pool.set_allow_resize(false);

    let chunks: Vec<_> = (0..3).map(|_| pool.alloc().unwrap()).collect();

    assert_eq!(pool.alloc(), None);
    assert_eq!(pool.alloc(), None);
    assert_eq!(pool.block_count(), 1);

    free_all(&mut pool, [chunks[1]]);
    assert_eq!(pool.alloc(), Some(chunks[1]));

    pool.set_allow_resize(true);
    let grown = pool.alloc().unwrap();
    assert_eq!(pool.block_count(), 2);

    free_all(&mut pool, chunks.into_iter().chain([grown]));
}

#[test]
fn payloads_are_aligned_and_do_not_overlap() {
    let mut pool = ChunkPool::builder()
        .object_size(13)
        .chunks_per_block(16)
        .build();

    let mut chunks: Vec<_> = (0..16).map(|_| pool.alloc().unwrap()).collect();
    chunks.sort_by_key(|chunk| chunk.addr());

    for chunk in &chunks {
        assert_eq!(chunk.addr().get() % CHUNK_ALIGN, 0);
    }

    for pair in chunks.windows(2) {
        let gap = pair[1].addr().get() - pair[0].addr().get();
        assert!(gap >= 13 + CHUNK_HEADER_SIZE);
    }

    // Fill every payload completely and verify nothing bled into a neighbor.
    for (index, chunk) in chunks.iter().enumerate() {
        // SAFETY: Each payload is 13 bytes and exclusively ours.
        unsafe { chunk.write_bytes(u8::try_from(index).unwrap(), 13) };
    }

    for (index, chunk) in chunks.iter().enumerate() {
        // SAFETY: Each payload was fully initialized above.
        let bytes = unsafe { std::slice::from_raw_parts(chunk.as_ptr(), 13) };
        assert!(bytes.iter().all(|&b| usize::from(b) == index));
    }

    free_all(&mut pool, chunks);
}

#[test]
fn destroy_and_reinit_lifecycle() {
    let mut pool = pool_with_capacity(4);
    let chunk = pool.alloc().unwrap();
    free_all(&mut pool, [chunk]);

    pool.destroy();
    assert!(!pool.is_initialized());
    assert_eq!(pool.alloc(), None);
    assert_eq!(pool.capacity(), 0);

    pool.init(NonZero::new(2).unwrap()).unwrap();
    assert!(pool.is_initialized());
    assert_eq!(pool.capacity(), 2);

    let chunks: Vec<_> = (0..3).map(|_| pool.alloc().unwrap()).collect();
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.capacity(), 4);

    free_all(&mut pool, chunks);
}

#[test]
fn stats_report_peak_usage() {
    let mut pool = pool_with_capacity(8);

    let batch: Vec<_> = (0..6).map(|_| pool.alloc().unwrap()).collect();
    free_all(&mut pool, batch);

    let single = pool.alloc().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.peak, 6);
    assert_eq!(stats.total_chunks, 8);
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.wasted_bytes(pool.chunk_size()), 2 * pool.chunk_size());

    free_all(&mut pool, [single]);
}

#[test]
fn mutex_makes_pool_shareable_between_threads() {
    let pool = Arc::new(Mutex::new(pool_with_capacity(16)));

    let workers: Vec<_> = (0..4_u64)
        .map(|worker| {
            let pool = Arc::clone(&pool);

            thread::spawn(move || {
                for round in 0..50 {
                    let chunk = pool.lock().unwrap().alloc().unwrap().cast::<u64>();

                    // SAFETY: The chunk is 32 bytes and exclusively ours until freed.
                    unsafe {
                        chunk.write(worker * 1000 + round);
                        assert_eq!(chunk.read(), worker * 1000 + round);
                    }

                    // SAFETY: Allocated above from the same pool and not used afterwards.
                    unsafe { pool.lock().unwrap().free(chunk.cast().as_ptr()) };
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = pool.lock().unwrap().stats();
    assert_eq!(stats.live, 0);
    assert!(stats.peak <= 4);
}

#[test]
fn registry_hands_out_one_pool_per_size() {
    let registry = ChunkPoolRegistry::new();

    let a = registry.pool_for::<[u8; 12]>();
    let b = registry.pool_for_size(12);
    let c = registry.pool_for::<[u8; 40]>();

    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&c));
    assert_eq!(registry.len(), 2);

    let chunk = a.alloc().unwrap();
    assert_eq!(b.stats().live, 1);

    // SAFETY: Both handles refer to the same pool, which handed out the chunk.
    unsafe { b.free(chunk.as_ptr()) };
    assert_eq!(a.stats().live, 0);
}

#[test]
fn pools_outlive_their_registry() {
    let pool: LocalChunkPool;

    {
        let registry = ChunkPoolRegistry::new();
        pool = registry.pool_for::<u32>();
    }

    // The pool stays usable after the registry is gone.
    let chunk = pool.alloc().unwrap();
    // SAFETY: Allocated above from the same pool and not used afterwards.
    unsafe { pool.free(chunk.as_ptr()) };
}

#[test]
fn chunk_policy_rejects_arrays() {
    let registry = ChunkPoolRegistry::new();
    let policy = ChunkPolicy::<u16>::new(&registry);

    assert_eq!(policy.max_size(), 1);
    assert!(matches!(
        policy.allocate(4),
        Err(Error::UnsupportedMultiElement { count: 4 })
    ));
}

#[test]
fn rebind_keeps_policy_family() {
    let registry = ChunkPoolRegistry::new();
    let policy = ChunkPolicy::<u32>::new(&registry);

    let same_size = policy.rebind::<[u8; 4]>();
    let other_size = policy.rebind::<u128>();

    assert_eq!(policy, same_size);
    assert_ne!(policy, other_size);
    assert_eq!(registry.len(), 2);

    let heap = HeapPolicy::<u32>::new();
    assert_eq!(heap.rebind::<u128>(), heap);
}

#[test]
fn boxes_from_both_policies_behave_alike() {
    let registry = ChunkPoolRegistry::new();

    let pooled = PolicyBox::new_in(String::from("chunk"), ChunkPolicy::new(&registry)).unwrap();
    let heaped = PolicyBox::new_in(String::from("heap"), HeapPolicy::new()).unwrap();

    assert_eq!(pooled.len() + heaped.len(), 9);
    assert_eq!(registry.pool_for::<String>().stats().live, 1);

    drop(pooled);
    assert_eq!(registry.pool_for::<String>().stats().live, 0);

    assert_eq!(heaped.into_inner(), "heap");
}

#[test]
fn many_boxes_grow_the_shared_pool() {
    let registry = ChunkPoolRegistry::with_chunks_per_block(NonZero::new(8).unwrap());
    let policy = ChunkPolicy::<u64>::new(&registry);

    let boxes: Vec<_> = (0..20_u64)
        .map(|value| PolicyBox::new_in(value, policy.clone()).unwrap())
        .collect();

    assert_eq!(policy.pool().stats().blocks, 3);

    let sum: u64 = boxes.iter().map(|boxed| **boxed).sum();
    assert_eq!(sum, (0..20).sum());

    drop(boxes);
    assert_eq!(policy.pool().stats().live, 0);
    assert_eq!(policy.pool().stats().peak, 20);
}

#[test]
fn shared_pool_reinit_waits_for_live_boxes() {
    let registry = ChunkPoolRegistry::new();
    let policy = ChunkPolicy::<u64>::new(&registry);

    let boxed = PolicyBox::new_in(7_u64, policy.clone()).unwrap();

    let pool = registry.pool_for::<u64>();
    assert!(matches!(
        pool.init(NonZero::new(4).unwrap()),
        Err(Error::ChunksOutstanding { live: 1 })
    ));

    assert_eq!(*boxed, 7);
    drop(boxed);

    pool.init(NonZero::new(4).unwrap()).unwrap();
    assert_eq!(pool.stats().live, 0);
    assert_eq!(pool.stats().total_chunks, 4);

    // The reinitialized pool keeps serving the same policy.
    let boxed = PolicyBox::new_in(8_u64, policy.clone()).unwrap();
    assert_eq!(*boxed, 8);
    assert_eq!(pool.stats().live, 1);
}
