use std::mem;
use std::num::NonZero;

use crate::{ChunkLayout, ChunkPool, DEFAULT_CHUNKS_PER_BLOCK, DropPolicy};

/// Builder for creating an instance of [`ChunkPool`].
///
/// The object size is the only required setting. Everything else has a default that is
/// sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use chunk_pool::{ChunkPool, DropPolicy};
///
/// let pool = ChunkPool::builder()
///     .object_size(48)
///     .chunks_per_block(256)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
///
/// assert_eq!(pool.object_size(), 48);
/// assert_eq!(pool.chunks_per_block(), 256);
/// ```
#[derive(Debug)]
#[must_use]
pub struct ChunkPoolBuilder {
    object_size: Option<usize>,
    chunks_per_block: usize,
    allow_resize: bool,
    drop_policy: DropPolicy,
}

impl ChunkPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            object_size: None,
            chunks_per_block: DEFAULT_CHUNKS_PER_BLOCK.get(),
            allow_resize: true,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Sets the size in bytes of the objects the pool hands out chunks for. Must be non-zero.
    pub fn object_size(mut self, bytes: usize) -> Self {
        self.object_size = Some(bytes);
        self
    }

    /// Sets the object size to the size of `T`.
    ///
    /// Zero-sized types get chunks of one byte, as every chunk needs a distinct address.
    pub fn object_size_of<T>(self) -> Self {
        self.object_size(mem::size_of::<T>().max(1))
    }

    /// Sets the number of chunks in each block. Must be non-zero.
    ///
    /// The pool allocates one block when built and grows by one block whenever every chunk is
    /// in use.
    pub fn chunks_per_block(mut self, count: usize) -> Self {
        self.chunks_per_block = count;
        self
    }

    /// Sets whether the pool may grow beyond its first block. Enabled by default.
    pub fn allow_resize(mut self, allow: bool) -> Self {
        self.allow_resize = allow;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat outstanding chunks when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds and initializes the chunk pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the object size was not set or is zero, if the number of chunks per block is
    /// zero, if a block would not fit into the address space or if the first block cannot be
    /// allocated.
    #[must_use]
    pub fn build(self) -> ChunkPool {
        let Some(object_size) = self.object_size else {
            panic!("chunk pool object size must be set before building");
        };

        let Some(object_size) = NonZero::new(object_size) else {
            panic!("chunk pool object size must be non-zero");
        };

        let Some(chunks_per_block) = NonZero::new(self.chunks_per_block) else {
            panic!("chunk pool must have at least one chunk per block");
        };

        let layout = ChunkLayout::new(object_size, chunks_per_block);

        let mut pool = ChunkPool::new_inner(layout, self.allow_resize, self.drop_policy);

        pool.init(chunks_per_block)
            .expect("out of memory when allocating the first block of a chunk pool");

        pool
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::CHUNK_ALIGN;

    #[test]
    fn defaults() {
        let pool = ChunkPoolBuilder::new().object_size(8).build();

        assert_eq!(pool.object_size(), 8);
        assert_eq!(pool.chunks_per_block(), DEFAULT_CHUNKS_PER_BLOCK.get());
        assert!(pool.allows_resize());
        assert!(pool.is_initialized());
    }

    #[test]
    fn object_size_of_type() {
        let pool = ChunkPoolBuilder::new().object_size_of::<[u16; 5]>().build();

        assert_eq!(pool.object_size(), 10);
    }

    #[test]
    fn object_size_of_zero_sized_type() {
        let pool = ChunkPoolBuilder::new().object_size_of::<()>().build();

        assert_eq!(pool.object_size(), 1);
        assert!(pool.chunk_size() >= CHUNK_ALIGN);
    }

    #[test]
    fn resize_can_be_disabled() {
        let pool = ChunkPoolBuilder::new()
            .object_size(8)
            .allow_resize(false)
            .build();

        assert!(!pool.allows_resize());
    }

    #[test]
    fn layout_matches_pool() {
        let pool = ChunkPoolBuilder::new()
            .object_size(20)
            .chunks_per_block(7)
            .build();

        assert_eq!(
            ChunkLayout::new(nz!(20), nz!(7)).chunk_size().get(),
            pool.chunk_size()
        );
        assert_eq!(pool.capacity(), 7);
    }

    #[test]
    #[should_panic]
    fn missing_object_size_panics() {
        _ = ChunkPoolBuilder::new().build();
    }

    #[test]
    #[should_panic]
    fn zero_object_size_panics() {
        _ = ChunkPoolBuilder::new().object_size(0).build();
    }

    #[test]
    #[should_panic]
    fn zero_chunks_per_block_panics() {
        _ = ChunkPoolBuilder::new()
            .object_size(8)
            .chunks_per_block(0)
            .build();
    }
}
