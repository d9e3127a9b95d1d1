use std::marker::PhantomData;
use std::mem;
use std::num::NonZero;

use num_integer::Integer;

use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BLOCKS, DropPolicy, ObjectPool, PoolConfig, Slot};

/// Builder for creating an instance of [`ObjectPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`ObjectPool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use handle_pool::{DropPolicy, ObjectPool};
///
/// let pool = ObjectPool::<u32>::builder()
///     .block_size(16 * 1024)
///     .max_blocks(4)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// assert_eq!(pool.block_size(), 16 * 1024);
/// ```
///
/// [1]: ObjectPool::new
#[must_use]
pub struct ObjectPoolBuilder<T> {
    block_size: usize,
    max_blocks: usize,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for ObjectPoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("block_size", &self.block_size)
            .field("max_blocks", &self.max_blocks)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T: 'static> ObjectPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: DEFAULT_MAX_BLOCKS.get(),
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the size in bytes of each memory block. Must be a power of two that is large enough
    /// to hold at least one object.
    ///
    /// The number of objects per block is the block size divided by the size of one slot, which
    /// is somewhat larger than `T` because every slot also carries bookkeeping metadata.
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the maximum number of memory blocks the pool may allocate.
    ///
    /// Once every permitted block is full, [`ObjectPool::create_object()`] fails with
    /// [`Error::CapacityExhausted`][crate::Error::CapacityExhausted].
    pub fn max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining objects in the pool when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the object pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the block size is not a power of two, if a block cannot hold a single object,
    /// if the maximum number of blocks is zero or if the first block cannot be allocated.
    #[must_use]
    pub fn build(self) -> ObjectPool<T> {
        assert!(
            self.block_size.is_power_of_two(),
            "object pool block size must be a power of two, got {}",
            self.block_size
        );

        let Some(max_blocks) = NonZero::new(self.max_blocks) else {
            panic!("object pool must be allowed to allocate at least one block");
        };

        let slot_size = mem::size_of::<Slot<T>>();

        let objects_per_block = Integer::div_floor(&self.block_size, &slot_size);

        let Some(objects_per_block) = NonZero::new(objects_per_block) else {
            panic!(
                "object pool block size {} cannot hold even a single slot of {slot_size} bytes",
                self.block_size
            );
        };

        ObjectPool::new_inner(PoolConfig {
            block_size: self.block_size,
            objects_per_block,
            max_blocks,
            drop_policy: self.drop_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::arithmetic_side_effects,
        clippy::integer_division,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use super::*;

    #[test]
    fn defaults() {
        let pool = ObjectPool::<u64>::builder().build();

        assert_eq!(pool.block_size(), DEFAULT_BLOCK_SIZE);
        assert_eq!(
            pool.objects_per_block(),
            DEFAULT_BLOCK_SIZE / mem::size_of::<Slot<u64>>()
        );
        assert_eq!(
            pool.max_capacity(),
            DEFAULT_MAX_BLOCKS.get() * pool.objects_per_block()
        );
    }

    #[test]
    fn larger_blocks_hold_more_objects() {
        let small = ObjectPool::<u64>::builder().block_size(1024).build();
        let large = ObjectPool::<u64>::builder().block_size(2048).build();

        assert!(large.objects_per_block() > small.objects_per_block());
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_block_size_panics() {
        _ = ObjectPool::<u64>::builder().block_size(1000).build();
    }

    #[test]
    #[should_panic]
    fn block_too_small_for_one_slot_panics() {
        _ = ObjectPool::<[u8; 256]>::builder().block_size(64).build();
    }

    #[test]
    #[should_panic]
    fn zero_max_blocks_panics() {
        _ = ObjectPool::<u64>::builder().max_blocks(0).build();
    }

    #[test]
    fn debug_mentions_configuration() {
        let builder = ObjectPool::<u64>::builder().max_blocks(3);

        let output = format!("{builder:?}");
        assert!(output.contains("max_blocks: 3"));
        assert!(output.contains("u64"));
    }
}
