use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use crate::{
    AllocationPolicy, CHUNK_ALIGN, ChunkPoolRegistry, Error, LocalChunkPool, Rebind, Result,
};

/// An [`AllocationPolicy`] that serves single elements from the chunk pool for the element
/// size.
///
/// The pool is obtained from a [`ChunkPoolRegistry`], so every policy for types of the same
/// size shares one pool. Requests for any number of elements other than one are rejected with
/// [`Error::UnsupportedMultiElement`].
///
/// # Example
///
/// ```rust
/// use chunk_pool::{ChunkPolicy, ChunkPoolRegistry, PolicyBox, Rebind};
///
/// let registry = ChunkPoolRegistry::new();
/// let policy = ChunkPolicy::<u64>::new(&registry);
///
/// let boxed = PolicyBox::new_in(42_u64, policy.clone()).unwrap();
/// assert_eq!(*boxed, 42);
/// assert_eq!(policy.pool().stats().live, 1);
///
/// // A policy for a type of the same size shares the pool.
/// let rebound = policy.rebind::<i64>();
/// assert_eq!(policy, rebound);
/// ```
pub struct ChunkPolicy<T> {
    pool: LocalChunkPool,
    registry: ChunkPoolRegistry,

    _item: PhantomData<fn() -> T>,
}

impl<T> ChunkPolicy<T> {
    /// Creates a policy backed by the pool that `registry` provides for `T`.
    ///
    /// # Panics
    ///
    /// Panics if the registry needs to create the pool and cannot allocate its first block.
    #[must_use]
    pub fn new(registry: &ChunkPoolRegistry) -> Self {
        Self {
            pool: registry.pool_for::<T>(),
            registry: registry.clone(),
            _item: PhantomData,
        }
    }

    /// The chunk pool that backs this policy.
    #[must_use]
    pub fn pool(&self) -> &LocalChunkPool {
        &self.pool
    }

    fn check_alignment() -> Result<()> {
        let align = mem::align_of::<T>();

        if align > CHUNK_ALIGN {
            return Err(Error::UnsupportedAlignment {
                align,
                supported: CHUNK_ALIGN,
            });
        }

        Ok(())
    }
}

impl<T> AllocationPolicy<T> for ChunkPolicy<T> {
    fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        if count != 1 {
            return Err(Error::UnsupportedMultiElement { count });
        }

        Self::check_alignment()?;

        self.pool
            .alloc()
            .map(NonNull::cast)
            .ok_or_else(|| Error::OutOfMemory {
                object_size: self.pool.object_size(),
            })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) -> Result<()> {
        if count != 1 {
            return Err(Error::UnsupportedMultiElement { count });
        }

        // SAFETY: The caller guarantees the memory came from `allocate(1)` of an equal policy,
        // that is, from this same chunk pool.
        unsafe {
            self.pool.free(ptr.cast::<u8>().as_ptr());
        }

        Ok(())
    }

    fn max_size(&self) -> usize {
        1
    }
}

impl<T> Rebind for ChunkPolicy<T> {
    type Rebound<U> = ChunkPolicy<U>;

    fn rebind<U>(&self) -> ChunkPolicy<U> {
        ChunkPolicy::new(&self.registry)
    }
}

impl<T> Clone for ChunkPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ChunkPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPolicy")
            .field("item_type", &format_args!("{}", std::any::type_name::<T>()))
            .field("pool", &self.pool)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<T, U> PartialEq<ChunkPolicy<U>> for ChunkPolicy<T> {
    fn eq(&self, other: &ChunkPolicy<U>) -> bool {
        self.pool.ptr_eq(&other.pool)
    }
}

impl<T> Eq for ChunkPolicy<T> {}

#[cfg(test)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(ChunkPolicy<u64>: Clone, Eq);
    assert_not_impl_any!(ChunkPolicy<u64>: Send, Sync);

    #[test]
    fn single_element_round_trip() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u32>::new(&registry);

        let ptr = policy.allocate(1).unwrap();
        assert_eq!(policy.pool().stats().live, 1);

        // SAFETY: Allocated above from the same policy with the same count.
        unsafe { policy.deallocate(ptr, 1).unwrap() };
        assert_eq!(policy.pool().stats().live, 0);
    }

    #[test]
    fn multi_element_requests_are_rejected() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u32>::new(&registry);

        assert!(matches!(
            policy.allocate(0),
            Err(Error::UnsupportedMultiElement { count: 0 })
        ));
        assert!(matches!(
            policy.allocate(3),
            Err(Error::UnsupportedMultiElement { count: 3 })
        ));

        let ptr = policy.allocate(1).unwrap();

        // SAFETY: The request is rejected before the memory is touched.
        let result = unsafe { policy.deallocate(ptr, 2) };
        assert!(matches!(
            result,
            Err(Error::UnsupportedMultiElement { count: 2 })
        ));

        // SAFETY: Allocated above from the same policy with the same count.
        unsafe { policy.deallocate(ptr, 1).unwrap() };
    }

    #[test]
    fn max_size_is_one() {
        let registry = ChunkPoolRegistry::new();

        assert_eq!(ChunkPolicy::<[u8; 100]>::new(&registry).max_size(), 1);
    }

    #[test]
    fn over_aligned_types_are_rejected() {
        #[repr(align(64))]
        struct Wide(#[expect(dead_code, reason = "only the alignment matters")] u8);

        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<Wide>::new(&registry);

        assert!(matches!(
            policy.allocate(1),
            Err(Error::UnsupportedAlignment { align: 64, .. })
        ));
    }

    #[test]
    fn exhausted_pool_reports_out_of_memory() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u64>::new(&registry);
        policy.pool().set_allow_resize(false);

        let capacity = policy.pool().stats().total_chunks;
        let taken: Vec<_> = (0..capacity)
            .map(|_| policy.allocate(1).unwrap())
            .collect();

        assert!(matches!(
            policy.allocate(1),
            Err(Error::OutOfMemory { object_size: 8 })
        ));

        for ptr in taken {
            // SAFETY: Allocated above from the same policy with the same count.
            unsafe { policy.deallocate(ptr, 1).unwrap() };
        }
    }

    #[test]
    fn rebind_same_size_shares_pool() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u32>::new(&registry);

        let rebound = policy.rebind::<f32>();

        assert!(policy.pool().ptr_eq(rebound.pool()));
        assert_eq!(policy, rebound);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rebind_other_size_uses_other_pool() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u32>::new(&registry);

        let rebound = policy.rebind::<[u64; 3]>();

        assert_ne!(policy, rebound);
        assert_eq!(rebound.pool().object_size(), 24);
        assert_eq!(registry.len(), 2);

        // Rebinding back lands on the first pool again.
        assert_eq!(rebound.rebind::<u32>(), policy);
    }

    #[test]
    fn policies_from_different_registries_differ() {
        let a = ChunkPolicy::<u32>::new(&ChunkPoolRegistry::new());
        let b = ChunkPolicy::<u32>::new(&ChunkPoolRegistry::new());

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
