use std::ptr::NonNull;

use crate::Result;

/// A source of memory for elements of type `T`, used by containers that let the caller decide
/// where their elements live.
///
/// Implementations decide how many elements a single request may cover. A policy backed by
/// fixed-size chunks only ever hands out one element at a time, whereas a heap-backed policy
/// can satisfy contiguous arrays.
///
/// # Example
///
/// ```rust
/// use chunk_pool::{AllocationPolicy, ChunkPolicy, ChunkPoolRegistry, Error, HeapPolicy};
///
/// let registry = ChunkPoolRegistry::new();
/// let chunks = ChunkPolicy::<u64>::new(&registry);
///
/// let one = chunks.allocate(1).unwrap();
/// // SAFETY: Allocated above from the same policy with the same count.
/// unsafe { chunks.deallocate(one, 1).unwrap() };
///
/// assert!(matches!(
///     chunks.allocate(2),
///     Err(Error::UnsupportedMultiElement { count: 2 })
/// ));
///
/// let heap = HeapPolicy::<u64>::new();
/// let many = heap.allocate(2).unwrap();
/// // SAFETY: Allocated above from the same policy with the same count.
/// unsafe { heap.deallocate(many, 2).unwrap() };
/// ```
pub trait AllocationPolicy<T> {
    /// Allocates uninitialized memory for `count` contiguous elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy does not support `count` elements in one request or if
    /// no memory is available.
    fn allocate(&self, count: usize) -> Result<NonNull<T>>;

    /// Releases memory previously obtained from [`allocate()`](Self::allocate).
    ///
    /// # Errors
    ///
    /// Returns an error if the policy does not support `count` elements in one request. The
    /// memory is not released in that case.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate(count)` of this policy or of a policy equal
    /// to it, with the same `count`. Any elements in the memory must already have been
    /// dropped and the memory must not be used after this call.
    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) -> Result<()>;

    /// The largest `count` that [`allocate()`](Self::allocate) can ever satisfy.
    fn max_size(&self) -> usize;
}

/// Converts an allocation policy for one element type into a policy of the same family for
/// another element type.
///
/// Containers use this to allocate their internal nodes through the policy they were given
/// for their elements.
pub trait Rebind {
    /// The policy of the same family for elements of type `U`.
    type Rebound<U>: AllocationPolicy<U> + Rebind;

    /// Creates the policy of the same family for elements of type `U`.
    #[must_use]
    fn rebind<U>(&self) -> Self::Rebound<U>;
}
