use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use crate::{AllocationPolicy, Result};

/// An owning pointer to a single value stored in memory obtained from an [`AllocationPolicy`].
///
/// This is the smallest container that lets the caller choose where its element lives. When
/// the box is dropped, the value is dropped and its memory is returned through the same policy.
///
/// # Example
///
/// ```rust
/// use chunk_pool::{ChunkPolicy, ChunkPoolRegistry, PolicyBox};
///
/// let registry = ChunkPoolRegistry::new();
///
/// let mut boxed = PolicyBox::new_in([1_u32, 2, 3], ChunkPolicy::new(&registry)).unwrap();
/// boxed[1] = 20;
///
/// assert_eq!(*boxed, [1, 20, 3]);
/// assert_eq!(boxed.into_inner(), [1, 20, 3]);
/// ```
pub struct PolicyBox<T, P: AllocationPolicy<T>> {
    ptr: NonNull<T>,
    policy: P,

    _owns: PhantomData<T>,
}

impl<T, P: AllocationPolicy<T>> PolicyBox<T, P> {
    /// Moves `value` into memory allocated through `policy`.
    ///
    /// # Errors
    ///
    /// Returns the error of the policy if it cannot allocate a single element. The value is
    /// dropped in that case.
    pub fn new_in(value: T, policy: P) -> Result<Self> {
        let ptr = policy.allocate(1)?;

        // SAFETY: The policy just handed us memory for one element of `T`.
        unsafe {
            ptr.write(value);
        }

        Ok(Self {
            ptr,
            policy,
            _owns: PhantomData,
        })
    }

    /// The policy that owns the memory of the value.
    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Moves the value out of the box and releases its memory.
    #[must_use]
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);

        // SAFETY: The value is initialized and we never touch it again through `this`.
        let value = unsafe { this.ptr.read() };

        // SAFETY: We take the policy out exactly once and `this` is never dropped.
        let policy = unsafe { ptr::read(&this.policy) };

        // SAFETY: The memory came from `allocate(1)` of this policy and its value was
        // moved out above.
        unsafe { release(&policy, this.ptr) };

        value
    }
}

/// Returns the memory of one element to the policy that allocated it.
///
/// # Safety
///
/// `ptr` must come from `policy.allocate(1)` and hold no live value.
unsafe fn release<T, P: AllocationPolicy<T>>(policy: &P, ptr: NonNull<T>) {
    // SAFETY: Forwarding the caller's guarantees.
    unsafe { policy.deallocate(ptr, 1) }
        .expect("a policy that allocated a single element must accept it back");
}

impl<T, P: AllocationPolicy<T>> Deref for PolicyBox<T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The value is initialized for as long as the box exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, P: AllocationPolicy<T>> DerefMut for PolicyBox<T, P> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The value is initialized for as long as the box exists and `&mut self`
        // guarantees exclusive access.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, P: AllocationPolicy<T>> Drop for PolicyBox<T, P> {
    fn drop(&mut self) {
        // SAFETY: The value is initialized and is never accessed again.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
        }

        // SAFETY: The memory came from `allocate(1)` of this policy and its value was
        // dropped above.
        unsafe { release(&self.policy, self.ptr) };
    }
}

impl<T: fmt::Debug, P: AllocationPolicy<T> + fmt::Debug> fmt::Debug for PolicyBox<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyBox")
            .field("value", &**self)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::{ChunkPolicy, ChunkPoolRegistry, Error, HeapPolicy};

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get().wrapping_add(1));
        }
    }

    #[test]
    fn chunk_backed_box_returns_its_chunk() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<String>::new(&registry);

        let boxed = PolicyBox::new_in("pooled".to_string(), policy.clone()).unwrap();

        assert_eq!(*boxed, "pooled");
        assert_eq!(policy.pool().stats().live, 1);

        drop(boxed);
        assert_eq!(policy.pool().stats().live, 0);
    }

    #[test]
    fn drop_runs_value_destructor() {
        let drops = Rc::new(Cell::new(0));

        let boxed = PolicyBox::new_in(DropCounter(Rc::clone(&drops)), HeapPolicy::new()).unwrap();
        assert_eq!(drops.get(), 0);

        drop(boxed);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn into_inner_does_not_drop_value() {
        let registry = ChunkPoolRegistry::new();
        let drops = Rc::new(Cell::new(0));

        let boxed =
            PolicyBox::new_in(DropCounter(Rc::clone(&drops)), ChunkPolicy::new(&registry)).unwrap();
        let policy = boxed.policy().clone();

        let value = boxed.into_inner();
        assert_eq!(drops.get(), 0);
        assert_eq!(policy.pool().stats().live, 0);

        drop(value);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn deref_mut_modifies_value() {
        let mut boxed = PolicyBox::new_in(vec![1, 2], HeapPolicy::new()).unwrap();

        boxed.push(3);

        assert_eq!(*boxed, vec![1, 2, 3]);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let registry = ChunkPoolRegistry::new();
        let policy = ChunkPolicy::<u64>::new(&registry);
        policy.pool().set_allow_resize(false);

        let boxes: Vec<_> = (0..policy.pool().stats().total_chunks)
            .map(|index| PolicyBox::new_in(u64::try_from(index).unwrap(), policy.clone()).unwrap())
            .collect();

        let result = PolicyBox::new_in(0_u64, policy.clone());
        assert!(matches!(result, Err(Error::OutOfMemory { .. })));

        drop(boxes);
        assert_eq!(policy.pool().stats().live, 0);
    }

    #[test]
    fn debug_shows_value() {
        let boxed = PolicyBox::new_in(7_u8, HeapPolicy::new()).unwrap();

        assert!(format!("{boxed:?}").contains('7'));
    }
}
