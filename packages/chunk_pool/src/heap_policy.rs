use std::alloc::{Layout, alloc, dealloc};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use crate::{AllocationPolicy, Error, Rebind, Result};

/// An [`AllocationPolicy`] that allocates from the global allocator.
///
/// Any number of elements up to [`max_size()`](AllocationPolicy::max_size) can be allocated
/// in one request. All heap policies are interchangeable and compare equal.
///
/// # Example
///
/// ```rust
/// use chunk_pool::{HeapPolicy, PolicyBox};
///
/// let boxed = PolicyBox::new_in("hello".to_string(), HeapPolicy::new()).unwrap();
///
/// assert_eq!(boxed.len(), 5);
/// ```
pub struct HeapPolicy<T> {
    _item: PhantomData<fn() -> T>,
}

impl<T> HeapPolicy<T> {
    /// Creates a heap policy for elements of type `T`.
    #[must_use]
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }

    fn layout_for(&self, count: usize) -> Result<Layout> {
        let overflow = Error::CapacityOverflow {
            count,
            size: mem::size_of::<T>(),
        };

        if count > self.max_size() {
            return Err(overflow);
        }

        Layout::array::<T>(count).map_err(|_layout_error| overflow)
    }
}

impl<T> AllocationPolicy<T> for HeapPolicy<T> {
    fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        let layout = self.layout_for(count)?;

        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        // SAFETY: The layout has a non-zero size.
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr.cast::<T>()).ok_or(Error::OutOfMemory {
            object_size: mem::size_of::<T>(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) -> Result<()> {
        let layout = self.layout_for(count)?;

        if layout.size() == 0 {
            return Ok(());
        }

        // SAFETY: The caller guarantees the memory came from `allocate(count)`, which used
        // this same layout.
        unsafe {
            dealloc(ptr.cast::<u8>().as_ptr(), layout);
        }

        Ok(())
    }

    fn max_size(&self) -> usize {
        // Zero-sized elements take no memory, so any count fits.
        isize::MAX
            .unsigned_abs()
            .checked_div(mem::size_of::<T>())
            .unwrap_or(usize::MAX)
    }
}

impl<T> Rebind for HeapPolicy<T> {
    type Rebound<U> = HeapPolicy<U>;

    fn rebind<U>(&self) -> HeapPolicy<U> {
        HeapPolicy::new()
    }
}

impl<T> Clone for HeapPolicy<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeapPolicy<T> {}

impl<T> Default for HeapPolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HeapPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPolicy")
            .field("item_type", &format_args!("{}", std::any::type_name::<T>()))
            .finish()
    }
}

impl<T, U> PartialEq<HeapPolicy<U>> for HeapPolicy<T> {
    fn eq(&self, _other: &HeapPolicy<U>) -> bool {
        true
    }
}

impl<T> Eq for HeapPolicy<T> {}
