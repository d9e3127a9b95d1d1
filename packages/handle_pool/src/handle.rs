use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::rc::{Rc, Weak};

use crate::{ErasedHandle, ErasedPool, PoolCore, RecordId, directory};

/// A generation-checked reference to an object stored in an [`ObjectPool`][crate::ObjectPool].
///
/// A handle stays meaningful even when compaction moves its object to a different slot, because
/// it references the object's lookup record rather than the object itself. Destroying the
/// object advances the record's generation, which invalidates this handle and every copy of it
/// in O(1).
///
/// A handle does not keep its pool alive. Once the pool is dropped, every handle to it reports
/// itself as invalid and all operations through it fail.
///
/// # Example
///
/// ```rust
/// use handle_pool::ObjectPool;
///
/// let mut pool = ObjectPool::<String>::new();
///
/// let mut handle = pool.create_object("Hello".to_string()).unwrap();
/// let copy = handle.clone();
///
/// handle.with_mut(|value| value.push_str(", world"));
/// assert_eq!(copy.with(String::clone).as_deref(), Some("Hello, world"));
///
/// assert!(handle.destroy());
///
/// // Every copy observes the destruction.
/// assert!(!copy.is_valid());
/// assert_eq!(copy.with(String::len), None);
/// ```
///
/// # Thread safety
///
/// This type is single-threaded, like the pool it refers to.
pub struct Handle<T: 'static> {
    record: Option<RecordId>,
    serial: u64,
    pool: Weak<PoolCore<T>>,
}

impl<T: 'static> Handle<T> {
    pub(crate) fn new(record: RecordId, serial: u64, pool: Weak<PoolCore<T>>) -> Self {
        Self {
            record: Some(record),
            serial,
            pool,
        }
    }

    /// Reconstructs the handle of a live pooled object from a bare reference to the object.
    ///
    /// Returns `None` if `value` does not live in an [`ObjectPool`][crate::ObjectPool] owned by
    /// the current thread.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::{Handle, ObjectPool};
    ///
    /// let mut pool = ObjectPool::<u64>::new();
    /// let handle = pool.create_object(42).unwrap();
    ///
    /// let value = pool.at(0).unwrap();
    /// let recovered = Handle::from_payload(&*value).unwrap();
    /// drop(value);
    ///
    /// assert_eq!(recovered, handle);
    ///
    /// // References to values outside any pool do not resolve to a handle.
    /// assert!(Handle::from_payload(&42_u64).is_none());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the owning pool is mutably borrowed, e.g. when called from within
    /// [`with_mut()`](Self::with_mut) or an observer of that pool.
    #[must_use]
    pub fn from_payload(value: &T) -> Option<Self> {
        let pool = directory::lookup(ptr::from_ref(value).addr())?;
        let core = pool.into_any().downcast::<PoolCore<T>>().ok()?;

        core.handle_of(value)
    }

    /// Whether this handle was ever assigned an object.
    ///
    /// This stays `true` for copies of a handle whose object has been destroyed through
    /// another copy. Use [`is_valid()`](Self::is_valid) to check whether the object exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.serial > 0
    }

    /// Whether the object this handle refers to still exists.
    ///
    /// # Panics
    ///
    /// Panics if the owning pool is mutably borrowed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(record) = self.record else {
            return false;
        };

        let Some(core) = self.pool.upgrade() else {
            return false;
        };

        core.current_serial(record) == Some(self.serial)
    }

    /// The generation stamp carried by this handle. Zero for an uninitialized handle.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Calls `f` with a shared reference to the object if the handle is valid.
    ///
    /// Returns `None` without calling `f` if the object no longer exists.
    ///
    /// # Panics
    ///
    /// Panics if the owning pool is mutably borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let record = self.record?;
        let core = self.pool.upgrade()?;

        core.with_record(record, self.serial, f)
    }

    /// Calls `f` with an exclusive reference to the object if the handle is valid.
    ///
    /// Returns `None` without calling `f` if the object no longer exists.
    ///
    /// # Panics
    ///
    /// Panics if the owning pool is already borrowed, e.g. by an outstanding
    /// [`at()`][crate::ObjectPool::at] guard.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let record = self.record?;
        let core = self.pool.upgrade()?;

        core.with_record_mut(record, self.serial, f)
    }

    /// Destroys the referenced object and resets this handle.
    ///
    /// Returns `false` without doing anything if the handle is uninitialized, the object was
    /// already destroyed or the pool no longer exists. A handle whose destruction fails keeps
    /// its state, so it continues to report itself as initialized but invalid.
    ///
    /// If the destroyed object was not the last one in the pool, the last object is moved into
    /// its slot. Handles to the moved object remain valid.
    ///
    /// # Panics
    ///
    /// Panics if the owning pool is already borrowed.
    pub fn destroy(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let Some(record) = self.record else {
            return false;
        };

        let Some(core) = self.pool.upgrade() else {
            return false;
        };

        if !core.destroy_record(record, self.serial) {
            return false;
        }

        self.reset();
        true
    }

    /// Clears the handle, returning it to the uninitialized state.
    ///
    /// This does not affect the referenced object or any other copy of the handle.
    pub fn reset(&mut self) {
        self.record = None;
        self.serial = 0;
        self.pool = Weak::new();
    }

    /// Converts the handle into a type-erased form that can be stored alongside handles to
    /// objects of other types.
    #[must_use]
    pub fn erase(self) -> ErasedHandle {
        let Some(record) = self.record else {
            return ErasedHandle::default();
        };

        let pool: Weak<dyn ErasedPool> = self.pool;
        ErasedHandle::new(record, self.serial, pool)
    }

    /// Whether this handle was issued by the pool whose core is `core`.
    pub(crate) fn belongs_to(&self, core: &Rc<PoolCore<T>>) -> bool {
        ptr::eq(self.pool.as_ptr(), Rc::as_ptr(core))
    }

    pub(crate) fn record(&self) -> Option<RecordId> {
        self.record
    }
}

impl<T: 'static> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            record: self.record,
            serial: self.serial,
            pool: Weak::clone(&self.pool),
        }
    }
}

impl<T: 'static> Default for Handle<T> {
    /// Creates an uninitialized handle that refers to no object.
    fn default() -> Self {
        Self {
            record: None,
            serial: 0,
            pool: Weak::new(),
        }
    }
}

impl<T: 'static> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("record", &self.record)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.pool, &other.pool)
            && self.record == other.record
            && self.serial == other.serial
    }
}

impl<T: 'static> Eq for Handle<T> {}

impl<T: 'static> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pool.as_ptr().hash(state);
        self.record.hash(state);
        self.serial.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::ObjectPool;

    assert_impl_all!(Handle<String>: Clone, Default, fmt::Debug, Eq, Hash);
    assert_not_impl_any!(Handle<u32>: Send, Sync);

    #[test]
    fn default_is_uninitialized() {
        let mut handle = Handle::<u32>::default();

        assert!(!handle.is_initialized());
        assert!(!handle.is_valid());
        assert_eq!(handle.serial(), 0);
        assert_eq!(handle.with(|value| *value), None);
        assert!(!handle.destroy());
    }

    #[test]
    fn first_use_has_serial_one() {
        let mut pool = ObjectPool::<u32>::new();
        let handle = pool.create_object(5).unwrap();

        assert_eq!(handle.serial(), 1);
        assert!(handle.is_initialized());
        assert!(handle.is_valid());
    }

    #[test]
    fn destroy_resets_only_on_success() {
        let mut pool = ObjectPool::<u32>::new();
        let mut handle = pool.create_object(5).unwrap();
        let mut copy = handle.clone();

        assert!(handle.destroy());
        assert!(!handle.is_initialized());

        assert!(!copy.destroy());
        assert!(copy.is_initialized());
        assert!(!copy.is_valid());
    }

    #[test]
    fn reset_is_repeatable() {
        let mut pool = ObjectPool::<u32>::new();
        let mut handle = pool.create_object(5).unwrap();

        handle.reset();
        handle.reset();

        assert_eq!(handle, Handle::default());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn with_mut_modifies_object() {
        let mut pool = ObjectPool::<u32>::new();
        let handle = pool.create_object(5).unwrap();

        let doubled = handle.with_mut(|value| {
            *value = 6;
            *value * 2
        });

        assert_eq!(doubled, Some(12));

        assert_eq!(*pool.at(0).unwrap(), 6);
    }

    #[test]
    fn equality_distinguishes_pools() {
        let mut first = ObjectPool::<u32>::new();
        let mut second = ObjectPool::<u32>::new();

        let a = first.create_object(1).unwrap();
        let b = second.create_object(1).unwrap();

        // Same record index and serial, different pools.
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn equality_distinguishes_generations() {
        let mut pool = ObjectPool::<u32>::new();

        let mut first = pool.create_object(1).unwrap();
        let stale = first.clone();
        assert!(first.destroy());

        let second = pool.create_object(2).unwrap();

        assert_ne!(stale, second);
        assert_ne!(stale.serial(), second.serial());
    }

    #[test]
    fn handles_work_as_set_keys() {
        let mut pool = ObjectPool::<u32>::new();

        let a = pool.create_object(1).unwrap();
        let b = pool.create_object(2).unwrap();

        let set: HashSet<_> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn from_payload_of_foreign_type_in_pool_memory_is_none() {
        let mut pool = ObjectPool::<(u64, u64)>::new();
        pool.create_object((1, 2)).unwrap();

        let pair = pool.at(0).unwrap();

        // The address belongs to a pool, but of a different element type.
        assert!(Handle::<u64>::from_payload(&pair.0).is_none());
    }

    #[test]
    fn from_payload_after_relocation_finds_moved_object() {
        let mut pool = ObjectPool::<u32>::new();

        let mut a = pool.create_object(1).unwrap();
        let c = pool.create_object(3).unwrap();
        assert!(a.destroy());

        let value = pool.at(0).unwrap();
        let recovered = Handle::from_payload(&*value).unwrap();
        drop(value);

        assert_eq!(recovered, c);
    }
}
