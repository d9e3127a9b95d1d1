use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::{Handle, PoolCore, RecordId};

/// The minimal capability a handle needs from its pool without knowing the object type.
pub(crate) trait ErasedPool {
    /// Current serial of the lookup record, or `None` if no such record exists.
    fn current_serial(&self, record: RecordId) -> Option<u64>;

    /// Destroys the object described by `record` if its generation is still `serial`.
    ///
    /// Returns whether an object was destroyed.
    fn destroy_record(&self, record: RecordId, serial: u64) -> bool;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A type-erased [`Handle`] that can be validated and used to destroy its object without
/// knowing the object's type.
///
/// Obtained via [`Handle::erase()`]. Use [`downcast()`](Self::downcast) to get a typed handle
/// back for accessing the object.
///
/// # Example
///
/// ```rust
/// use handle_pool::{ErasedHandle, ObjectPool};
///
/// let mut strings = ObjectPool::<String>::new();
/// let mut numbers = ObjectPool::<u64>::new();
///
/// // Handles to objects of different types can be stored side by side once erased.
/// let mut handles: Vec<ErasedHandle> = vec![
///     strings.create_object("hello".to_string()).unwrap().erase(),
///     numbers.create_object(42).unwrap().erase(),
/// ];
///
/// assert!(handles.iter().all(ErasedHandle::is_valid));
///
/// let number = handles[1].downcast::<u64>().unwrap();
/// assert_eq!(number.with(|value| *value), Some(42));
///
/// for handle in &mut handles {
///     assert!(handle.destroy());
/// }
///
/// assert!(strings.is_empty());
/// assert!(numbers.is_empty());
/// ```
///
/// # Thread safety
///
/// This type is single-threaded, like the pools it refers to.
#[derive(Clone, Default)]
pub struct ErasedHandle {
    record: Option<RecordId>,
    serial: u64,
    pool: Option<Weak<dyn ErasedPool>>,
}

impl ErasedHandle {
    pub(crate) fn new(record: RecordId, serial: u64, pool: Weak<dyn ErasedPool>) -> Self {
        Self {
            record: Some(record),
            serial,
            pool: Some(pool),
        }
    }

    /// Whether this handle was ever assigned an object.
    ///
    /// This stays `true` for copies of a handle whose object has been destroyed through
    /// another copy.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.serial > 0
    }

    /// Whether the object this handle refers to still exists.
    ///
    /// # Panics
    ///
    /// Panics if called from within a creation or destruction observer of the owning pool.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let (Some(record), Some(pool)) = (self.record, self.pool.as_ref()) else {
            return false;
        };

        let Some(pool) = pool.upgrade() else {
            return false;
        };

        pool.current_serial(record) == Some(self.serial)
    }

    /// The generation stamp carried by this handle. Zero for an uninitialized handle.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Destroys the referenced object and resets this handle.
    ///
    /// Returns `false` without doing anything if the handle is uninitialized, the object was
    /// already destroyed or the pool no longer exists.
    ///
    /// # Panics
    ///
    /// Panics if called from within a creation or destruction observer of the owning pool.
    pub fn destroy(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }

        let (Some(record), Some(pool)) = (self.record, self.pool.as_ref()) else {
            return false;
        };

        let Some(pool) = pool.upgrade() else {
            return false;
        };

        if !pool.destroy_record(record, self.serial) {
            return false;
        }

        self.reset();
        true
    }

    /// Clears the handle, returning it to the uninitialized state.
    pub fn reset(&mut self) {
        self.record = None;
        self.serial = 0;
        self.pool = None;
    }

    /// Recovers a typed handle if the object lives in a pool of `T` objects.
    ///
    /// Returns `None` if the handle is uninitialized, the pool no longer exists or the pool
    /// stores objects of a different type. A stale handle of the right type is still returned
    /// and remains stale.
    #[must_use]
    pub fn downcast<T: 'static>(&self) -> Option<Handle<T>> {
        let record = self.record?;
        let pool = self.pool.as_ref()?.upgrade()?;
        let pool = pool.into_any().downcast::<PoolCore<T>>().ok()?;

        Some(Handle::new(record, self.serial, Rc::downgrade(&pool)))
    }
}

impl fmt::Debug for ErasedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandle")
            .field("record", &self.record)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ErasedHandle {
    fn eq(&self, other: &Self) -> bool {
        let same_pool = match (&self.pool, &other.pool) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };

        same_pool && self.record == other.record && self.serial == other.serial
    }
}

impl Eq for ErasedHandle {}

impl Hash for ErasedHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pool
            .as_ref()
            .map(|pool| pool.as_ptr().cast::<()>())
            .hash(state);
        self.record.hash(state);
        self.serial.hash(state);
    }
}
