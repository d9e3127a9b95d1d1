use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::iter::FusedIterator;
use std::num::NonZero;
use std::rc::{Rc, Weak};
use std::thread;

use new_zealand::nz;
use tracing::trace;

use crate::{
    DropPolicy, ErasedPool, Error, Handle, ObjectPoolBuilder, RecordId, Result, SlotStorage,
};

/// Size in bytes of each memory block allocated by a pool with the default configuration.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Maximum number of memory blocks a pool with the default configuration may allocate.
pub const DEFAULT_MAX_BLOCKS: NonZero<usize> = nz!(256);

/// A compacting pool of objects of type `T`, handing out generation-checked [`Handle`]s.
///
/// Live objects always occupy the dense logical index range `0..len()`. Destroying an object
/// moves the last object into the vacated slot, so positional access and iteration never have
/// to skip holes. Handles track their object across such moves.
///
/// Memory is allocated in fixed-size blocks, one block at a time, up to a configurable maximum
/// number of blocks. Blocks are only released when the pool is dropped.
///
/// # Example
///
/// ```rust
/// use handle_pool::ObjectPool;
///
/// let mut pool = ObjectPool::<String>::new();
///
/// let mut hello = pool.create_object("Hello".to_string()).unwrap();
/// let world = pool.create_object("world".to_string()).unwrap();
///
/// assert_eq!(pool.len(), 2);
///
/// // Destroying the first object moves the last one into its place.
/// assert!(hello.destroy());
/// assert_eq!(*pool.at(0).unwrap(), "world");
/// assert_eq!(pool.get(&world).as_deref().map(String::as_str), Some("world"));
/// ```
///
/// # Thread safety
///
/// The pool is single-threaded. Neither the pool nor its handles can be sent to other threads.
pub struct ObjectPool<T: 'static> {
    core: Rc<PoolCore<T>>,
}

impl<T: 'static> ObjectPool<T> {
    /// Creates a pool with the default configuration.
    ///
    /// The first memory block is allocated immediately.
    ///
    /// # Panics
    ///
    /// Panics if the first memory block cannot be allocated.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`ObjectPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::ObjectPool;
    ///
    /// let pool = ObjectPool::<u64>::builder()
    ///     .block_size(1024)
    ///     .max_blocks(16)
    ///     .build();
    ///
    /// assert_eq!(pool.block_count(), 1);
    /// assert_eq!(pool.max_capacity(), 16 * pool.objects_per_block());
    /// ```
    pub fn builder() -> ObjectPoolBuilder<T> {
        ObjectPoolBuilder::new()
    }

    pub(crate) fn new_inner(config: PoolConfig) -> Self {
        let core = Rc::new_cyclic(|self_weak: &Weak<PoolCore<T>>| {
            let mut storage = SlotStorage::new(config.objects_per_block);

            let owner: Weak<dyn ErasedPool> = self_weak.clone();
            storage
                .allocate_block(owner)
                .expect("out of memory when allocating the first block of an object pool");

            PoolCore {
                config,
                state: RefCell::new(PoolState {
                    storage,
                    back: 0,
                    vacated_records: 0,
                    observers: Observers::default(),
                }),
                self_weak: self_weak.clone(),
            }
        });

        Self { core }
    }

    /// Size in bytes of each memory block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.core.config.block_size
    }

    /// How many objects fit into one memory block.
    #[must_use]
    pub fn objects_per_block(&self) -> usize {
        self.core.config.objects_per_block.get()
    }

    /// How many memory blocks the pool has allocated so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.core.state.borrow().storage.block_count()
    }

    /// How many objects the pool can hold without allocating another block.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.block_count()
            .checked_mul(self.objects_per_block())
            .expect("allocated blocks cannot exceed the size of virtual memory")
    }

    /// How many objects the pool can hold at most, with every permitted block allocated.
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.core
            .config
            .max_blocks
            .get()
            .saturating_mul(self.objects_per_block())
    }

    /// The number of live objects in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.state.borrow().back
    }

    /// Whether the pool contains no live objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves `value` into the pool and returns a handle to it.
    ///
    /// The object is stored at logical index `len()`. A new memory block is allocated if all
    /// existing blocks are full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExhausted`] if storing the object would need more blocks than
    /// the configured maximum, or [`Error::AllocationFailed`] if the system refuses to provide
    /// memory for a new block. The value is dropped in both cases.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::{Error, ObjectPool};
    ///
    /// let mut pool = ObjectPool::<u64>::builder()
    ///     .block_size(64)
    ///     .max_blocks(1)
    ///     .build();
    ///
    /// for value in 0..pool.objects_per_block() {
    ///     pool.create_object(value as u64).unwrap();
    /// }
    ///
    /// let result = pool.create_object(0);
    /// assert!(matches!(result, Err(Error::CapacityExhausted { max_blocks: 1 })));
    /// ```
    pub fn create_object(&mut self, value: T) -> Result<Handle<T>> {
        self.core.create(value)
    }

    /// Shared access to the object at logical index `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    ///
    /// # Panics
    ///
    /// Panics if the pool is mutably borrowed through [`Handle::with_mut()`].
    pub fn at(&self, index: usize) -> Result<Ref<'_, T>> {
        let state = self.core.state.borrow();
        state.check_index(index)?;

        Ok(Ref::map(state, |state| state.live_value(index)))
    }

    /// Exclusive access to the object at logical index `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    ///
    /// # Panics
    ///
    /// Panics if the pool is borrowed through a handle.
    pub fn at_mut(&mut self, index: usize) -> Result<RefMut<'_, T>> {
        let state = self.core.state.borrow_mut();
        state.check_index(index)?;

        Ok(RefMut::map(state, |state| state.live_value_mut(index)))
    }

    /// Shared access to the object referenced by `handle`.
    ///
    /// Returns `None` if the handle is stale, uninitialized or was issued by a different pool.
    #[must_use]
    pub fn get(&self, handle: &Handle<T>) -> Option<Ref<'_, T>> {
        if !handle.belongs_to(&self.core) {
            return None;
        }

        let record = handle.record()?;
        let state = self.core.state.borrow();
        let index = state.storage.live_index(record, handle.serial())?;

        Some(Ref::map(state, |state| state.live_value(index)))
    }

    /// Exclusive access to the object referenced by `handle`.
    ///
    /// Returns `None` if the handle is stale, uninitialized or was issued by a different pool.
    #[must_use]
    pub fn get_mut(&mut self, handle: &Handle<T>) -> Option<RefMut<'_, T>> {
        if !handle.belongs_to(&self.core) {
            return None;
        }

        let record = handle.record()?;
        let state = self.core.state.borrow_mut();
        let index = state.storage.live_index(record, handle.serial())?;

        Some(RefMut::map(state, |state| state.live_value_mut(index)))
    }

    /// Calls `f` with an iterator over the live objects in logical index order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::ObjectPool;
    ///
    /// let mut pool = ObjectPool::<u32>::new();
    ///
    /// for value in 1..=4 {
    ///     pool.create_object(value).unwrap();
    /// }
    ///
    /// let sum: u32 = pool.with_iter(|iter| iter.sum());
    /// assert_eq!(sum, 10);
    /// ```
    pub fn with_iter<R>(&self, f: impl FnOnce(ObjectPoolIter<'_, T>) -> R) -> R {
        let state = self.core.state.borrow();

        f(ObjectPoolIter {
            storage: &state.storage,
            front: 0,
            back: state.back,
        })
    }

    /// Creates a handle to the object at logical index `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn handle_at(&self, index: usize) -> Result<Handle<T>> {
        let state = self.core.state.borrow();
        state.check_index(index)?;

        Ok(self.core.handle_for_live_index(&state, index))
    }

    /// Creates a handle to `value`, which must be a reference to an object in this pool.
    ///
    /// Returns `None` if `value` does not live in this pool.
    #[must_use]
    pub fn handle_of(&self, value: &T) -> Option<Handle<T>> {
        self.core.handle_of(value)
    }

    /// Registers an observer that is called with every newly created object.
    ///
    /// This replaces any previously registered creation observer. The observer must not
    /// access the pool it is registered with.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// use handle_pool::ObjectPool;
    ///
    /// let created = Rc::new(Cell::new(0));
    ///
    /// let mut pool = ObjectPool::<u32>::new();
    /// pool.connect_object_creation_handler({
    ///     let created = Rc::clone(&created);
    ///     move |value| created.set(created.get() + *value)
    /// });
    ///
    /// pool.create_object(5).unwrap();
    /// pool.create_object(6).unwrap();
    ///
    /// assert_eq!(created.get(), 11);
    /// ```
    pub fn connect_object_creation_handler(&mut self, handler: impl FnMut(&T) + 'static) {
        self.core.state.borrow_mut().observers.on_create = Some(Box::new(handler));
    }

    /// Registers an observer that is called with every object that is about to be destroyed
    /// through its handle.
    ///
    /// This replaces any previously registered destruction observer. The observer must not
    /// access the pool it is registered with. Objects dropped together with the pool are not
    /// reported.
    pub fn connect_object_destruction_handler(&mut self, handler: impl FnMut(&T) + 'static) {
        self.core.state.borrow_mut().observers.on_destroy = Some(Box::new(handler));
    }

    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        self.core.state.borrow().integrity_check();
    }
}

impl<T: 'static> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("core", &self.core)
            .finish()
    }
}

/// Immutable configuration of a pool, resolved by the builder.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolConfig {
    pub(crate) block_size: usize,
    pub(crate) objects_per_block: NonZero<usize>,
    pub(crate) max_blocks: NonZero<usize>,
    pub(crate) drop_policy: DropPolicy,
}

/// The shared part of a pool that handles refer to (weakly).
pub(crate) struct PoolCore<T: 'static> {
    config: PoolConfig,
    state: RefCell<PoolState<T>>,
    self_weak: Weak<PoolCore<T>>,
}

impl<T: 'static> PoolCore<T> {
    fn create(&self, value: T) -> Result<Handle<T>> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let index = state.back;
        let coordinates = state.storage.coordinates(index);
        let max_blocks = self.config.max_blocks.get();

        if coordinates.block_id() >= max_blocks {
            return Err(Error::CapacityExhausted { max_blocks });
        }

        if coordinates.block_id() == state.storage.block_count() {
            let owner: Weak<dyn ErasedPool> = self.self_weak.clone();
            state.storage.allocate_block(owner)?;
        }

        let record = if state.vacated_records > 0 {
            // Cannot underflow because we just checked that it is positive.
            state.vacated_records = state.vacated_records.wrapping_sub(1);

            state
                .storage
                .slot(index)
                .lookup()
                .expect("a vacated record is always parked just past the live range")
        } else {
            // Every slot at or past the high water mark still has its own record unused.
            let record = RecordId::new(index);
            let slot = state.storage.slot_mut(index);
            slot.record_mut().advance_serial();
            slot.set_lookup(record);
            record
        };

        let lookup = state.storage.record_mut(record);
        lookup.set_location(coordinates);
        let serial = lookup.serial();

        state.storage.slot_mut(index).replace_value(value);

        // Cannot overflow because the index is bounded by the block ceiling, which we checked.
        state.back = index.wrapping_add(1);

        #[cfg(debug_assertions)]
        state.check_live_slot(index);

        if let Some(on_create) = state.observers.on_create.as_mut() {
            on_create(state.storage.slot(index).value().expect("we just stored the value"));
        }

        Ok(Handle::new(record, serial, self.self_weak.clone()))
    }

    /// Removes the object described by `record` from the pool if its generation is `serial`.
    ///
    /// The last live object is moved into the vacated slot to keep the live range dense. The
    /// removed value is returned so that it is dropped only once the pool is no longer borrowed.
    fn take_record(&self, record: RecordId, serial: u64) -> Option<T> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let vacated_index = state.storage.live_index(record, serial)?;

        if let Some(on_destroy) = state.observers.on_destroy.as_mut() {
            on_destroy(
                state
                    .storage
                    .slot(vacated_index)
                    .value()
                    .expect("every slot in the live range holds a value"),
            );
        }

        state.storage.record_mut(record).advance_serial();

        let last_index = state
            .back
            .checked_sub(1)
            .expect("a live record implies a non-empty pool");

        let dead = if vacated_index < last_index {
            let last = state.storage.slot_mut(last_index);

            let moved = last
                .take_value()
                .expect("every slot in the live range holds a value");
            let living = last
                .lookup()
                .expect("every slot in the live range references its record");

            // The freed record is parked where the live range now ends.
            last.set_lookup(record);

            let vacated_coordinates = state.storage.coordinates(vacated_index);
            state
                .storage
                .record_mut(living)
                .set_location(vacated_coordinates);

            trace!(
                from = last_index,
                to = vacated_index,
                "relocated object to keep live range dense"
            );

            let vacated = state.storage.slot_mut(vacated_index);
            vacated.set_lookup(living);
            vacated.replace_value(moved)
        } else {
            let vacated = state.storage.slot_mut(vacated_index);
            vacated.set_lookup(record);
            vacated.take_value()
        };

        // Cannot overflow because back + vacated records never exceeds the slot count.
        state.vacated_records = state.vacated_records.wrapping_add(1);
        state.back = last_index;

        #[cfg(debug_assertions)]
        {
            if vacated_index < last_index {
                state.check_live_slot(vacated_index);
            }

            state.check_parked_slot(last_index);
        }

        dead
    }

    pub(crate) fn handle_of(&self, value: &T) -> Option<Handle<T>> {
        let state = self.state.borrow();

        let index = state.storage.index_of(value)?;

        if index >= state.back {
            return None;
        }

        Some(self.handle_for_live_index(&state, index))
    }

    fn handle_for_live_index(&self, state: &PoolState<T>, index: usize) -> Handle<T> {
        let record = state
            .storage
            .slot(index)
            .lookup()
            .expect("every slot in the live range references its record");

        let serial = state
            .storage
            .record(record)
            .expect("records of live objects are always in allocated blocks")
            .serial();

        Handle::new(record, serial, self.self_weak.clone())
    }

    pub(crate) fn with_record<R>(
        &self,
        record: RecordId,
        serial: u64,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let state = self.state.borrow();
        let index = state.storage.live_index(record, serial)?;

        Some(f(state.live_value(index)))
    }

    pub(crate) fn with_record_mut<R>(
        &self,
        record: RecordId,
        serial: u64,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut state = self.state.borrow_mut();
        let index = state.storage.live_index(record, serial)?;

        Some(f(state.live_value_mut(index)))
    }
}

impl<T: 'static> ErasedPool for PoolCore<T> {
    fn current_serial(&self, record: RecordId) -> Option<u64> {
        self.state
            .borrow()
            .storage
            .record(record)
            .map(crate::LookupRecord::serial)
    }

    fn destroy_record(&self, record: RecordId, serial: u64) -> bool {
        let dead = self.take_record(record, serial);
        let destroyed = dead.is_some();

        // The borrow of the pool has ended, so the drop logic of the value may use the pool.
        drop(dead);

        destroyed
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl<T: 'static> Drop for PoolCore<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let had_objects = state.back > 0;

        // Handles can no longer upgrade their weak reference at this point, so dropping the
        // values cannot re-enter the pool.
        state.storage.release_blocks();
        state.back = 0;

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.config.drop_policy == DropPolicy::MustNotDropItems
            && had_objects
            && !thread::panicking()
        {
            panic!(
                "dropped an object pool that still contained objects when the drop policy forbids it"
            );
        }
    }
}

impl<T: 'static> fmt::Debug for PoolCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PoolCore");

        s.field(
            "item_type",
            &std::format_args!("{}", std::any::type_name::<T>()),
        )
        .field("config", &self.config);

        match self.state.try_borrow() {
            Ok(state) => s
                .field("len", &state.back)
                .field("vacated_records", &state.vacated_records)
                .field("block_count", &state.storage.block_count()),
            Err(_) => s.field("state", &"<borrowed>"),
        };

        s.finish_non_exhaustive()
    }
}

struct PoolState<T> {
    storage: SlotStorage<T>,

    /// Number of live objects. They occupy logical indexes `0..back`.
    back: usize,

    /// Number of freed lookup records parked at logical indexes `back..back + vacated_records`.
    vacated_records: usize,

    observers: Observers<T>,
}

impl<T> PoolState<T> {
    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.back {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.back,
            });
        }

        Ok(())
    }

    fn live_value(&self, index: usize) -> &T {
        self.storage
            .slot(index)
            .value()
            .expect("every slot in the live range holds a value")
    }

    fn live_value_mut(&mut self, index: usize) -> &mut T {
        self.storage
            .slot_mut(index)
            .value_mut()
            .expect("every slot in the live range holds a value")
    }

    /// Scans every slot ever used.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    fn integrity_check(&self) {
        let high_water_mark = self.storage.high_water_mark();

        assert_eq!(
            self.back.checked_add(self.vacated_records),
            Some(high_water_mark),
            "live objects and vacated records must add up to the number of records ever used"
        );

        for index in 0..self.back {
            self.check_live_slot(index);
        }

        for index in self.back..high_water_mark {
            self.check_parked_slot(index);
        }
    }

    /// Checks one slot of the live range in constant time.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    fn check_live_slot(&self, index: usize) {
        assert!(index < self.back, "slot {index} is past the live range");

        let slot = self.storage.slot(index);
        assert!(slot.value().is_some(), "live slot {index} holds no value");

        let record = slot.lookup().expect("live slot references no record");
        let location = self
            .storage
            .record(record)
            .expect("record of live slot is not in an allocated block")
            .location();

        assert_eq!(
            self.storage.index(location),
            index,
            "record of live slot {index} points elsewhere"
        );
    }

    /// Checks one slot just past the live range in constant time.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    fn check_parked_slot(&self, index: usize) {
        assert!(index >= self.back, "slot {index} is inside the live range");

        let slot = self.storage.slot(index);
        assert!(slot.value().is_none(), "vacated slot {index} holds a value");
        assert!(slot.lookup().is_some(), "vacated slot {index} parks no record");
    }
}

struct Observers<T> {
    on_create: Option<Box<dyn FnMut(&T)>>,
    on_destroy: Option<Box<dyn FnMut(&T)>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            on_create: None,
            on_destroy: None,
        }
    }
}

/// Iterator over the live objects of an [`ObjectPool`], in logical index order.
///
/// Obtained via [`ObjectPool::with_iter()`].
pub struct ObjectPoolIter<'p, T> {
    storage: &'p SlotStorage<T>,
    front: usize,
    back: usize,
}

impl<'p, T> Iterator for ObjectPoolIter<'p, T> {
    type Item = &'p T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }

        let value = self.storage.slot(self.front).value();

        // Cannot overflow because front < back.
        self.front = self.front.wrapping_add(1);

        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.saturating_sub(self.front);
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for ObjectPoolIter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }

        // Cannot underflow because back > front >= 0.
        self.back = self.back.wrapping_sub(1);

        self.storage.slot(self.back).value()
    }
}

impl<T> ExactSizeIterator for ObjectPoolIter<'_, T> {}

impl<T> FusedIterator for ObjectPoolIter<'_, T> {}

impl<T> fmt::Debug for ObjectPoolIter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPoolIter")
            .field("front", &self.front)
            .field("back", &self.back)
            .finish_non_exhaustive()
    }
}
