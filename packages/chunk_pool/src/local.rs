use std::cell::RefCell;
use std::num::NonZero;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{ChunkPool, ChunkPoolStats, Error, Result};

/// A single-threaded shared handle to a [`ChunkPool`].
///
/// Cloning the handle shares the same underlying pool, which stays alive as long as at least
/// one handle exists. This is the form in which allocation policies and the
/// [`ChunkPoolRegistry`][crate::ChunkPoolRegistry] hold on to pools.
///
/// # Single-threaded design
///
/// This type is neither [`Send`] nor [`Sync`]. To share a pool between threads, wrap a
/// [`ChunkPool`] in a `Mutex` instead.
///
/// # Example
///
/// ```rust
/// use chunk_pool::{ChunkPool, LocalChunkPool};
///
/// let pool = LocalChunkPool::from(ChunkPool::new(16));
/// let pool_clone = pool.clone();
///
/// let chunk = pool.alloc().unwrap();
///
/// // SAFETY: Both handles refer to the same pool, which handed out the chunk.
/// unsafe {
///     pool_clone.free(chunk.as_ptr());
/// }
///
/// assert_eq!(pool.stats().live, 0);
/// ```
#[derive(Clone, Debug)]
pub struct LocalChunkPool {
    inner: Rc<RefCell<ChunkPool>>,
}

impl From<ChunkPool> for LocalChunkPool {
    fn from(pool: ChunkPool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(pool)),
        }
    }
}

impl LocalChunkPool {
    /// Creates a shared pool for objects of `object_size` bytes with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `object_size` is zero or if the first block cannot be allocated.
    #[must_use]
    pub fn new(object_size: usize) -> Self {
        Self::from(ChunkPool::new(object_size))
    }

    /// Takes a chunk from the shared pool. See [`ChunkPool::alloc()`].
    #[must_use]
    pub fn alloc(&self) -> Option<NonNull<u8>> {
        self.inner.borrow_mut().alloc()
    }

    /// Returns a chunk to the shared pool. See [`ChunkPool::free()`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`alloc()`](Self::alloc) of this shared
    /// pool, which has not been freed since and is not used after this call.
    pub unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            self.inner.borrow_mut().free(ptr);
        }
    }

    /// (Re)initializes the shared pool. See [`ChunkPool::init()`].
    ///
    /// Other holders of the pool may still own chunks from it, so reinitialization is only
    /// permitted once every chunk has been freed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunksOutstanding`] and leaves the pool untouched if any chunk is still
    /// in use.
    ///
    /// Returns [`Error::OutOfMemory`] if the first block cannot be allocated.
    pub fn init(&self, chunks_per_block: NonZero<usize>) -> Result<()> {
        let mut pool = self.inner.borrow_mut();

        let live = pool.stats().live;
        if live > 0 {
            return Err(Error::ChunksOutstanding { live });
        }

        pool.init(chunks_per_block)
    }

    /// Whether the shared pool is initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().is_initialized()
    }

    /// Size in bytes of the object that fits into each chunk.
    #[must_use]
    pub fn object_size(&self) -> usize {
        self.inner.borrow().object_size()
    }

    /// Whether the shared pool may grow when no chunk is free.
    #[must_use]
    pub fn allows_resize(&self) -> bool {
        self.inner.borrow().allows_resize()
    }

    /// Sets whether the shared pool may grow when no chunk is free.
    pub fn set_allow_resize(&self, allow: bool) {
        self.inner.borrow_mut().set_allow_resize(allow);
    }

    /// Allocation statistics of the shared pool.
    #[must_use]
    pub fn stats(&self) -> ChunkPoolStats {
        self.inner.borrow().stats()
    }

    /// Whether both handles refer to the same underlying pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
