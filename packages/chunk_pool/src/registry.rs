use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::rc::Rc;

use foldhash::{HashMap, HashMapExt};

use crate::{ChunkPool, DEFAULT_CHUNKS_PER_BLOCK, LocalChunkPool};

/// A single-threaded collection of shared chunk pools, one per object size.
///
/// The registry creates a pool the first time an object size is requested and hands out the
/// same pool for every later request of that size. Allocation policies use it to find a pool
/// for the element type they are rebound to.
///
/// Cloning the registry shares the same collection of pools.
///
/// # Example
///
/// ```rust
/// use chunk_pool::ChunkPoolRegistry;
///
/// let registry = ChunkPoolRegistry::new();
///
/// let a = registry.pool_for::<u64>();
/// let b = registry.pool_for::<i64>();
///
/// // Both types are 8 bytes, so they share one pool.
/// assert!(a.ptr_eq(&b));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Clone)]
pub struct ChunkPoolRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

struct RegistryInner {
    /// We use foldhash for better performance with small hash tables.
    pools: HashMap<usize, LocalChunkPool>,

    chunks_per_block: NonZero<usize>,
}

impl ChunkPoolRegistry {
    /// Creates an empty registry whose pools use the default number of chunks per block.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunks_per_block(DEFAULT_CHUNKS_PER_BLOCK)
    }

    /// Creates an empty registry whose pools use `chunks_per_block` chunks per block.
    #[must_use]
    pub fn with_chunks_per_block(chunks_per_block: NonZero<usize>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                pools: HashMap::new(),
                chunks_per_block,
            })),
        }
    }

    /// The shared pool for objects of `object_size` bytes, creating it if necessary.
    ///
    /// # Panics
    ///
    /// Panics if `object_size` is zero or if a new pool cannot allocate its first block.
    #[must_use]
    pub fn pool_for_size(&self, object_size: usize) -> LocalChunkPool {
        let mut inner = self.inner.borrow_mut();
        let chunks_per_block = inner.chunks_per_block.get();

        inner
            .pools
            .entry(object_size)
            .or_insert_with(|| {
                LocalChunkPool::from(
                    ChunkPool::builder()
                        .object_size(object_size)
                        .chunks_per_block(chunks_per_block)
                        .build(),
                )
            })
            .clone()
    }

    /// The shared pool for objects of type `T`, creating it if necessary.
    ///
    /// Zero-sized types share the pool for one-byte objects.
    #[must_use]
    pub fn pool_for<T>(&self) -> LocalChunkPool {
        self.pool_for_size(mem::size_of::<T>().max(1))
    }

    /// Whether a pool for objects of `object_size` bytes has been created.
    #[must_use]
    pub fn contains_size(&self, object_size: usize) -> bool {
        self.inner.borrow().pools.contains_key(&object_size)
    }

    /// Number of pools in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().pools.len()
    }

    /// Whether the registry has not created any pools yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pools.is_empty()
    }
}

impl Default for ChunkPoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChunkPoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = self.inner.try_borrow() else {
            return f.write_str("ChunkPoolRegistry { <borrowed> }");
        };

        let mut sizes: Vec<_> = inner.pools.keys().copied().collect();
        sizes.sort_unstable();

        f.debug_struct("ChunkPoolRegistry")
            .field("object_sizes", &sizes)
            .field("chunks_per_block", &inner.chunks_per_block)
            .finish()
    }
}
