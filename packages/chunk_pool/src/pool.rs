use std::alloc::{alloc, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use tracing::{debug, warn};

use crate::{ChunkLayout, ChunkPoolBuilder, DropPolicy, Error, Result, chunk_layout};

/// A growable free-list allocator of fixed-size memory chunks.
///
/// Every chunk is large enough for one object of the configured object size. Chunks are carved
/// out of blocks that each hold a fixed number of chunks. Free chunks form a singly linked list
/// threaded through a small header in front of every chunk, so allocation and deallocation are
/// O(1) and free chunks are reused in LIFO order.
///
/// When the free list is exhausted, the pool grows by one block (unless growth is disallowed).
/// Blocks are never returned to the system allocator until the pool is destroyed or dropped.
///
/// The pool performs no validity checking. Every pointer obtained from [`alloc()`][1] must be
/// passed to [`free()`][2] at most once and must not be used afterwards.
///
/// # Example
///
/// ```rust
/// use chunk_pool::ChunkPool;
///
/// let mut pool = ChunkPool::new(24);
///
/// let chunk = pool.alloc().unwrap();
///
/// // SAFETY: The chunk is at least 24 bytes and we own it until we free it.
/// unsafe {
///     chunk.cast::<u64>().write(42);
///     assert_eq!(chunk.cast::<u64>().read(), 42);
/// }
///
/// // SAFETY: The chunk came from this pool and is not used after this.
/// unsafe {
///     pool.free(chunk.as_ptr());
/// }
///
/// // The chunk that was freed last is the next one to be handed out.
/// assert_eq!(pool.alloc(), Some(chunk));
/// # unsafe { pool.free(chunk.as_ptr()) };
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but has no internal synchronization. Wrap it in a
/// `Mutex` to allocate from multiple threads.
///
/// [1]: Self::alloc
/// [2]: Self::free
#[derive(Debug)]
pub struct ChunkPool {
    layout: ChunkLayout,

    /// Every block ever allocated, so they can all be released at teardown.
    blocks: Vec<NonNull<u8>>,

    /// First chunk of the free list, if any chunk is free.
    head: Option<NonNull<u8>>,

    allow_resize: bool,
    initialized: bool,

    /// Number of chunks currently handed out.
    live: usize,

    /// Highest value `live` has reached since the pool was last initialized.
    peak: usize,

    drop_policy: DropPolicy,
}

impl ChunkPool {
    /// Creates a pool for objects of `object_size` bytes with the default configuration.
    ///
    /// The pool is initialized with one block of
    /// [`DEFAULT_CHUNKS_PER_BLOCK`][crate::DEFAULT_CHUNKS_PER_BLOCK] chunks.
    ///
    /// # Panics
    ///
    /// Panics if `object_size` is zero or if the first block cannot be allocated.
    #[must_use]
    pub fn new(object_size: usize) -> Self {
        Self::builder().object_size(object_size).build()
    }

    /// Starts building a new [`ChunkPool`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use chunk_pool::ChunkPool;
    ///
    /// let pool = ChunkPool::builder()
    ///     .object_size_of::<[u64; 4]>()
    ///     .chunks_per_block(64)
    ///     .allow_resize(false)
    ///     .build();
    ///
    /// assert_eq!(pool.object_size(), 32);
    /// assert_eq!(pool.capacity(), 64);
    /// assert!(!pool.allows_resize());
    /// ```
    pub fn builder() -> ChunkPoolBuilder {
        ChunkPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        layout: ChunkLayout,
        allow_resize: bool,
        drop_policy: DropPolicy,
    ) -> Self {
        Self {
            layout,
            blocks: Vec::new(),
            head: None,
            allow_resize,
            initialized: false,
            live: 0,
            peak: 0,
            drop_policy,
        }
    }

    /// (Re)initializes the pool with one block of `chunks_per_block` chunks.
    ///
    /// If the pool is already initialized, it is first destroyed, releasing every block. The new
    /// chunk count also applies to all later growth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the first block cannot be allocated. The pool is left
    /// uninitialized in that case.
    ///
    /// # Panics
    ///
    /// Panics if a block of `chunks_per_block` chunks would not fit into the address space.
    pub fn init(&mut self, chunks_per_block: NonZero<usize>) -> Result<()> {
        if self.initialized || !self.blocks.is_empty() {
            self.destroy();
        }

        self.layout = self.layout.with_chunks_per_block(chunks_per_block);

        self.grow()?;
        self.initialized = true;

        Ok(())
    }

    /// Releases every block and returns the pool to the uninitialized state.
    ///
    /// Any pointers to outstanding chunks dangle afterwards. Until the pool is initialized again
    /// via [`init()`](Self::init), [`alloc()`](Self::alloc) returns `None`.
    pub fn destroy(&mut self) {
        if self.initialized {
            self.report_teardown();
        }

        let block_layout = self.layout.block_layout();

        for block in self.blocks.drain(..) {
            let layout = block_layout.expect("a pool with blocks has a valid block layout");

            // SAFETY: The layout must match between alloc and dealloc. It does, because the
            // layout only changes in `init()` after all blocks have been released.
            unsafe {
                dealloc(block.as_ptr(), layout);
            }
        }

        self.head = None;
        self.initialized = false;
        self.live = 0;
        self.peak = 0;
    }

    /// Takes a chunk off the free list and returns a pointer to its payload.
    ///
    /// The payload is [`object_size()`](Self::object_size) bytes long, aligned to
    /// [`CHUNK_ALIGN`][crate::CHUNK_ALIGN] and uninitialized.
    ///
    /// If no chunk is free, the pool grows by one block first. Returns `None` if the pool is not
    /// initialized, if growth is disallowed or if the system allocator refuses to provide
    /// memory for a new block.
    #[must_use]
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        if !self.initialized {
            return None;
        }

        if self.head.is_none() {
            if !self.allow_resize {
                return None;
            }

            self.grow().ok()?;
        }

        let chunk = self.head?;

        // SAFETY: Every chunk on the free list has a header written by us.
        self.head = unsafe { chunk_layout::next(chunk) };

        self.live = self
            .live
            .checked_add(1)
            .expect("cannot hand out more chunks than fit in memory");
        self.peak = self.peak.max(self.live);

        // SAFETY: The chunk was on our free list, so it is the start of a chunk of our layout.
        Some(unsafe { ChunkLayout::payload_of(chunk) })
    }

    /// Returns a chunk to the free list. The chunk becomes the next one handed out.
    ///
    /// Freeing a null pointer does nothing.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`alloc()`](Self::alloc) of this pool, which
    /// has not been freed since and is not used after this call. The pool must not have been
    /// destroyed or reinitialized since the chunk was allocated.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        // SAFETY: The caller guarantees the payload was handed out by `alloc()`.
        let chunk = unsafe { ChunkLayout::chunk_of(payload) };

        // SAFETY: The chunk belongs to one of our live blocks, as guaranteed by the caller.
        unsafe {
            chunk_layout::set_next(chunk, self.head);
        }

        self.head = Some(chunk);

        self.live = self
            .live
            .checked_sub(1)
            .expect("freed more chunks than were allocated");
    }

    /// Size in bytes of the object that fits into each chunk.
    #[must_use]
    pub fn object_size(&self) -> usize {
        self.layout.object_size().get()
    }

    /// Size in bytes of each chunk, including its header and alignment padding.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.layout.chunk_size().get()
    }

    /// Number of chunks in each block.
    #[must_use]
    pub fn chunks_per_block(&self) -> usize {
        self.layout.chunks_per_block().get()
    }

    /// Number of blocks allocated so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of chunks in all allocated blocks, free or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks
            .len()
            .checked_mul(self.chunks_per_block())
            .expect("allocated chunks cannot exceed the size of virtual memory")
    }

    /// Whether the pool has been initialized and not destroyed since.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether [`alloc()`](Self::alloc) may grow the pool when no chunk is free.
    #[must_use]
    pub fn allows_resize(&self) -> bool {
        self.allow_resize
    }

    /// Sets whether [`alloc()`](Self::alloc) may grow the pool when no chunk is free.
    ///
    /// If growth is disallowed, `alloc()` returns `None` once every chunk is handed out.
    pub fn set_allow_resize(&mut self, allow: bool) {
        self.allow_resize = allow;
    }

    /// Allocation statistics since the pool was last initialized.
    #[must_use]
    pub fn stats(&self) -> ChunkPoolStats {
        ChunkPoolStats {
            live: self.live,
            peak: self.peak,
            total_chunks: self.capacity(),
            blocks: self.blocks.len(),
        }
    }

    #[cfg_attr(test, mutants::skip)] // Only emits diagnostics, which tests do not observe.
    fn report_teardown(&self) {
        let stats = self.stats();

        if stats.live > 0 {
            warn!(
                object_size = self.object_size(),
                outstanding = stats.live,
                "destroying chunk pool with outstanding chunks"
            );
        }

        debug!(
            object_size = self.object_size(),
            peak = stats.peak,
            total_chunks = stats.total_chunks,
            wasted_bytes = stats.wasted_bytes(self.chunk_size()),
            "destroying chunk pool"
        );
    }

    /// Allocates one more block and appends its chunks to the tail of the free list.
    fn grow(&mut self) -> Result<()> {
        let out_of_memory = Error::OutOfMemory {
            object_size: self.object_size(),
        };

        if self.blocks.try_reserve(1).is_err() {
            return Err(out_of_memory);
        }

        let block_layout = self
            .layout
            .block_layout()
            .expect("chunk layouts are validated on creation");

        // SAFETY: The layout has a non-zero size because both chunk size and chunk count
        // are non-zero.
        let Some(block) = NonNull::new(unsafe { alloc(block_layout) }) else {
            return Err(out_of_memory);
        };

        // SAFETY: We just allocated the block with the layout of our chunks.
        let (first, _) = unsafe { self.layout.thread_block(block) };

        match self.tail() {
            // SAFETY: The tail is a chunk on our free list.
            Some(tail) => unsafe { chunk_layout::set_next(tail, Some(first)) },
            None => self.head = Some(first),
        }

        self.blocks.push(block);

        debug!(
            object_size = self.object_size(),
            blocks = self.blocks.len(),
            chunks_per_block = self.chunks_per_block(),
            "grew chunk pool"
        );

        Ok(())
    }

    /// The last chunk of the free list, if any chunk is free.
    fn tail(&self) -> Option<NonNull<u8>> {
        let mut current = self.head?;

        // SAFETY: Every chunk on the free list has a header written by us.
        while let Some(next) = unsafe { chunk_layout::next(current) } {
            current = next;
        }

        Some(current)
    }
}

impl Drop for ChunkPool {
    fn drop(&mut self) {
        let outstanding = self.live;

        // We release the memory first because we are going to panic anyway if something is
        // wrong, so there is little good to expect for the app itself.
        self.destroy();

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems
            && outstanding > 0
            && !thread::panicking()
        {
            panic!(
                "dropped a chunk pool with {outstanding} outstanding chunks when the drop policy forbids it"
            );
        }
    }
}

// SAFETY: The raw pointers only refer to blocks exclusively owned by the pool. Nothing in the
// pool is tied to the thread that created it.
unsafe impl Send for ChunkPool {}

/// Allocation statistics of a [`ChunkPool`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ChunkPoolStats {
    /// Number of chunks currently handed out.
    pub live: usize,

    /// Highest number of chunks handed out at the same time.
    pub peak: usize,

    /// Total number of chunks in all allocated blocks.
    pub total_chunks: usize,

    /// Number of blocks allocated.
    pub blocks: usize,
}

impl ChunkPoolStats {
    /// Bytes of chunk memory that were never needed, given chunks of `chunk_size` bytes.
    #[must_use]
    pub fn wasted_bytes(&self, chunk_size: usize) -> usize {
        self.total_chunks
            .saturating_sub(self.peak)
            .saturating_mul(chunk_size)
    }
}
