use std::alloc::Layout;
use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;

use new_zealand::nz;

/// Size in bytes of the intrusive header that precedes every chunk payload.
pub const CHUNK_HEADER_SIZE: usize = mem::size_of::<*mut u8>();

/// Alignment guaranteed for every chunk payload.
pub const CHUNK_ALIGN: usize = mem::align_of::<*mut u8>();

/// Number of chunks in each block allocated by a pool with the default configuration.
pub const DEFAULT_CHUNKS_PER_BLOCK: NonZero<usize> = nz!(1024);

/// The free-list link stored in the header of every chunk.
type ChunkHeader = Option<NonNull<u8>>;

/// Geometry of the chunks and blocks of one chunk pool.
///
/// A chunk is a header followed by the payload, padded so that the next chunk starts at an
/// address aligned to [`CHUNK_ALIGN`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ChunkLayout {
    object_size: NonZero<usize>,
    chunk_size: NonZero<usize>,
    chunks_per_block: NonZero<usize>,
}

impl ChunkLayout {
    /// # Panics
    ///
    /// Panics if a block of such chunks would not fit into the address space.
    #[must_use]
    pub(crate) fn new(object_size: NonZero<usize>, chunks_per_block: NonZero<usize>) -> Self {
        let chunk_size = object_size
            .get()
            .checked_next_multiple_of(CHUNK_ALIGN)
            .and_then(|payload| payload.checked_add(CHUNK_HEADER_SIZE))
            .and_then(NonZero::new)
            .expect("chunk object size is too large to be addressable");

        let layout = Self {
            object_size,
            chunk_size,
            chunks_per_block,
        };

        assert!(
            layout.block_layout().is_some(),
            "a block of {chunks_per_block} chunks of {chunk_size} bytes does not fit in memory"
        );

        layout
    }

    #[must_use]
    pub(crate) fn object_size(&self) -> NonZero<usize> {
        self.object_size
    }

    #[must_use]
    pub(crate) fn chunk_size(&self) -> NonZero<usize> {
        self.chunk_size
    }

    #[must_use]
    pub(crate) fn chunks_per_block(&self) -> NonZero<usize> {
        self.chunks_per_block
    }

    /// The same chunk geometry with a different number of chunks per block.
    #[must_use]
    pub(crate) fn with_chunks_per_block(self, chunks_per_block: NonZero<usize>) -> Self {
        Self::new(self.object_size, chunks_per_block)
    }

    /// Memory layout of one block, or `None` if it exceeds the limits of the address space.
    #[must_use]
    pub(crate) fn block_layout(&self) -> Option<Layout> {
        let size = self
            .chunk_size
            .get()
            .checked_mul(self.chunks_per_block.get())?;

        Layout::from_size_align(size, CHUNK_ALIGN).ok()
    }

    /// Links the chunks of a freshly allocated block into a free list, in address order.
    ///
    /// Returns the first and last chunk of the list.
    ///
    /// # Safety
    ///
    /// `block` must point to a writable allocation of at least [`block_layout()`] bytes,
    /// aligned to [`CHUNK_ALIGN`].
    ///
    /// [`block_layout()`]: Self::block_layout
    pub(crate) unsafe fn thread_block(&self, block: NonNull<u8>) -> (NonNull<u8>, NonNull<u8>) {
        let mut chunk = block;

        for remaining in (0..self.chunks_per_block.get()).rev() {
            let next = if remaining == 0 {
                None
            } else {
                // SAFETY: There is at least one more chunk in the block after this one, so the
                // result stays inside the same allocation.
                Some(unsafe { chunk.add(self.chunk_size.get()) })
            };

            // SAFETY: The chunk lies inside the block, which the caller guarantees is writable
            // and aligned, and chunk sizes preserve that alignment.
            unsafe {
                set_next(chunk, next);
            }

            if let Some(next) = next {
                chunk = next;
            }
        }

        (block, chunk)
    }

    /// The payload of `chunk`, as handed out to callers.
    ///
    /// # Safety
    ///
    /// `chunk` must be the start of a chunk in a block of this layout.
    #[must_use]
    pub(crate) unsafe fn payload_of(chunk: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: Every chunk is at least one header plus one payload byte long, so the
        // payload start is inside the same allocation.
        unsafe { chunk.add(CHUNK_HEADER_SIZE) }
    }

    /// The chunk that `payload` belongs to.
    ///
    /// # Safety
    ///
    /// `payload` must have been obtained from [`payload_of()`](Self::payload_of).
    #[must_use]
    pub(crate) unsafe fn chunk_of(payload: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: The caller guarantees the payload is preceded by its chunk header.
        unsafe { payload.sub(CHUNK_HEADER_SIZE) }
    }
}

/// Reads the free-list link of `chunk`.
///
/// # Safety
///
/// `chunk` must be the start of a chunk whose header was written by [`set_next()`].
#[must_use]
pub(crate) unsafe fn next(chunk: NonNull<u8>) -> Option<NonNull<u8>> {
    // SAFETY: Chunks start at pointer-aligned addresses and the caller guarantees the header
    // holds an initialized link.
    unsafe { chunk.cast::<ChunkHeader>().read() }
}

/// Writes the free-list link of `chunk`.
///
/// # Safety
///
/// `chunk` must be the start of a chunk in a live block.
pub(crate) unsafe fn set_next(chunk: NonNull<u8>, next: Option<NonNull<u8>>) {
    // SAFETY: Chunks start at pointer-aligned addresses with at least a header worth of
    // writable bytes, as guaranteed by the caller.
    unsafe {
        chunk.cast::<ChunkHeader>().write(next);
    }
}
