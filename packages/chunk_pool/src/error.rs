use thiserror::Error;

/// Errors reported by chunk pools and the allocation policies built on them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A chunk-backed policy was asked for anything other than exactly one element.
    ///
    /// Chunk pools hand out one fixed-size chunk at a time, so they cannot satisfy requests
    /// for contiguous arrays.
    #[error("chunk allocation supports exactly one element per request, got a request for {count}")]
    UnsupportedMultiElement {
        /// The number of elements that was requested.
        count: usize,
    },

    /// No chunk could be provided, either because growth is disallowed or because the system
    /// allocator refused to provide memory for a new block.
    #[error("out of memory: no chunk of {object_size} bytes is available")]
    OutOfMemory {
        /// The object size of the pool that ran out of chunks.
        object_size: usize,
    },

    /// The element type needs a stricter alignment than chunk payloads provide.
    #[error("alignment of {align} bytes exceeds the supported chunk alignment of {supported} bytes")]
    UnsupportedAlignment {
        /// The alignment required by the element type.
        align: usize,

        /// The alignment of every chunk payload.
        supported: usize,
    },

    /// A policy was asked for more elements than can be described by a single allocation.
    #[error("cannot allocate {count} elements of {size} bytes each")]
    CapacityOverflow {
        /// The number of elements that was requested.
        count: usize,

        /// The size of one element.
        size: usize,
    },

    /// A shared pool was asked to reinitialize while chunks it handed out are still in use.
    ///
    /// Reinitializing releases every block, so it is refused until all chunks are freed.
    #[error("cannot reinitialize a chunk pool with {live} chunks still in use")]
    ChunksOutstanding {
        /// The number of chunks that have not been freed.
        live: usize,
    },
}

/// A specialized `Result` type for chunk pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
