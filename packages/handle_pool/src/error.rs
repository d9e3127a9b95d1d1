use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur when creating or accessing objects in an [`ObjectPool`][crate::ObjectPool].
///
/// Stale handles are not errors. Operations that go through a [`Handle`][crate::Handle]
/// report a stale or destroyed target via `bool` or `Option` results instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool would need more blocks than its configured ceiling to store another object.
    ///
    /// This is a hard limit for the pool instance. Destroying objects frees up room again.
    #[error("object pool is exhausted: all {max_blocks} blocks are full")]
    CapacityExhausted {
        /// The maximum number of blocks the pool is allowed to allocate.
        max_blocks: usize,
    },

    /// The system allocator refused to provide memory for a new block.
    #[error("failed to allocate a new block of {bytes} bytes")]
    AllocationFailed {
        /// The size of the rejected block allocation.
        bytes: usize,

        /// The underlying reservation failure.
        #[source]
        source: TryReserveError,
    },

    /// Positional access beyond the dense range of live objects.
    #[error("index {index} is out of range for a pool of {len} objects")]
    IndexOutOfRange {
        /// The index that was requested.
        index: usize,

        /// The number of live objects in the pool at the time of the request.
        len: usize,
    },
}

/// A specialized `Result` type for object pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn capacity_exhausted_mentions_ceiling() {
        let error = Error::CapacityExhausted { max_blocks: 4 };

        assert!(error.to_string().contains('4'));
    }

    #[test]
    fn index_out_of_range_mentions_index_and_len() {
        let error = Error::IndexOutOfRange { index: 7, len: 3 };
        let message = error.to_string();

        assert!(message.contains('7'));
        assert!(message.contains('3'));
    }

    #[test]
    fn allocation_failed_exposes_source() {
        let source = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        let error = Error::AllocationFailed { bytes: 64, source };

        assert!(std::error::Error::source(&error).is_some());
    }
}
