/// Determines what happens when a [`ChunkPool`][crate::ChunkPool] is torn down while chunks are
/// still allocated from it.
///
/// By default, the pool releases its memory regardless and logs a warning about the
/// outstanding chunks.
///
/// # Examples
///
/// ```
/// use chunk_pool::{ChunkPool, DropPolicy};
///
/// let pool = ChunkPool::builder()
///     .object_size(32)
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its memory even if chunks are still allocated. This is the default.
    ///
    /// Any pointers to outstanding chunks dangle afterwards.
    #[default]
    MayDropItems,

    /// The pool will panic if it is dropped while chunks are still allocated from it.
    ///
    /// This is useful as a leak check when every allocation is expected to be freed.
    MustNotDropItems,
}
