/// Determines what happens to live objects when an [`ObjectPool`][crate::ObjectPool] is dropped.
///
/// By default, the pool drops its remaining objects when it is dropped. Handles to those
/// objects become invalid either way.
///
/// # Examples
///
/// ```
/// use handle_pool::{DropPolicy, ObjectPool};
///
/// // The drop policy is set at pool creation time.
/// let pool = ObjectPool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool will drop its remaining objects when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool will panic if it still contains live objects when it is dropped.
    ///
    /// This is useful when every object is expected to be destroyed through its handle, so
    /// that destruction observers see every object that was ever created.
    MustNotDropItems,
}
