//! This package provides [`ObjectPool`], a compacting pool of objects of one type, and
//! [`Handle`], a generation-checked reference to an object in the pool.
//!
//! Handles cheaply detect use-after-free and double-free. Every object is described by a lookup
//! record carrying a generation number (serial). A handle remembers the serial it was issued
//! with and is valid only while the record still carries that serial. Destroying the object
//! advances the serial, which invalidates every copy of the handle at once.
//!
//! # Dense storage
//!
//! Live objects always occupy the logical index range `0..len()`, so they can be accessed by
//! position via [`ObjectPool::at()`] or iterated via [`ObjectPool::with_iter()`] without
//! skipping holes. When an object is destroyed, the last object is moved into its slot and its
//! lookup record is updated, so handles to the moved object stay valid.
//!
//! # Features
//!
//! - **O(1) creation and destruction**: No searching for free slots and no per-object heap
//!   bookkeeping.
//! - **Stale handle detection**: [`Handle::destroy()`] returns `false` and accessors return
//!   `None` instead of touching a destroyed object.
//! - **Fail-closed teardown**: Handles do not keep the pool alive and report themselves as
//!   invalid once the pool is dropped.
//! - **Handle recovery**: [`Handle::from_payload()`] reconstructs the handle of an object from
//!   a bare reference to it.
//! - **Type erasure**: [`ErasedHandle`] lets handles to objects of different types be stored
//!   together and destroyed uniformly.
//! - **Bounded growth**: Memory is allocated one fixed-size block at a time, up to a
//!   configurable number of blocks.
//!
//! # Example
//!
//! ```rust
//! use handle_pool::ObjectPool;
//!
//! let mut pool = ObjectPool::<String>::new();
//!
//! let mut a = pool.create_object("a".to_string()).unwrap();
//! let b = pool.create_object("b".to_string()).unwrap();
//! let c = pool.create_object("c".to_string()).unwrap();
//!
//! let stale = a.clone();
//! assert!(a.destroy());
//!
//! // The destroyed object is gone for every copy of its handle.
//! assert!(!stale.is_valid());
//!
//! // "c" was moved into the slot vacated by "a" but its handle still finds it.
//! assert_eq!(*pool.at(0).unwrap(), "c");
//! assert_eq!(c.with(String::clone).as_deref(), Some("c"));
//! assert_eq!(b.with(String::clone).as_deref(), Some("b"));
//! assert_eq!(pool.len(), 2);
//! ```
//!
//! # Thread safety
//!
//! Pools and handles are single-threaded. To use objects from multiple threads, keep the pool
//! on one thread and communicate with it, or use one pool per thread.

mod block;
mod builder;
mod coordinates;
mod directory;
mod drop_policy;
mod erased;
mod error;
mod handle;
mod pool;
mod slot;
mod storage;

pub(crate) use block::*;
pub use builder::*;
pub(crate) use coordinates::*;
pub use drop_policy::*;
pub use erased::*;
pub use error::*;
pub use handle::*;
pub use pool::*;
pub(crate) use slot::*;
pub(crate) use storage::*;
