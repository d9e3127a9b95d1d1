//! This package provides [`ChunkPool`], a growable free-list allocator of fixed-size memory
//! chunks, and allocation policies that let containers take their memory from such pools.
//!
//! A chunk pool hands out opaque chunks that are all large enough for one object of a fixed
//! size. Allocation pops the head of an intrusive free list and deallocation pushes onto it, so
//! both are O(1) and the most recently freed chunk is reused first. When every chunk is in use,
//! the pool grows by one block of chunks, unless growth has been disallowed.
//!
//! The pool performs no validity checking. It trusts the caller to free every chunk exactly
//! once and never touch it afterwards. For generation-checked handles to pooled objects, use the
//! `handle_pool` package instead.
//!
//! # Sharing pools
//!
//! [`LocalChunkPool`] is a cloneable single-threaded handle to one pool. [`ChunkPoolRegistry`]
//! keeps one shared pool per object size, created on first use and released when the registry
//! and every pool it handed out are dropped.
//!
//! # Allocation policies
//!
//! [`AllocationPolicy`] is the contract between containers and the memory they use, with
//! [`Rebind`] deriving a policy for another element type. [`ChunkPolicy`] serves single elements
//! from the registry's pools, whereas [`HeapPolicy`] uses the global allocator. [`PolicyBox`] is
//! a minimal owning container built on any policy.
//!
//! # Example
//!
//! ```rust
//! use chunk_pool::{ChunkPolicy, ChunkPoolRegistry, PolicyBox};
//!
//! let registry = ChunkPoolRegistry::new();
//!
//! let a = PolicyBox::new_in(1_u64, ChunkPolicy::new(&registry)).unwrap();
//! let b = PolicyBox::new_in(2_i64, ChunkPolicy::new(&registry)).unwrap();
//!
//! assert_eq!(*a + 1, 2);
//! assert_eq!(*b, 2);
//!
//! // Both values are 8 bytes, so they came from the same pool.
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.pool_for::<u64>().stats().live, 2);
//! ```
//!
//! # Thread safety
//!
//! [`ChunkPool`] is thread-mobile but has no internal synchronization. Wrap it in a `Mutex` to
//! allocate from multiple threads. The shared handles, the registry and the chunk policy are
//! single-threaded.

mod builder;
mod chunk_layout;
mod chunk_policy;
mod drop_policy;
mod error;
mod heap_policy;
mod local;
mod policy;
mod policy_box;
mod pool;
mod registry;

pub use builder::*;
pub(crate) use chunk_layout::ChunkLayout;
pub use chunk_layout::{CHUNK_ALIGN, CHUNK_HEADER_SIZE, DEFAULT_CHUNKS_PER_BLOCK};
pub use chunk_policy::*;
pub use drop_policy::*;
pub use error::*;
pub use heap_policy::*;
pub use local::*;
pub use policy::*;
pub use policy_box::*;
pub use pool::*;
pub use registry::*;
