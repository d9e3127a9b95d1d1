//! Per-thread directory that maps payload addresses back to the pool that owns them.
//!
//! Pools are single-threaded, so every block a thread can observe was registered on that same
//! thread. Each block registers its address range when it is allocated and unregisters it when
//! the owning pool is dropped.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::ErasedPool;

#[derive(Debug)]
struct DirectoryEntry {
    end: usize,
    pool: Weak<dyn ErasedPool>,
}

thread_local! {
    static DIRECTORY: RefCell<BTreeMap<usize, DirectoryEntry>> = const { RefCell::new(BTreeMap::new()) };
}

/// Records that the addresses in `range` belong to a block of `pool`.
pub(crate) fn register(range: Range<usize>, pool: Weak<dyn ErasedPool>) {
    DIRECTORY.with_borrow_mut(|directory| {
        directory.insert(
            range.start,
            DirectoryEntry {
                end: range.end,
                pool,
            },
        );
    });
}

/// Forgets the block whose address range starts at `start`.
#[cfg_attr(test, mutants::skip)] // Stale entries fail closed on lookup anyway, so removal is not observable.
pub(crate) fn unregister(start: usize) {
    // The directory may already be gone if the pool is dropped during thread teardown.
    // There is nothing left to clean up in that case.
    _ = DIRECTORY.try_with(|directory| {
        directory.borrow_mut().remove(&start);
    });
}

/// Finds the live pool that owns the block containing `address`.
#[must_use]
pub(crate) fn lookup(address: usize) -> Option<Rc<dyn ErasedPool>> {
    DIRECTORY.with_borrow(|directory| {
        let (_, entry) = directory.range(..=address).next_back()?;

        if address >= entry.end {
            return None;
        }

        entry.pool.upgrade()
    })
}
