use std::mem;
use std::num::NonZero;
use std::ops::Range;
use std::ptr;

use crate::{Error, Result, Slot};

/// A contiguously allocated run of slots.
///
/// The slot storage is allocated once and never reallocated, so slot addresses stay stable for
/// the lifetime of the block even when the owning collection of blocks grows.
#[derive(Debug)]
pub(crate) struct MemoryBlock<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> MemoryBlock<T> {
    /// Allocates a block of `objects_per_block` never-used slots.
    ///
    /// Allocation failure is reported as an error instead of aborting the process.
    pub(crate) fn try_new(objects_per_block: NonZero<usize>) -> Result<Self> {
        let mut slots = Vec::new();

        slots
            .try_reserve_exact(objects_per_block.get())
            .map_err(|source| Error::AllocationFailed {
                bytes: objects_per_block
                    .get()
                    .saturating_mul(mem::size_of::<Slot<T>>()),
                source,
            })?;

        slots.resize_with(objects_per_block.get(), Slot::vacant);

        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    #[must_use]
    pub(crate) fn slot(&self, index_in_block: usize) -> &Slot<T> {
        self.slots
            .get(index_in_block)
            .expect("slot coordinates are always derived from the configured block size")
    }

    pub(crate) fn slot_mut(&mut self, index_in_block: usize) -> &mut Slot<T> {
        self.slots
            .get_mut(index_in_block)
            .expect("slot coordinates are always derived from the configured block size")
    }

    /// The address range covered by the slots of this block.
    #[must_use]
    pub(crate) fn address_range(&self) -> Range<usize> {
        let range = self.slots.as_ptr_range();
        range.start.addr()..range.end.addr()
    }

    /// Finds the slot whose payload is `value`, if `value` lives inside this block.
    #[must_use]
    pub(crate) fn index_of(&self, value: &T) -> Option<usize> {
        let address = ptr::from_ref(value).addr();
        let range = self.address_range();

        if !range.contains(&address) {
            return None;
        }

        // Cannot underflow because we just checked that the address is inside the range.
        let offset = address.wrapping_sub(range.start);
        let index = offset.checked_div(mem::size_of::<Slot<T>>())?;

        // The address being in range is not enough - it has to be the payload itself and not,
        // for example, some field of the slot metadata that happens to have the same type.
        let slot = self.slots.get(index)?;
        let payload = slot.value()?;

        ptr::eq(payload, value).then_some(index)
    }
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn new_block_is_all_vacant() {
        let block = MemoryBlock::<u64>::try_new(nz!(4)).unwrap();

        for index in 0..4 {
            assert!(block.slot(index).value().is_none());
            assert_eq!(block.slot(index).record().serial(), 0);
        }
    }

    #[test]
    #[should_panic]
    fn slot_beyond_block_panics() {
        let block = MemoryBlock::<u64>::try_new(nz!(4)).unwrap();

        _ = block.slot(4);
    }

    #[test]
    fn index_of_finds_payload() {
        let mut block = MemoryBlock::<u64>::try_new(nz!(4)).unwrap();
        block.slot_mut(2).replace_value(42);

        let value = block.slot(2).value().unwrap();
        assert_eq!(block.index_of(value), Some(2));
    }

    #[test]
    fn index_of_rejects_foreign_reference() {
        let block = MemoryBlock::<u64>::try_new(nz!(4)).unwrap();
        let outside = 42_u64;

        assert_eq!(block.index_of(&outside), None);
    }

    #[test]
    fn impossible_block_size_is_error() {
        let result = MemoryBlock::<u64>::try_new(NonZero::new(usize::MAX).unwrap());

        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
    }
}
