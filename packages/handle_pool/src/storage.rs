use std::mem;
use std::num::NonZero;
use std::rc::Weak;

use tracing::debug;

use crate::{
    ErasedPool, Error, LookupRecord, MemoryBlock, RecordId, Result, Slot, SlotCoordinates,
    directory,
};

/// The blocks of an object pool, addressed by logical (cross-block) slot index.
///
/// Blocks are only ever appended. They are released all at once when the pool is torn down.
#[derive(Debug)]
pub(crate) struct SlotStorage<T> {
    blocks: Vec<MemoryBlock<T>>,
    objects_per_block: NonZero<usize>,
}

impl<T> SlotStorage<T> {
    #[must_use]
    pub(crate) fn new(objects_per_block: NonZero<usize>) -> Self {
        Self {
            blocks: Vec::new(),
            objects_per_block,
        }
    }

    #[must_use]
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub(crate) fn coordinates(&self, index: usize) -> SlotCoordinates {
        SlotCoordinates::from_index(index, self.objects_per_block)
    }

    #[must_use]
    pub(crate) fn index(&self, coordinates: SlotCoordinates) -> usize {
        coordinates.to_index(self.objects_per_block)
    }

    /// Appends a new block and registers its address range as belonging to `owner`.
    pub(crate) fn allocate_block(&mut self, owner: Weak<dyn ErasedPool>) -> Result<()> {
        self.blocks
            .try_reserve(1)
            .map_err(|source| Error::AllocationFailed {
                bytes: mem::size_of::<MemoryBlock<T>>(),
                source,
            })?;

        let block = MemoryBlock::try_new(self.objects_per_block)?;
        directory::register(block.address_range(), owner);

        debug!(
            block_id = self.blocks.len(),
            objects_per_block = self.objects_per_block.get(),
            "allocated object pool block"
        );

        self.blocks.push(block);
        Ok(())
    }

    /// Unregisters and frees every block, dropping whatever values they still contain.
    pub(crate) fn release_blocks(&mut self) {
        for block in &self.blocks {
            directory::unregister(block.address_range().start);
        }

        self.blocks.clear();
    }

    /// # Panics
    ///
    /// Panics if the block containing `index` has not been allocated.
    #[must_use]
    pub(crate) fn slot(&self, index: usize) -> &Slot<T> {
        let coordinates = self.coordinates(index);

        self.blocks
            .get(coordinates.block_id())
            .expect("slot index refers to a block that has not been allocated")
            .slot(coordinates.index_in_block())
    }

    /// # Panics
    ///
    /// Panics if the block containing `index` has not been allocated.
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot<T> {
        let coordinates = self.coordinates(index);

        self.blocks
            .get_mut(coordinates.block_id())
            .expect("slot index refers to a block that has not been allocated")
            .slot_mut(coordinates.index_in_block())
    }

    /// The lookup record with the given identity, if the block embedding it exists.
    #[must_use]
    pub(crate) fn record(&self, id: RecordId) -> Option<&LookupRecord> {
        let coordinates = self.coordinates(id.slot_index());

        let block = self.blocks.get(coordinates.block_id())?;
        Some(block.slot(coordinates.index_in_block()).record())
    }

    /// # Panics
    ///
    /// Panics if the block embedding the record has not been allocated.
    pub(crate) fn record_mut(&mut self, id: RecordId) -> &mut LookupRecord {
        self.slot_mut(id.slot_index()).record_mut()
    }

    /// Logical index of the object described by `id`, provided `serial` is still its generation.
    #[must_use]
    pub(crate) fn live_index(&self, id: RecordId, serial: u64) -> Option<usize> {
        let record = self.record(id)?;

        (record.serial() == serial).then(|| self.index(record.location()))
    }

    /// Logical index of the slot whose payload is `value`, if it is stored in these blocks.
    #[must_use]
    pub(crate) fn index_of(&self, value: &T) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(block_id, block)| {
                block
                    .index_of(value)
                    .map(|index_in_block| SlotCoordinates::new(block_id, index_in_block))
            })
            .map(|coordinates| self.index(coordinates))
    }

    /// Number of slots whose own lookup record has ever been used.
    ///
    /// Own records are taken in slot order, so this is also the highest logical index ever
    /// occupied plus one.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn high_water_mark(&self) -> usize {
        let capacity = self
            .blocks
            .len()
            .checked_mul(self.objects_per_block.get())
            .expect("allocated blocks cannot exceed the size of virtual memory");

        (0..capacity)
            .take_while(|&index| self.slot(index).record().serial() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use new_zealand::nz;

    use super::*;

    #[test]
    fn slots_span_blocks() {
        let mut storage = SlotStorage::<u32>::new(nz!(2));
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();

        storage.slot_mut(3).replace_value(33);

        assert_eq!(storage.block_count(), 2);
        assert_eq!(storage.slot(3).value(), Some(&33));
    }

    #[test]
    #[should_panic]
    fn slot_in_missing_block_panics() {
        let mut storage = SlotStorage::<u32>::new(nz!(2));
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();

        _ = storage.slot(2);
    }

    #[test]
    fn record_in_missing_block_is_none() {
        let storage = SlotStorage::<u32>::new(nz!(2));

        assert!(storage.record(RecordId::new(0)).is_none());
    }

    #[test]
    fn live_index_requires_matching_serial() {
        let mut storage = SlotStorage::<u32>::new(nz!(4));
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();

        let id = RecordId::new(0);
        let record = storage.record_mut(id);
        record.advance_serial();
        record.set_location(SlotCoordinates::new(0, 3));

        assert_eq!(storage.live_index(id, 1), Some(3));
        assert_eq!(storage.live_index(id, 2), None);
    }

    #[test]
    fn index_of_searches_all_blocks() {
        let mut storage = SlotStorage::<u32>::new(nz!(2));
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();
        storage.allocate_block(Weak::<DummyPool>::new()).unwrap();

        storage.slot_mut(3).replace_value(33);
        let value = storage.slot(3).value().unwrap();

        assert_eq!(storage.index_of(value), Some(3));
    }

    #[test]
    fn released_blocks_are_no_longer_resolvable() {
        let pool: Rc<dyn ErasedPool> = Rc::new(DummyPool);

        let mut storage = SlotStorage::<u32>::new(nz!(2));
        storage.allocate_block(Rc::downgrade(&pool)).unwrap();

        storage.slot_mut(0).replace_value(1);
        let address = std::ptr::from_ref(storage.slot(0).value().unwrap()).addr();

        assert!(directory::lookup(address).is_some());

        storage.release_blocks();

        assert_eq!(storage.block_count(), 0);
        assert!(directory::lookup(address).is_none());
    }

    #[derive(Debug)]
    struct DummyPool;

    impl ErasedPool for DummyPool {
        fn current_serial(&self, _record: RecordId) -> Option<u64> {
            None
        }

        fn destroy_record(&self, _record: RecordId, _serial: u64) -> bool {
            false
        }

        fn into_any(self: Rc<Self>) -> Rc<dyn std::any::Any> {
            self
        }
    }
}
