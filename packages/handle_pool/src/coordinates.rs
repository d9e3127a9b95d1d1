use std::num::NonZero;

use num_integer::Integer;

/// Physical location of a slot: which block it lives in and where inside that block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct SlotCoordinates {
    block_id: usize,
    index_in_block: usize,
}

impl SlotCoordinates {
    #[must_use]
    pub(crate) fn new(block_id: usize, index_in_block: usize) -> Self {
        Self {
            block_id,
            index_in_block,
        }
    }

    /// Splits a logical (cross-block) slot index into block coordinates.
    #[must_use]
    pub(crate) fn from_index(index: usize, objects_per_block: NonZero<usize>) -> Self {
        let (block_id, index_in_block) = index.div_rem(&objects_per_block.get());

        Self {
            block_id,
            index_in_block,
        }
    }

    /// Returns the logical (cross-block) slot index of these coordinates.
    #[must_use]
    pub(crate) fn to_index(self, objects_per_block: NonZero<usize>) -> usize {
        self.block_id
            .checked_mul(objects_per_block.get())
            .and_then(|x| x.checked_add(self.index_in_block))
            .expect("coordinates indicate a slot beyond the range of virtual memory - impossible to reach this point from a valid history")
    }

    #[must_use]
    pub(crate) fn block_id(self) -> usize {
        self.block_id
    }

    #[must_use]
    pub(crate) fn index_in_block(self) -> usize {
        self.index_in_block
    }
}
