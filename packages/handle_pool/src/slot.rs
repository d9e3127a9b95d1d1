use crate::SlotCoordinates;

/// Identifies a lookup record by the logical index of the slot that physically embeds it.
///
/// Lookup records never move. The object they describe may be relocated by compaction,
/// in which case the record's location is updated but its identity stays the same.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct RecordId(usize);

impl RecordId {
    #[must_use]
    pub(crate) fn new(slot_index: usize) -> Self {
        Self(slot_index)
    }

    /// Logical index of the slot that embeds this record.
    #[must_use]
    pub(crate) fn slot_index(self) -> usize {
        self.0
    }
}

/// Generation and location metadata for one pooled object.
#[derive(Debug, Default)]
pub(crate) struct LookupRecord {
    /// Authoritative generation. A handle is valid iff it carries the same serial.
    ///
    /// Zero means the record has never been used.
    serial: u64,

    /// Where the object described by this record currently lives.
    location: SlotCoordinates,
}

impl LookupRecord {
    #[must_use]
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Advances the generation, invalidating every handle that carries the previous one.
    pub(crate) fn advance_serial(&mut self) {
        self.serial = self
            .serial
            .checked_add(1)
            .expect("a lookup record cannot be reused 2^64 times in any realistic program");
    }

    #[must_use]
    pub(crate) fn location(&self) -> SlotCoordinates {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: SlotCoordinates) {
        self.location = location;
    }
}

/// Fixed-size storage unit inside a memory block.
///
/// A slot carries three independent pieces of state:
///
/// * The lookup record physically embedded in it, which may describe an object that lives in
///   a different slot after compaction.
/// * The lookup reference: for a live slot, the record describing the object stored here; for a
///   slot just past the live range, a vacated record parked for reuse.
/// * The payload itself, present only for slots inside the live range.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    record: LookupRecord,
    lookup: Option<RecordId>,
    value: Option<T>,
}

impl<T> Slot<T> {
    /// A never-used slot, equivalent to the zero-initialized memory of a fresh block.
    #[must_use]
    pub(crate) fn vacant() -> Self {
        Self {
            record: LookupRecord::default(),
            lookup: None,
            value: None,
        }
    }

    #[must_use]
    pub(crate) fn record(&self) -> &LookupRecord {
        &self.record
    }

    pub(crate) fn record_mut(&mut self) -> &mut LookupRecord {
        &mut self.record
    }

    #[must_use]
    pub(crate) fn lookup(&self) -> Option<RecordId> {
        self.lookup
    }

    pub(crate) fn set_lookup(&mut self, lookup: RecordId) {
        self.lookup = Some(lookup);
    }

    #[must_use]
    pub(crate) fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Stores a value in the slot, returning whatever was stored there before.
    pub(crate) fn replace_value(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    pub(crate) fn take_value(&mut self) -> Option<T> {
        self.value.take()
    }
}
