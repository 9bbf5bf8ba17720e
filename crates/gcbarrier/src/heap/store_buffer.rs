//! Store Buffer - Pending tenured→nursery edges
//!
//! Every slot that may point from longer-lived storage into the nursery is
//! logged here by the post-write barrier and consumed by the next minor
//! collection, which turns an O(heap) scan into an O(edges) one.
//!
//! The buffer is a set: recording the same slot twice leaves it unchanged.
//! Reaching the capacity never drops an entry. The caller is told so it can
//! request an eager minor collection instead.

use crate::cell::{Generation, SlotAddr};
use indexmap::IndexSet;

/// StoreBufferEntry - one recorded edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreBufferEntry {
    /// Slot that was written
    pub slot: SlotAddr,
    /// Generation of the slot's owner when the write happened
    pub owner_generation: Generation,
}

/// Outcome of [`StoreBuffer::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// New entry recorded
    Inserted,
    /// Entry was already present
    Duplicate,
    /// New entry recorded and the buffer is now at or over capacity
    Overflowed,
}

/// StoreBuffer - per-zone set of recorded slots
#[derive(Debug)]
pub struct StoreBuffer {
    entries: IndexSet<StoreBufferEntry>,
    capacity: usize,
}

impl StoreBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexSet::new(),
            capacity,
        }
    }

    /// Record an entry
    pub fn put(&mut self, entry: StoreBufferEntry) -> PutOutcome {
        if !self.entries.insert(entry) {
            return PutOutcome::Duplicate;
        }
        if self.entries.len() >= self.capacity {
            PutOutcome::Overflowed
        } else {
            PutOutcome::Inserted
        }
    }

    pub fn contains_slot(&self, slot: SlotAddr) -> bool {
        self.entries.iter().any(|entry| entry.slot == slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreBufferEntry> {
        self.entries.iter()
    }

    /// Remove and return all entries in insertion order
    pub fn take(&mut self) -> Vec<StoreBufferEntry> {
        self.entries.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellAddr, RootId};

    fn entry(index: u32) -> StoreBufferEntry {
        StoreBufferEntry {
            slot: SlotAddr::field(CellAddr::new(0x1_0000_0000).unwrap(), index),
            owner_generation: Generation::Tenured,
        }
    }

    #[test]
    fn test_put_is_idempotent() {
        let mut buffer = StoreBuffer::new(16);
        assert_eq!(buffer.put(entry(0)), PutOutcome::Inserted);
        assert_eq!(buffer.put(entry(0)), PutOutcome::Duplicate);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_overflow_keeps_entries() {
        let mut buffer = StoreBuffer::new(2);
        assert_eq!(buffer.put(entry(0)), PutOutcome::Inserted);
        assert_eq!(buffer.put(entry(1)), PutOutcome::Overflowed);
        assert_eq!(buffer.put(entry(2)), PutOutcome::Overflowed);
        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_take_drains_in_order() {
        let mut buffer = StoreBuffer::new(16);
        buffer.put(entry(3));
        buffer.put(StoreBufferEntry {
            slot: SlotAddr::External(RootId(9)),
            owner_generation: Generation::Tenured,
        });

        assert!(buffer.contains_slot(SlotAddr::External(RootId(9))));
        let drained = buffer.take();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], entry(3));
        assert!(buffer.is_empty());
    }
}
