//! Forwarding Table - Address Mapping During Relocation
//!
//! Maps the old address of every cell moved by one collection (promotion or
//! compaction) to its new address. The collector uses it to fix slots and
//! to rekey unique-id registries once copying is done.
//!
//! Usage:
//! 1. Create a table at the start of a moving collection
//! 2. Add an entry when a cell is copied
//! 3. Look up while fixing slots
//! 4. Rekey registries from the table, then drop it

use crate::cell::{CellAddr, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// ForwardingTable - mapping old addresses to new addresses
pub struct ForwardingTable {
    /// Forwarding entries: old address -> new address
    entries: RwLock<IndexMap<CellAddr, CellAddr>>,

    /// Incremented on every modification
    generation: AtomicU64,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current modification count
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Add forwarding entry
    ///
    /// Self-forwarding and re-forwarding an already moved address are
    /// rejected and logged.
    pub fn add_entry(&self, old: CellAddr, new: CellAddr) -> bool {
        if old == new {
            log::warn!("add_entry: {} forwarded to itself", old);
            return false;
        }

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&old) {
            log::warn!(
                "add_entry: {} already forwarded to {}, ignoring {}",
                old,
                existing,
                new
            );
            return false;
        }
        entries.insert(old, new);
        self.generation.fetch_add(1, Ordering::Release);
        true
    }

    /// New address of `old`, if it moved
    #[inline]
    pub fn lookup(&self, old: CellAddr) -> Option<CellAddr> {
        self.entries.read().get(&old).copied()
    }

    /// Lookup together with the generation it was made at
    pub fn lookup_with_generation(&self, old: CellAddr) -> Option<(CellAddr, u64)> {
        let generation = self.generation();
        self.lookup(old).map(|new| (new, generation))
    }

    /// Forward a slot value; non-moved values are returned unchanged
    pub fn forward_value(&self, value: Value) -> Value {
        match value.as_cell().and_then(|addr| self.lookup(addr)) {
            Some(new) => Value::Cell(new),
            None => value,
        }
    }

    /// Snapshot of all moves in insertion order
    pub fn entries(&self) -> Vec<(CellAddr, CellAddr)> {
        self.entries
            .read()
            .iter()
            .map(|(old, new)| (*old, *new))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ForwardingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: usize) -> CellAddr {
        CellAddr::new(raw).unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let table = ForwardingTable::new();
        assert!(table.add_entry(addr(0x1000_0000), addr(0x1_0000_0000)));
        assert_eq!(table.lookup(addr(0x1000_0000)), Some(addr(0x1_0000_0000)));
        assert_eq!(table.lookup(addr(0x1000_0010)), None);
        assert_eq!(table.generation(), 1);
    }

    #[test]
    fn test_rejects_self_and_double_forwarding() {
        let table = ForwardingTable::new();
        assert!(!table.add_entry(addr(0x40), addr(0x40)));
        assert!(table.add_entry(addr(0x40), addr(0x80)));
        assert!(!table.add_entry(addr(0x40), addr(0xC0)));
        assert_eq!(table.lookup(addr(0x40)), Some(addr(0x80)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_forward_value_leaves_primitives() {
        let table = ForwardingTable::new();
        table.add_entry(addr(0x40), addr(0x80));

        assert_eq!(table.forward_value(Value::Cell(addr(0x40))), Value::Cell(addr(0x80)));
        assert_eq!(table.forward_value(Value::Cell(addr(0x50))), Value::Cell(addr(0x50)));
        assert_eq!(table.forward_value(Value::Int32(4)), Value::Int32(4));
    }
}
