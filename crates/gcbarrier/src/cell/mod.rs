//! Cell Module - Heap Cell Model
//!
//! Logical representation of a collector-managed allocation:
//! its address, color, generation, kind and zone membership.
//!
//! Cell Layout (simulated):
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Mark Word (8 bytes)             │  <- AtomicUsize
//! │  - Bits 0-1: Color (white/gray/black)   │
//! │  - Bit 2: Dead (about to be finalized)  │
//! ├─────────────────────────────────────────┤
//! │      Kind + Zone (8 bytes)              │
//! ├─────────────────────────────────────────┤
//! │   Slots (8 bytes each, tagged Value)    │  <- HeapSlot
//! └─────────────────────────────────────────┘
//! ```
//!
//! The generation of a cell is not stored: it is a property of the address
//! range the cell lives in, the same way a nursery check inspects the chunk
//! an address belongs to.

pub mod header;
pub mod pointer;
pub mod slot;
pub mod value;

pub use header::{CellHeader, HEADER_SIZE};
pub use pointer::{BigIntRef, CellRef, GcThing, ObjectRef, ScriptRef, StringRef};
pub use slot::{HeapSlot, RootId, SlotAddr};
pub use value::Value;

use crate::heap::address_space;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// Slot width in bytes
pub const SLOT_SIZE: usize = 8;

/// CellAddr - current (movable) address of a heap cell
///
/// Never null: a null reference is `Option<CellAddr>::None` or
/// [`Value::Null`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddr(NonZeroUsize);

impl CellAddr {
    /// Wrap a raw address; returns `None` for 0
    #[inline]
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(CellAddr)
    }

    /// Raw address value
    #[inline]
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Generation this address belongs to
    #[inline]
    pub fn generation(self) -> Generation {
        address_space::generation_of(self.get())
    }

    /// Check if this address lies inside the nursery
    #[inline]
    pub fn is_in_nursery(self) -> bool {
        self.generation() == Generation::Nursery
    }
}

impl fmt::Display for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:012X}", self.get())
    }
}

impl fmt::Debug for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellAddr({})", self)
    }
}

/// ZoneId - identifies a heap partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tri-color marking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellColor {
    /// Not reached this cycle
    White,
    /// Reached, children not yet scanned
    Gray,
    /// Reached and fully scanned
    Black,
}

/// Generation of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Generation {
    /// Young, cheap, moved by minor collection
    Nursery,
    /// Long-lived, reclaimed by major collection only
    Tenured,
}

/// Kind of collector-managed allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellKind {
    Object,
    String,
    BigInt,
    Script,
    Other,
}

/// Cell - a collector-managed allocation
///
/// Cells are owned by the heap's cell table. Everything outside the
/// collector sees a cell through `Arc<Cell>` and can only change its slots
/// through the barriered [`HeapSlot::set`].
pub struct Cell {
    header: CellHeader,
    slots: Box<[HeapSlot]>,
}

impl Cell {
    pub(crate) fn new(kind: CellKind, zone: ZoneId, slot_count: usize) -> Self {
        Self {
            header: CellHeader::new(kind, zone),
            slots: (0..slot_count).map(|_| HeapSlot::new()).collect(),
        }
    }

    /// Copy of this cell for its new location
    ///
    /// Slot values are copied without barriers: only the collector moves
    /// cells, and it fixes up edges itself.
    pub(crate) fn relocated_copy(&self) -> Self {
        let slots: Box<[HeapSlot]> = self
            .slots
            .iter()
            .map(|slot| HeapSlot::with_value(slot.get()))
            .collect();
        Self {
            header: self.header.relocated_copy(),
            slots,
        }
    }

    #[inline]
    pub fn header(&self) -> &CellHeader {
        &self.header
    }

    #[inline]
    pub fn kind(&self) -> CellKind {
        self.header.kind()
    }

    #[inline]
    pub fn zone(&self) -> ZoneId {
        self.header.zone()
    }

    #[inline]
    pub fn color(&self) -> CellColor {
        self.header.color()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot at `index`, if in range
    #[inline]
    pub fn slot(&self, index: u32) -> Option<&HeapSlot> {
        self.slots.get(index as usize)
    }

    #[inline]
    pub fn slots(&self) -> &[HeapSlot] {
        &self.slots
    }

    /// Size in bytes including header, aligned to the cell alignment
    pub fn size(&self) -> usize {
        cell_size(self.slots.len())
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.kind())
            .field("zone", &self.zone())
            .field("color", &self.color())
            .field("dead", &self.header.is_dead())
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Allocation size for a cell with `slot_count` slots
pub fn cell_size(slot_count: usize) -> usize {
    let raw = HEADER_SIZE + slot_count * SLOT_SIZE;
    (raw + address_space::CELL_ALIGNMENT - 1) & !(address_space::CELL_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::address_space::{NURSERY_BASE, TENURED_BASE};

    #[test]
    fn test_null_address_rejected() {
        assert!(CellAddr::new(0).is_none());
        assert_eq!(CellAddr::new(0x40).map(CellAddr::get), Some(0x40));
    }

    #[test]
    fn test_generation_from_address_range() {
        let young = CellAddr::new(NURSERY_BASE + 0x100).unwrap();
        let old = CellAddr::new(TENURED_BASE + 0x100).unwrap();
        assert_eq!(young.generation(), Generation::Nursery);
        assert!(young.is_in_nursery());
        assert_eq!(old.generation(), Generation::Tenured);
    }

    #[test]
    fn test_cell_size_is_aligned() {
        assert_eq!(cell_size(0), HEADER_SIZE);
        assert_eq!(cell_size(1) % address_space::CELL_ALIGNMENT, 0);
        assert!(cell_size(3) >= HEADER_SIZE + 3 * SLOT_SIZE);
    }

    #[test]
    fn test_relocated_copy_keeps_slots_and_color() {
        let cell = Cell::new(CellKind::Object, ZoneId(1), 2);
        cell.slots()[1].set_unbarriered(Value::Int32(7));
        cell.header().set_color(CellColor::Black);

        let copy = cell.relocated_copy();
        assert_eq!(copy.slot_count(), 2);
        assert_eq!(copy.slots()[1].get(), Value::Int32(7));
        assert_eq!(copy.color(), CellColor::Black);
        assert_eq!(copy.zone(), ZoneId(1));
    }

    #[test]
    fn test_address_display() {
        let addr = CellAddr::new(0x1234).unwrap();
        assert_eq!(addr.to_string(), "0x000000001234");
    }
}
