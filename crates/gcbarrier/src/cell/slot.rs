//! Barriered slots
//!
//! [`HeapSlot`] is the only way to hold a heap reference inside a cell or a
//! root. Its public mutator runs the pre-barrier, the store and the
//! post-barrier in that order; the unbarriered store is crate-private and
//! reserved for the collector, which fixes up edges while every mutator
//! scope is closed.

use super::{CellAddr, Value};
use crate::barrier::{post_barrier, pre_barrier, BarrierContext};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// RootId - index of an external slot registered with the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u32);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// SlotAddr - address of a barriered slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotAddr {
    /// Field `index` of the managed cell at `owner`
    Field { owner: CellAddr, index: u32 },
    /// Slot held outside the managed heap
    External(RootId),
}

impl SlotAddr {
    #[inline]
    pub fn field(owner: CellAddr, index: u32) -> Self {
        SlotAddr::Field { owner, index }
    }

    /// Owning cell for field slots
    #[inline]
    pub fn owner(&self) -> Option<CellAddr> {
        match self {
            SlotAddr::Field { owner, .. } => Some(*owner),
            SlotAddr::External(_) => None,
        }
    }
}

impl fmt::Display for SlotAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotAddr::Field { owner, index } => write!(f, "{}[{}]", owner, index),
            SlotAddr::External(id) => write!(f, "{}", id),
        }
    }
}

/// HeapSlot - barriered storage for one [`Value`]
pub struct HeapSlot {
    bits: AtomicU64,
}

impl HeapSlot {
    pub fn new() -> Self {
        Self::with_value(Value::Undefined)
    }

    pub(crate) fn with_value(value: Value) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> Value {
        Value::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Overwrite the slot, running both write barriers
    ///
    /// `addr` must be the address of this very slot; strict validation
    /// checks it before anything is written. The store and both barriers run
    /// inside one mutator scope, so no collection sees the store without its
    /// store-buffer entry.
    pub fn set(&self, ctx: &BarrierContext<'_>, addr: SlotAddr, value: Value) {
        let _scope = ctx.heap().mutator_scope();
        ctx.validator().precondition_for_set(ctx, addr, self);

        let prev = self.get();
        pre_barrier(ctx, prev);
        self.set_unbarriered(value);
        post_barrier(ctx, addr, prev, value);
    }

    /// Store without barriers (collector use only)
    #[inline]
    pub(crate) fn set_unbarriered(&self, value: Value) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for HeapSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HeapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeapSlot").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_undefined() {
        assert_eq!(HeapSlot::new().get(), Value::Undefined);
    }

    #[test]
    fn test_unbarriered_store() {
        let slot = HeapSlot::new();
        slot.set_unbarriered(Value::Boolean(true));
        assert_eq!(slot.get(), Value::Boolean(true));
    }

    #[test]
    fn test_slot_addr_owner() {
        let owner = CellAddr::new(0x40).unwrap();
        assert_eq!(SlotAddr::field(owner, 2).owner(), Some(owner));
        assert_eq!(SlotAddr::External(RootId(1)).owner(), None);
        assert_eq!(SlotAddr::External(RootId(1)).to_string(), "root#1");
    }
}
