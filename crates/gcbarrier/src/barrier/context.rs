//! Barrier Context - Explicit collector state for barrier code
//!
//! Barriers never reach for global state. Everything they consult (the heap
//! phase, zones, the tracer, the validator, counters) comes from the
//! [`BarrierContext`] the caller passes in. The context borrows the heap and
//! reads its phase live, so a context held across a collection never sees a
//! stale phase.

use super::stats::AtomicBarrierStats;
use crate::cell::{Cell, CellAddr, ZoneId};
use crate::collector::marker::Tracer;
use crate::heap::{Heap, Zone};
use crate::verify::BarrierValidator;
use std::fmt;
use std::sync::Arc;
use std::thread;

/// Collector phase as seen by barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeapPhase {
    /// Mutator running, no collection in progress
    Idle = 0,
    /// Minor collection is promoting nursery cells
    MinorCollecting = 1,
    /// Incremental marking in progress between slices
    Marking = 2,
    /// Marking finished, dead cells not yet freed
    Sweeping = 3,
    /// Tenured cells are being moved
    Compacting = 4,
}

impl HeapPhase {
    pub(crate) fn from_u8(raw: u8) -> HeapPhase {
        match raw {
            1 => HeapPhase::MinorCollecting,
            2 => HeapPhase::Marking,
            3 => HeapPhase::Sweeping,
            4 => HeapPhase::Compacting,
            _ => HeapPhase::Idle,
        }
    }

    /// Check if the collector itself is running (mutator stopped)
    pub fn is_collecting(self) -> bool {
        matches!(self, HeapPhase::MinorCollecting | HeapPhase::Compacting)
    }
}

impl fmt::Display for HeapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeapPhase::Idle => "Idle",
            HeapPhase::MinorCollecting => "MinorCollecting",
            HeapPhase::Marking => "Marking",
            HeapPhase::Sweeping => "Sweeping",
            HeapPhase::Compacting => "Compacting",
        };
        f.write_str(name)
    }
}

/// BarrierContext - capability passed to every barrier
#[derive(Clone, Copy)]
pub struct BarrierContext<'a> {
    heap: &'a Heap,
    tracer: &'a dyn Tracer,
    validator: &'a dyn BarrierValidator,
}

impl<'a> BarrierContext<'a> {
    /// Context using the heap's own marker and validator
    pub fn new(heap: &'a Heap) -> Self {
        Self {
            heap,
            tracer: heap.marker(),
            validator: heap.validator(),
        }
    }

    /// Replace the tracer barriers shade through
    pub fn with_tracer(mut self, tracer: &'a dyn Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replace the validator barriers report to
    pub fn with_validator(mut self, validator: &'a dyn BarrierValidator) -> Self {
        self.validator = validator;
        self
    }

    #[inline]
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    #[inline]
    pub fn tracer(&self) -> &'a dyn Tracer {
        self.tracer
    }

    #[inline]
    pub fn validator(&self) -> &'a dyn BarrierValidator {
        self.validator
    }

    #[inline]
    pub fn stats(&self) -> &'a AtomicBarrierStats {
        self.heap.barrier_stats()
    }

    // === Heap-state queries ===

    #[inline]
    pub fn phase(&self) -> HeapPhase {
        self.heap.phase()
    }

    /// Check if incremental marking is in progress
    #[inline]
    pub fn is_incremental_marking(&self) -> bool {
        self.phase() == HeapPhase::Marking
    }

    /// Check if the calling thread may mutate `zone`
    pub fn current_thread_can_access_zone(&self, zone: &Zone) -> bool {
        zone.is_accessible_from(thread::current().id())
    }

    /// Check if the calling thread is the one running a collection
    pub fn current_thread_is_performing_gc(&self) -> bool {
        self.heap.collecting_thread() == Some(thread::current().id())
    }

    // === Lookups ===

    #[inline]
    pub fn cell(&self, addr: CellAddr) -> Option<Arc<Cell>> {
        self.heap.cell(addr)
    }

    #[inline]
    pub fn zone(&self, id: ZoneId) -> Option<Arc<Zone>> {
        self.heap.zone(id).ok()
    }

    /// Zone of the cell at `addr`
    pub fn zone_of(&self, addr: CellAddr) -> Option<Arc<Zone>> {
        self.cell(addr).and_then(|cell| self.zone(cell.zone()))
    }
}

impl fmt::Debug for BarrierContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarrierContext")
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trips_through_u8() {
        for phase in [
            HeapPhase::Idle,
            HeapPhase::MinorCollecting,
            HeapPhase::Marking,
            HeapPhase::Sweeping,
            HeapPhase::Compacting,
        ] {
            assert_eq!(HeapPhase::from_u8(phase as u8), phase);
        }
    }

    #[test]
    fn test_only_stop_the_world_phases_are_collecting() {
        assert!(HeapPhase::MinorCollecting.is_collecting());
        assert!(HeapPhase::Compacting.is_collecting());
        assert!(!HeapPhase::Marking.is_collecting());
        assert!(!HeapPhase::Sweeping.is_collecting());
        assert_eq!(HeapPhase::Marking.to_string(), "Marking");
    }
}
