//! Test Utilities for the gcbarrier Test Suite
//!
//! Fixtures build a heap with strict validation on, so any barrier misuse in
//! a test aborts it. Assertion helpers check heap-wide invariants with ZERO
//! tolerance.
#![allow(dead_code)]

use gcbarrier::{
    BarrierConfig, CellAddr, CellColor, CellKind, Heap, RootId, SlotAddr, Value, ZoneId, ZoneKind,
};
use std::any::Any;
use std::collections::HashSet;

/// Seed for randomized write sequences (reproducible failures)
pub const SEED: u64 = 0x5EED_BA55;

/// ============================================================================
/// HEAP FIXTURE
/// ============================================================================

/// Test fixture: a heap with one regular zone owned by the test thread
pub struct HeapFixture {
    pub heap: Heap,
    pub zone: ZoneId,
}

impl HeapFixture {
    /// Strict validation, default sizes
    ///
    /// **Bug this finds:** Any barrier invariant broken along the way
    pub fn strict() -> Self {
        Self::with_config(BarrierConfig {
            strict_checks: true,
            ..Default::default()
        })
    }

    /// Validation off
    pub fn lax() -> Self {
        Self::with_config(BarrierConfig {
            strict_checks: false,
            ..Default::default()
        })
    }

    /// Strict validation with a small store buffer
    ///
    /// **Bug this finds:** Dropped entries and missing eager collections on
    /// overflow
    pub fn with_store_buffer_capacity(capacity: usize) -> Self {
        Self::with_config(BarrierConfig {
            strict_checks: true,
            store_buffer_capacity: capacity,
            ..Default::default()
        })
    }

    pub fn with_config(config: BarrierConfig) -> Self {
        let heap = Heap::new(config).expect("heap creation should succeed with valid config");
        let zone = heap.new_zone(ZoneKind::Regular);
        Self { heap, zone }
    }

    /// Allocate a tenured object with `slots` fields
    pub fn tenured(&self, slots: usize) -> CellAddr {
        self.heap
            .allocate_tenured(self.zone, CellKind::Object, slots)
            .unwrap_or_else(|e| panic!("tenured allocation failed: {}", e))
    }

    /// Allocate a nursery object with `slots` fields
    pub fn young(&self, slots: usize) -> CellAddr {
        self.heap
            .allocate(self.zone, CellKind::Object, slots)
            .unwrap_or_else(|e| panic!("nursery allocation failed: {}", e))
    }

    /// Hold `addr` in a new strong root
    pub fn root(&self, addr: CellAddr) -> RootId {
        let root = self.heap.new_root();
        self.heap
            .set_root(root, Value::Cell(addr))
            .expect("root store should succeed");
        root
    }

    /// Current cell held by `root`
    pub fn rooted(&self, root: RootId) -> CellAddr {
        self.heap
            .root(root)
            .expect("root should exist")
            .as_cell()
            .expect("root should hold a cell")
    }

    pub fn write(&self, owner: CellAddr, index: u32, value: Value) {
        self.heap
            .write_field(owner, index, value)
            .unwrap_or_else(|e| panic!("write to {}[{}] failed: {}", owner, index, e));
    }

    pub fn read(&self, owner: CellAddr, index: u32) -> Value {
        self.heap
            .read_field(owner, index)
            .unwrap_or_else(|e| panic!("read of {}[{}] failed: {}", owner, index, e))
    }

    pub fn color(&self, addr: CellAddr) -> CellColor {
        self.heap
            .cell(addr)
            .unwrap_or_else(|| panic!("{} is not a live cell", addr))
            .color()
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Cells reachable from `roots` through fields
pub fn reachable(heap: &Heap, roots: &[RootId]) -> HashSet<CellAddr> {
    let mut seen = HashSet::new();
    let mut stack: Vec<CellAddr> = roots
        .iter()
        .filter_map(|root| heap.root(*root).ok()?.as_cell())
        .collect();
    while let Some(addr) = stack.pop() {
        if !seen.insert(addr) {
            continue;
        }
        if let Some(cell) = heap.cell(addr) {
            stack.extend(cell.slots().iter().filter_map(|slot| slot.get().as_cell()));
        }
    }
    seen
}

/// Assert no black cell of a marking zone points at a white tenured cell
///
/// **Bug this finds:** Missing pre-barrier or insertion shading
/// **Tolerance:** ZERO - such an edge lets the marker free a live cell
#[track_caller]
pub fn assert_no_black_to_white(heap: &Heap, context: &str) {
    for addr in heap.cell_addresses() {
        let Some(cell) = heap.cell(addr) else {
            continue;
        };
        if cell.color() != CellColor::Black {
            continue;
        }
        for (index, slot) in cell.slots().iter().enumerate() {
            let Some(child_addr) = slot.get().as_cell() else {
                continue;
            };
            if child_addr.is_in_nursery() {
                continue;
            }
            let Some(child) = heap.cell(child_addr) else {
                continue;
            };
            let marking = heap
                .zone(child.zone())
                .map(|zone| zone.needs_incremental_barrier())
                .unwrap_or(false);
            assert!(
                !(marking && child.color() == CellColor::White),
                "{}: black {}[{}] points at white {} - barrier failed to shade",
                context,
                addr,
                index,
                child_addr
            );
        }
    }
}

/// Assert every tenured slot holding a nursery cell is in a store buffer
///
/// **Bug this finds:** Post-barrier dropping a generational edge
/// **Tolerance:** ZERO - an unrecorded edge dangles after a minor collection
#[track_caller]
pub fn assert_edges_recorded(heap: &Heap, context: &str) {
    for addr in heap.cell_addresses() {
        if addr.is_in_nursery() {
            continue;
        }
        let Some(cell) = heap.cell(addr) else {
            continue;
        };
        let zone = heap.zone(cell.zone()).expect("cell zone should exist");
        for (index, slot) in cell.slots().iter().enumerate() {
            let young = slot.get().as_cell().map_or(false, |a| a.is_in_nursery());
            if !young {
                continue;
            }
            let slot_addr = SlotAddr::field(addr, index as u32);
            assert!(
                zone.store_buffer().lock().contains_slot(slot_addr),
                "{}: {} holds a nursery cell but is not in the store buffer",
                context,
                slot_addr
            );
        }
    }
}

/// Assert no slot anywhere refers to the nursery or to a freed cell
#[track_caller]
pub fn assert_no_dangling_edges(heap: &Heap, context: &str) {
    for addr in heap.cell_addresses() {
        let Some(cell) = heap.cell(addr) else {
            continue;
        };
        for slot in cell.slots() {
            if let Some(target) = slot.get().as_cell() {
                assert!(
                    heap.contains_cell(target),
                    "{}: {} points at {} which is not a live cell",
                    context,
                    addr,
                    target
                );
            }
        }
    }
}

/// Message of a caught panic
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        String::from("<non-string panic>")
    }
}
