//! Minor Collection - Nursery evacuation
//!
//! Promotes every nursery cell reachable from the strong roots or from a
//! store-buffer entry into the tenured generation, in three steps:
//!
//! ```text
//! trace     roots + store buffer ──► nursery survivors (transitively)
//! reserve   one tenured address per survivor      (only step that can fail)
//! commit    copy, forward slots, rekey ids, reset nursery, clear buffers
//! ```
//!
//! If reserving fails, the reserved addresses are released and the heap is
//! left exactly as it was: store buffers, cell table and nursery untouched.
//!
//! Promoted cells come out white, or gray and queued if their zone is being
//! marked.

use super::{CollectionSession, ForwardingTable, MinorGcReason};
use crate::barrier::HeapPhase;
use crate::cell::{Cell, CellAddr, CellColor, HeapSlot, SlotAddr, Value, ZoneId};
use crate::error::Result;
use crate::heap::{Heap, RootKind};
use crate::logging::GcEvent;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one minor collection
#[derive(Debug, Clone)]
pub struct MinorCollectionReport {
    pub reason: MinorGcReason,
    /// Store-buffer entries consumed
    pub store_buffer_entries: usize,
    /// Cells moved to the tenured generation
    pub promoted: usize,
    pub promoted_bytes: usize,
    /// Nursery cells that died
    pub freed: usize,
    /// Weak roots cleared because their referent died
    pub weak_cleared: usize,
    pub duration: Duration,
}

/// A slot that may hold a nursery edge
enum SourceSlot {
    Root(Arc<HeapSlot>),
    Field(Arc<Cell>, u32),
}

impl SourceSlot {
    fn slot(&self) -> Option<&HeapSlot> {
        match self {
            SourceSlot::Root(slot) => Some(slot.as_ref()),
            SourceSlot::Field(cell, index) => cell.slot(*index),
        }
    }
}

impl Heap {
    /// Run a minor collection now
    pub fn minor_gc(&self, reason: MinorGcReason) -> Result<MinorCollectionReport> {
        let session = CollectionSession::enter(self)?;
        self.minor_gc_in(&session, reason)
    }

    /// Minor collection inside an already open session
    pub(crate) fn minor_gc_in(
        &self,
        session: &CollectionSession<'_>,
        reason: MinorGcReason,
    ) -> Result<MinorCollectionReport> {
        let start = Instant::now();
        let cycle = self.minor_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.clear_minor_gc_request();
        self.set_phase(HeapPhase::MinorCollecting);
        self.logger().log(GcEvent::MinorCollectionStart {
            cycle,
            reason: reason.to_string(),
        });

        let result = self.evacuate_nursery(reason, start);
        self.set_phase(session.entry_phase());

        match &result {
            Ok(report) => {
                log::debug!(
                    "minor GC #{} ({}): promoted {}, freed {}, {} store buffer entries",
                    cycle,
                    reason,
                    report.promoted,
                    report.freed,
                    report.store_buffer_entries
                );
                self.logger().log(GcEvent::MinorCollectionEnd {
                    cycle,
                    promoted: report.promoted,
                    freed: report.freed,
                    duration_ms: report.duration.as_secs_f64() * 1000.0,
                });
            }
            Err(err) => log::warn!("minor GC #{} ({}) abandoned: {}", cycle, reason, err),
        }
        result
    }

    fn evacuate_nursery(&self, reason: MinorGcReason, start: Instant) -> Result<MinorCollectionReport> {
        let zones = self.zones();
        let mut cells = self.cells.write();
        let mut space = self.space.lock();

        // Store buffers are only read here; they are cleared once committed
        let mut sources: Vec<SourceSlot> = self
            .roots
            .snapshot(RootKind::Strong)
            .into_iter()
            .map(|(_, slot)| SourceSlot::Root(slot))
            .collect();
        let mut entry_count = 0;
        for zone in &zones {
            for entry in zone.store_buffer().lock().iter() {
                entry_count += 1;
                match entry.slot {
                    SlotAddr::Field { owner, index } => {
                        if let Some(cell) = cells.get(&owner) {
                            sources.push(SourceSlot::Field(cell.clone(), index));
                        }
                    }
                    SlotAddr::External(id) => {
                        if self.roots.kind(id).ok() == Some(RootKind::Strong) {
                            if let Ok(slot) = self.roots.get(id) {
                                sources.push(SourceSlot::Root(slot));
                            }
                        }
                    }
                }
            }
        }

        // Trace
        let mut survivors: IndexMap<CellAddr, Arc<Cell>> = IndexMap::new();
        for source in &sources {
            if let Some(slot) = source.slot() {
                note_survivor(slot.get(), &cells, &mut survivors);
            }
        }
        let mut scanned = 0;
        while let Some((_, cell)) = survivors.get_index(scanned) {
            let cell = cell.clone();
            for slot in cell.slots() {
                note_survivor(slot.get(), &cells, &mut survivors);
            }
            scanned += 1;
        }

        // Reserve
        let mut destinations = Vec::with_capacity(survivors.len());
        for cell in survivors.values() {
            match space.alloc_tenured(cell.size()) {
                Ok(addr) => destinations.push(addr),
                Err(err) => {
                    for (addr, cell) in destinations.iter().zip(survivors.values()) {
                        space.release_tenured(*addr, cell.size());
                    }
                    return Err(err);
                }
            }
        }

        // Commit
        let forwarding = ForwardingTable::new();
        let mut marking_zones: FxHashMap<ZoneId, bool> = FxHashMap::default();
        let mut promoted_bytes = 0;
        for ((old, cell), new) in survivors.iter().zip(&destinations) {
            let copy = cell.relocated_copy();
            copy.header().clear_dead();
            let marking = *marking_zones.entry(copy.zone()).or_insert_with(|| {
                self.zone(copy.zone())
                    .map_or(false, |zone| zone.needs_incremental_barrier())
            });
            if marking {
                copy.header().set_color(CellColor::Gray);
                self.marker().push_gray(*new);
            } else {
                copy.header().set_color(CellColor::White);
            }
            cells.insert(*new, Arc::new(copy));
            forwarding.add_entry(*old, *new);
            promoted_bytes += cell.size();
            log::trace!("promoted {} -> {}", old, new);
        }

        for source in &sources {
            if let Some(slot) = source.slot() {
                forward_slot(slot, &forwarding);
            }
        }
        for new in &destinations {
            if let Some(cell) = cells.get(new) {
                for slot in cell.slots() {
                    forward_slot(slot, &forwarding);
                }
            }
        }

        let mut weak_cleared = 0;
        for (_, slot) in self.roots.snapshot(RootKind::Weak) {
            let Some(target) = slot.get().as_cell() else {
                continue;
            };
            if !target.is_in_nursery() {
                continue;
            }
            match forwarding.lookup(target) {
                Some(new) => slot.set_unbarriered(Value::Cell(new)),
                None => {
                    slot.set_unbarriered(Value::Null);
                    weak_cleared += 1;
                }
            }
        }

        // Retire the nursery: rekey survivors, forget the dead
        let nursery: Vec<CellAddr> = cells
            .keys()
            .copied()
            .filter(|addr| addr.is_in_nursery())
            .collect();
        let mut moves: FxHashMap<ZoneId, Vec<(CellAddr, CellAddr)>> = FxHashMap::default();
        let mut freed = 0;
        for old in nursery {
            let Some(cell) = cells.swap_remove(&old) else {
                continue;
            };
            match forwarding.lookup(old) {
                Some(new) => moves.entry(cell.zone()).or_default().push((old, new)),
                None => {
                    freed += 1;
                    if let Ok(zone) = self.zone(cell.zone()) {
                        zone.unique_ids().remove(old);
                    }
                }
            }
        }
        for (zone_id, zone_moves) in moves {
            if let Ok(zone) = self.zone(zone_id) {
                zone.unique_ids().rekey_all(zone_moves);
            }
        }
        space.reset_nursery();
        for zone in &zones {
            zone.store_buffer().lock().clear();
        }

        Ok(MinorCollectionReport {
            reason,
            store_buffer_entries: entry_count,
            promoted: destinations.len(),
            promoted_bytes,
            freed,
            weak_cleared,
            duration: start.elapsed(),
        })
    }
}

/// Add the nursery target of `value` to `survivors`
fn note_survivor(
    value: Value,
    cells: &IndexMap<CellAddr, Arc<Cell>>,
    survivors: &mut IndexMap<CellAddr, Arc<Cell>>,
) {
    let Some(target) = value.as_cell() else {
        return;
    };
    if !target.is_in_nursery() || survivors.contains_key(&target) {
        return;
    }
    match cells.get(&target) {
        Some(cell) => {
            survivors.insert(target, cell.clone());
        }
        None => log::error!("minor GC: slot points at {} which is not a nursery cell", target),
    }
}

/// Point `slot` at the tenured copy of its nursery target
fn forward_slot(slot: &HeapSlot, forwarding: &ForwardingTable) {
    let Some(target) = slot.get().as_cell() else {
        return;
    };
    if !target.is_in_nursery() {
        return;
    }
    if let Some(new) = forwarding.lookup(target) {
        slot.set_unbarriered(Value::Cell(new));
    }
}

#[cfg(test)]
mod tests {
    use crate::barrier::HeapPhase;
    use crate::cell::{CellKind, SlotAddr, Value};
    use crate::collector::MinorGcReason;
    use crate::config::BarrierConfig;
    use crate::heap::{Heap, ZoneKind};

    fn create_test_heap() -> Heap {
        Heap::new(BarrierConfig {
            strict_checks: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_unreachable_nursery_cells_die() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        heap.allocate(zone, CellKind::Object, 1).unwrap();
        heap.allocate(zone, CellKind::Object, 1).unwrap();

        let report = heap.minor_gc(MinorGcReason::Explicit).unwrap();
        assert_eq!(report.freed, 2);
        assert_eq!(report.promoted, 0);
        assert_eq!(heap.cell_count(), 0);
        assert_eq!(heap.nursery_used(), 0);
    }

    #[test]
    fn test_rooted_chain_is_promoted() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let head = heap.allocate(zone, CellKind::Object, 1).unwrap();
        let tail = heap.allocate(zone, CellKind::String, 0).unwrap();
        heap.write_field(head, 0, Value::Cell(tail)).unwrap();

        let root = heap.new_root();
        heap.set_root(root, Value::Cell(head)).unwrap();

        let report = heap.minor_gc(MinorGcReason::Explicit).unwrap();
        assert_eq!(report.promoted, 2);

        let new_head = heap.root(root).unwrap().as_cell().unwrap();
        assert!(!new_head.is_in_nursery());
        let new_tail = heap.read_field(new_head, 0).unwrap().as_cell().unwrap();
        assert!(!new_tail.is_in_nursery());
        assert_eq!(heap.cell(new_tail).unwrap().kind(), CellKind::String);
    }

    #[test]
    fn test_store_buffer_entry_keeps_target_alive() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let owner = heap.allocate_tenured(zone, CellKind::Object, 1).unwrap();
        let young = heap.allocate(zone, CellKind::Object, 0).unwrap();
        heap.write_field(owner, 0, Value::Cell(young)).unwrap();

        let report = heap.minor_gc(MinorGcReason::Explicit).unwrap();
        assert_eq!(report.store_buffer_entries, 1);
        assert_eq!(report.promoted, 1);

        let moved = heap.read_field(owner, 0).unwrap().as_cell().unwrap();
        assert!(!moved.is_in_nursery());
        assert!(heap
            .zone(zone)
            .unwrap()
            .store_buffer()
            .lock()
            .iter()
            .all(|e| e.slot != SlotAddr::field(owner, 0)));
    }

    #[test]
    fn test_unique_id_follows_promotion() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let young = heap.allocate(zone, CellKind::Object, 0).unwrap();
        let root = heap.new_root();
        heap.set_root(root, Value::Cell(young)).unwrap();

        let zone_ref = heap.zone(zone).unwrap();
        let uid = zone_ref.get_or_create_unique_id(young).unwrap();

        heap.minor_gc(MinorGcReason::Explicit).unwrap();
        let promoted = heap.root(root).unwrap().as_cell().unwrap();
        assert_eq!(zone_ref.maybe_get_unique_id(promoted), Some(uid));
        assert_eq!(zone_ref.maybe_get_unique_id(young), None);
    }

    #[test]
    fn test_failed_promotion_leaves_heap_unchanged() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let owner = heap.allocate_tenured(zone, CellKind::Object, 1).unwrap();
        let young = heap.allocate(zone, CellKind::Object, 1).unwrap();
        let younger = heap.allocate(zone, CellKind::Object, 0).unwrap();
        heap.write_field(young, 0, Value::Cell(younger)).unwrap();
        heap.write_field(owner, 0, Value::Cell(young)).unwrap();

        let cells_before = heap.cell_count();
        let nursery_before = heap.nursery_used();
        heap.space.lock().exhaust_tenured();

        assert!(heap.minor_gc(MinorGcReason::Explicit).is_err());
        assert_eq!(heap.phase(), HeapPhase::Idle);
        assert_eq!(heap.cell_count(), cells_before);
        assert_eq!(heap.nursery_used(), nursery_before);
        assert_eq!(heap.read_field(owner, 0).unwrap(), Value::Cell(young));
        assert!(heap.contains_cell(young));
        assert!(heap
            .zone(zone)
            .unwrap()
            .store_buffer()
            .lock()
            .contains_slot(SlotAddr::field(owner, 0)));
    }

    #[test]
    fn test_weak_root_cleared_when_target_dies() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let young = heap.allocate(zone, CellKind::Object, 0).unwrap();
        let weak = heap.new_weak_root();
        heap.set_root(weak, Value::Cell(young)).unwrap();

        let report = heap.minor_gc(MinorGcReason::Explicit).unwrap();
        assert_eq!(report.weak_cleared, 1);
        assert_eq!(heap.root(weak).unwrap(), Value::Null);
    }
}
