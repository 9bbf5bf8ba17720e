//! Incremental Marking - Tri-color marking in slices
//!
//! ```text
//! start_incremental_marking   evict nursery, whiten zones, gray strong roots
//!                             and targets of edges from uncollected zones
//!        │
//!        ▼
//! mark_slice(budget) ◄──┐     pop gray, gray white children, blacken
//!        │ work left ───┘     (mutator runs between slices, behind barriers)
//!        ▼
//! finish_marking              evict nursery, drain, flag white cells dead
//! ```
//!
//! Only tenured cells of the zones being collected take part. Cells of the
//! other zones are not traced, so every edge from them into a collected zone
//! is treated as a root. Between slices the pre-barrier preserves the
//! snapshot and the post-barrier's insertion step keeps black cells from
//! pointing at white ones.

use super::{CollectionSession, MinorGcReason};
use crate::barrier::HeapPhase;
use crate::cell::{CellColor, ZoneId};
use crate::collector::Tracer;
use crate::error::{BarrierError, Result};
use crate::heap::{Heap, RootKind};
use crate::logging::GcEvent;
use rustc_hash::FxHashSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Result of a completed marking phase
#[derive(Debug, Clone)]
pub struct MarkingReport {
    /// Cells shaded gray during the cycle
    pub marked: u64,
    /// Cells scanned (turned black)
    pub scanned: u64,
    /// Tenured cells that survived
    pub live: usize,
    /// Tenured cells flagged as about to be finalized
    pub dead: usize,
    pub duration: Duration,
}

impl Heap {
    /// Begin an incremental major collection of `zones`
    ///
    /// An empty slice selects every zone.
    pub fn start_incremental_marking(&self, zones: &[ZoneId]) -> Result<()> {
        let mut session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Idle)?;

        let targets = if zones.is_empty() {
            self.zones()
        } else {
            zones
                .iter()
                .map(|id| self.zone(*id))
                .collect::<Result<Vec<_>>>()?
        };

        self.minor_gc_in(&session, MinorGcReason::EvictNursery)?;

        let cycle = self.major_count.load(Ordering::Relaxed) + 1;
        let ids: FxHashSet<ZoneId> = targets.iter().map(|zone| zone.id()).collect();
        for zone in &targets {
            zone.set_gc_preparing(true);
        }

        self.marker().reset();
        for cell in self.cells.read().values() {
            if ids.contains(&cell.zone()) {
                cell.header().set_color(CellColor::White);
                cell.header().clear_dead();
            }
        }
        for zone in &targets {
            zone.set_needs_incremental_barrier(true);
        }

        for (_, slot) in self.roots.snapshot(RootKind::Strong) {
            let Some(addr) = slot.get().as_cell() else {
                continue;
            };
            if let Some(cell) = self.cell(addr) {
                if ids.contains(&cell.zone()) {
                    self.marker().mark_gray(addr, &cell);
                }
            }
        }

        let cross_zone = self.gray_cross_zone_targets(&ids);

        *self.collecting_zones.lock() = ids.iter().copied().collect();
        for zone in &targets {
            zone.set_gc_preparing(false);
        }
        session.resume_in(HeapPhase::Marking);

        log::debug!(
            "major GC #{}: marking {} zone(s), {} cell(s) grayed, {} from other zones",
            cycle,
            targets.len(),
            self.marker().gray_len(),
            cross_zone
        );
        self.logger().log(GcEvent::MarkingStart {
            cycle,
            zones: targets.len(),
        });
        Ok(())
    }

    /// Check if incremental marking is in progress
    pub fn is_incremental_marking(&self) -> bool {
        self.phase() == HeapPhase::Marking
    }

    /// Scan up to `budget` gray cells
    ///
    /// Returns true once the gray queue is empty.
    pub fn mark_slice(&self, budget: usize) -> Result<bool> {
        let session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Marking)?;
        self.drain_gray(Some(budget));
        Ok(!self.marker().has_gray())
    }

    /// End marking: flag unmarked cells dead and enter sweeping
    pub fn finish_marking(&self) -> Result<MarkingReport> {
        let start = Instant::now();
        let mut session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Marking)?;

        // Cells allocated in the nursery during marking are promoted gray
        self.minor_gc_in(&session, MinorGcReason::EvictNursery)?;
        self.drain_gray(None);

        let zone_ids = self.collecting_zones.lock().clone();
        let ids: FxHashSet<ZoneId> = zone_ids.iter().copied().collect();
        let mut live = 0;
        let mut dead = 0;
        for cell in self.cells.read().values() {
            if !ids.contains(&cell.zone()) {
                continue;
            }
            match cell.color() {
                CellColor::White => {
                    cell.header().set_dead();
                    dead += 1;
                }
                CellColor::Black => live += 1,
                CellColor::Gray => {
                    return Err(BarrierError::Internal(
                        "gray cell left after draining the gray queue".into(),
                    ));
                }
            }
        }

        for id in &zone_ids {
            if let Ok(zone) = self.zone(*id) {
                zone.set_needs_incremental_barrier(false);
            }
        }
        *self.sweep_queue.lock() = zone_ids;
        session.resume_in(HeapPhase::Sweeping);

        let report = MarkingReport {
            marked: self.marker().marked_count(),
            scanned: self.marker().scanned_count(),
            live,
            dead,
            duration: start.elapsed(),
        };
        self.logger().log(GcEvent::MarkingEnd {
            cycle: self.major_count.load(Ordering::Relaxed) + 1,
            marked: report.marked,
            dead,
        });
        Ok(report)
    }

    /// Gray every collected cell referenced from a zone outside `ids`
    fn gray_cross_zone_targets(&self, ids: &FxHashSet<ZoneId>) -> usize {
        let cells = self.cells.read();
        let mut edges = 0;
        for cell in cells.values().filter(|cell| !ids.contains(&cell.zone())) {
            for slot in cell.slots() {
                let Some(child_addr) = slot.get().as_cell() else {
                    continue;
                };
                let Some(child) = cells.get(&child_addr) else {
                    continue;
                };
                if ids.contains(&child.zone()) {
                    self.marker().mark_gray(child_addr, child);
                    edges += 1;
                }
            }
        }
        edges
    }

    /// Scan gray cells until the queue is empty or `budget` is spent
    fn drain_gray(&self, budget: Option<usize>) -> usize {
        let marker = self.marker();
        let mut scanned = 0;
        while budget.map_or(true, |limit| scanned < limit) {
            let Some(addr) = marker.pop_gray() else {
                break;
            };
            let Some(cell) = self.cell(addr) else {
                continue;
            };
            if cell.color() == CellColor::Black {
                continue;
            }

            for slot in cell.slots() {
                let Some(child_addr) = slot.get().as_cell() else {
                    continue;
                };
                if child_addr.is_in_nursery() {
                    continue;
                }
                let Some(child) = self.cell(child_addr) else {
                    continue;
                };
                let marking = self
                    .zone(child.zone())
                    .map_or(false, |zone| zone.needs_incremental_barrier());
                if marking {
                    marker.mark_gray(child_addr, &child);
                }
            }
            cell.header().set_color(CellColor::Black);
            marker.record_scanned();
            scanned += 1;
        }
        scanned
    }
}

#[cfg(test)]
mod tests {
    use crate::barrier::HeapPhase;
    use crate::cell::{CellColor, CellKind, Value};
    use crate::config::BarrierConfig;
    use crate::error::BarrierError;
    use crate::heap::{Heap, ZoneKind};

    fn create_test_heap() -> Heap {
        Heap::new(BarrierConfig {
            strict_checks: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_marking_reaches_rooted_chain() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let a = heap.allocate_tenured(zone, CellKind::Object, 1).unwrap();
        let b = heap.allocate_tenured(zone, CellKind::Object, 0).unwrap();
        let garbage = heap.allocate_tenured(zone, CellKind::Object, 0).unwrap();
        heap.write_field(a, 0, Value::Cell(b)).unwrap();
        let root = heap.new_root();
        heap.set_root(root, Value::Cell(a)).unwrap();

        heap.start_incremental_marking(&[]).unwrap();
        assert_eq!(heap.phase(), HeapPhase::Marking);
        assert_eq!(heap.cell(a).unwrap().color(), CellColor::Gray);

        while !heap.mark_slice(1).unwrap() {}
        let report = heap.finish_marking().unwrap();

        assert_eq!(report.live, 2);
        assert_eq!(report.dead, 1);
        assert!(heap.cell(garbage).unwrap().header().is_dead());
        assert_eq!(heap.phase(), HeapPhase::Sweeping);
    }

    #[test]
    fn test_phase_checked() {
        let heap = create_test_heap();
        assert!(matches!(
            heap.mark_slice(10),
            Err(BarrierError::InvalidPhase { .. })
        ));
        heap.start_incremental_marking(&[]).unwrap();
        assert!(heap.start_incremental_marking(&[]).is_err());
    }

    #[test]
    fn test_tenured_allocation_during_marking_is_black() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        heap.start_incremental_marking(&[zone]).unwrap();

        let fresh = heap.allocate_tenured(zone, CellKind::Object, 0).unwrap();
        assert_eq!(heap.cell(fresh).unwrap().color(), CellColor::Black);
    }

    #[test]
    fn test_other_zones_untouched() {
        let heap = create_test_heap();
        let marked = heap.new_zone(ZoneKind::Regular);
        let other = heap.new_zone(ZoneKind::Regular);
        let bystander = heap.allocate_tenured(other, CellKind::Object, 0).unwrap();

        heap.start_incremental_marking(&[marked]).unwrap();
        assert!(!heap.zone(other).unwrap().needs_incremental_barrier());
        heap.finish_marking().unwrap();
        assert!(!heap.cell(bystander).unwrap().header().is_dead());
    }

    #[test]
    fn test_edge_from_uncollected_zone_is_a_root() {
        let heap = create_test_heap();
        let collected = heap.new_zone(ZoneKind::Regular);
        let other = heap.new_zone(ZoneKind::Regular);
        let target = heap.allocate_tenured(collected, CellKind::Object, 0).unwrap();
        let garbage = heap.allocate_tenured(collected, CellKind::Object, 0).unwrap();
        // Not rooted: zone `other` is not traced, its cells count as live
        let holder = heap.allocate_tenured(other, CellKind::Object, 1).unwrap();
        heap.write_field(holder, 0, Value::Cell(target)).unwrap();

        heap.start_incremental_marking(&[collected]).unwrap();
        assert_eq!(heap.cell(target).unwrap().color(), CellColor::Gray);

        let report = heap.finish_marking().unwrap();
        assert_eq!(report.live, 1);
        assert_eq!(report.dead, 1);
        assert!(!heap.cell(target).unwrap().header().is_dead());
        assert!(heap.cell(garbage).unwrap().header().is_dead());
    }
}
