//! Sweeping - Reclaiming cells marking left white
//!
//! Sweeping is incremental too. Each `sweep_slice` drops the unique ids of
//! dead cells in one zone. Until `finish_sweep` frees them, dead cells stay
//! in the cell table flagged as about to be finalized, so hash-table keys
//! that refer to them fail to match instead of dangling.

use super::{CollectionSession, MarkingReport};
use crate::barrier::HeapPhase;
use crate::cell::{CellAddr, CellColor, Value, ZoneId};
use crate::error::Result;
use crate::heap::{Heap, RootKind};
use crate::logging::GcEvent;
use rustc_hash::FxHashSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Result of a completed sweep
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Dead cells freed
    pub freed: usize,
    pub freed_bytes: usize,
    /// Unique ids dropped with their cells
    pub ids_removed: usize,
    /// Weak roots cleared
    pub weak_cleared: usize,
    pub duration: Duration,
}

/// Result of a non-incremental major collection
#[derive(Debug, Clone)]
pub struct MajorCollectionReport {
    pub marking: MarkingReport,
    pub sweep: SweepReport,
}

impl Heap {
    /// Sweep the unique-id registry of the next pending zone
    ///
    /// Returns true once every zone of the cycle has been swept.
    pub fn sweep_slice(&self) -> Result<bool> {
        let session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Sweeping)?;
        let next = self.sweep_queue.lock().pop();
        if let Some(zone) = next {
            self.sweep_zone_ids(zone);
        }
        Ok(self.sweep_queue.lock().is_empty())
    }

    /// Sweep what is left and free every dead cell
    pub fn finish_sweep(&self) -> Result<SweepReport> {
        let start = Instant::now();
        let mut session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Sweeping)?;

        let pending: Vec<ZoneId> = self.sweep_queue.lock().drain(..).collect();
        let ids_removed: usize = pending.into_iter().map(|zone| self.sweep_zone_ids(zone)).sum();

        let mut weak_cleared = 0;
        {
            let cells = self.cells.read();
            for (_, slot) in self.roots.snapshot(RootKind::Weak) {
                let dead = slot
                    .get()
                    .as_cell()
                    .and_then(|addr| cells.get(&addr))
                    .map_or(false, |cell| cell.header().is_dead());
                if dead {
                    slot.set_unbarriered(Value::Null);
                    weak_cleared += 1;
                }
            }
        }

        let zone_ids: FxHashSet<ZoneId> = self.collecting_zones.lock().drain(..).collect();
        let mut freed = 0;
        let mut freed_bytes = 0;
        {
            let mut cells = self.cells.write();
            let mut space = self.space.lock();
            let dead: Vec<CellAddr> = cells
                .iter()
                .filter(|(_, cell)| cell.header().is_dead())
                .map(|(addr, _)| *addr)
                .collect();
            for addr in dead {
                if let Some(cell) = cells.swap_remove(&addr) {
                    freed += 1;
                    freed_bytes += cell.size();
                    space.release_tenured(addr, cell.size());
                }
            }
            for cell in cells.values() {
                if zone_ids.contains(&cell.zone()) {
                    cell.header().set_color(CellColor::White);
                }
            }
        }

        let cycle = self.major_count.fetch_add(1, Ordering::Relaxed) + 1;
        session.resume_in(HeapPhase::Idle);

        let report = SweepReport {
            freed,
            freed_bytes,
            ids_removed,
            weak_cleared,
            duration: start.elapsed(),
        };
        log::debug!(
            "major GC #{}: freed {} cells ({} bytes), dropped {} unique ids",
            cycle,
            freed,
            freed_bytes,
            ids_removed
        );
        self.logger().log(GcEvent::SweepEnd {
            cycle,
            freed,
            freed_bytes,
            ids_removed,
        });
        Ok(report)
    }

    /// Run a whole major collection of `zones` without yielding
    pub fn collect_major(&self, zones: &[ZoneId]) -> Result<MajorCollectionReport> {
        self.start_incremental_marking(zones)?;
        let budget = self.config().mark_slice_budget;
        while !self.mark_slice(budget)? {}
        let marking = self.finish_marking()?;
        let sweep = self.finish_sweep()?;
        Ok(MajorCollectionReport { marking, sweep })
    }

    /// Drop the ids of dead cells in `zone`; returns how many were dropped
    fn sweep_zone_ids(&self, zone: ZoneId) -> usize {
        let Ok(zone) = self.zone(zone) else {
            return 0;
        };
        let cells = self.cells.read();
        let removed = zone
            .unique_ids()
            .sweep(|addr| cells.get(&addr).map_or(true, |cell| cell.header().is_dead()));
        log::trace!("zone {}: swept {} unique ids", zone.id(), removed);
        removed
    }
}
