//! Compaction - Moving tenured cells
//!
//! Every tenured cell of the selected zones is copied to a fresh address.
//! Afterwards all slots and roots are forwarded with unbarriered stores, the
//! unique-id registries are rekeyed and the old addresses are released for
//! reuse. The nursery is evicted first so no store-buffer entry can name a
//! moved owner.
//!
//! Destinations are reserved before anything moves; if the address space
//! runs out, the reservations are released and no cell has moved.

use super::{CollectionSession, ForwardingTable, MinorGcReason};
use crate::barrier::HeapPhase;
use crate::cell::{Cell, CellAddr, ZoneId};
use crate::error::Result;
use crate::heap::Heap;
use crate::logging::GcEvent;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a compaction
#[derive(Debug, Clone)]
pub struct CompactionReport {
    /// Cells moved
    pub moved: usize,
    pub bytes_moved: usize,
    /// Slots and roots rewritten
    pub slots_updated: usize,
    /// Unique-id entries rekeyed
    pub ids_rekeyed: usize,
    pub duration: Duration,
}

impl Heap {
    /// Move every tenured cell of `zones` (all zones if empty)
    pub fn compact(&self, zones: &[ZoneId]) -> Result<CompactionReport> {
        let start = Instant::now();
        let session = CollectionSession::enter(self)?;
        session.require(HeapPhase::Idle)?;

        let ids: FxHashSet<ZoneId> = if zones.is_empty() {
            self.zones().iter().map(|zone| zone.id()).collect()
        } else {
            for id in zones {
                self.zone(*id)?;
            }
            zones.iter().copied().collect()
        };

        self.minor_gc_in(&session, MinorGcReason::EvictNursery)?;
        self.set_phase(HeapPhase::Compacting);

        let forwarding = ForwardingTable::new();
        let mut moves: FxHashMap<ZoneId, Vec<(CellAddr, CellAddr)>> = FxHashMap::default();
        let mut bytes_moved = 0;
        let mut slots_updated = 0;
        {
            let mut cells = self.cells.write();
            let mut space = self.space.lock();

            let mut movable: Vec<CellAddr> = cells
                .iter()
                .filter(|(addr, cell)| !addr.is_in_nursery() && ids.contains(&cell.zone()))
                .map(|(addr, _)| *addr)
                .collect();
            movable.sort_unstable();

            let sources: Vec<(CellAddr, Arc<Cell>)> = movable
                .iter()
                .filter_map(|old| cells.get(old).map(|cell| (*old, cell.clone())))
                .collect();
            let mut destinations = Vec::with_capacity(sources.len());
            for (_, cell) in &sources {
                match space.alloc_tenured_fresh(cell.size()) {
                    Ok(new) => destinations.push(new),
                    Err(err) => {
                        for (new, (_, cell)) in destinations.iter().zip(&sources) {
                            space.release_tenured(*new, cell.size());
                        }
                        return Err(err);
                    }
                }
            }

            for ((old, cell), new) in sources.iter().zip(&destinations) {
                cells.insert(*new, Arc::new(cell.relocated_copy()));
                forwarding.add_entry(*old, *new);
                moves.entry(cell.zone()).or_default().push((*old, *new));
                bytes_moved += cell.size();
            }
            for old in &movable {
                if let Some(cell) = cells.swap_remove(old) {
                    space.release_tenured(*old, cell.size());
                }
            }

            for cell in cells.values() {
                for slot in cell.slots() {
                    let value = slot.get();
                    let forwarded = forwarding.forward_value(value);
                    if forwarded != value {
                        slot.set_unbarriered(forwarded);
                        slots_updated += 1;
                    }
                }
            }
        }

        for (_, slot) in self.roots.all() {
            let value = slot.get();
            let forwarded = forwarding.forward_value(value);
            if forwarded != value {
                slot.set_unbarriered(forwarded);
                slots_updated += 1;
            }
        }

        let mut ids_rekeyed = 0;
        for (zone_id, zone_moves) in moves {
            if let Ok(zone) = self.zone(zone_id) {
                ids_rekeyed += zone.unique_ids().rekey_all(zone_moves);
            }
        }
        drop(session);

        let report = CompactionReport {
            moved: forwarding.len(),
            bytes_moved,
            slots_updated,
            ids_rekeyed,
            duration: start.elapsed(),
        };
        log::debug!(
            "compaction: moved {} cells ({} bytes), rekeyed {} ids",
            report.moved,
            report.bytes_moved,
            report.ids_rekeyed
        );
        self.logger().log(GcEvent::CompactionEnd {
            moved: report.moved,
            bytes_moved: report.bytes_moved,
            duration_ms: report.duration.as_secs_f64() * 1000.0,
        });
        Ok(report)
    }
}
