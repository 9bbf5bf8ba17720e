//! Heap Module - Simulated generational heap
//!
//! Owns everything the barriers and the reference collector operate on:
//!
//! ```text
//! ┌──────────────────────────── Heap ────────────────────────────┐
//! │  AddressSpace      nursery bump range + tenured free lists   │
//! │  cell table        CellAddr → Arc<Cell>                      │
//! │  zones             store buffer, unique-id registry, flags   │
//! │  roots             strong / weak external slots              │
//! │  marker            gray queue (the default Tracer)           │
//! │  validator         strict or no-op invariant checks          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutator entry points (`write_field`, `set_root`) run the barrier pair and
//! then pass a safepoint, where a pending eager minor collection requested by
//! a full store buffer is serviced.
//!
//! Lock order: safepoint → cell table → address space → zone registry.

pub mod address_space;
pub mod roots;
pub mod safepoint;
pub mod store_buffer;
pub mod zone;

pub use address_space::AddressSpace;
pub use roots::{RootKind, RootTable};
pub use safepoint::{MutatorScope, Safepoint};
pub use store_buffer::{PutOutcome, StoreBuffer, StoreBufferEntry};
pub use zone::{Zone, ZoneKind};

use crate::barrier::{AtomicBarrierStats, BarrierContext, BarrierStats, HeapPhase};
use crate::cell::{cell_size, Cell, CellAddr, CellColor, CellKind, HeapSlot, RootId, SlotAddr, Value, ZoneId};
use crate::collector::{Marker, MinorCollectionReport, MinorGcReason};
use crate::config::BarrierConfig;
use crate::error::{BarrierError, Result};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig};
use crate::verify::{self, BarrierValidator};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Heap - cells, zones and roots of one runtime
///
/// `Heap` is `Send + Sync`; share it between mutator threads with `Arc`.
pub struct Heap {
    config: BarrierConfig,

    /// Current [`HeapPhase`]
    phase: AtomicU8,

    /// Address allocation
    pub(crate) space: Mutex<AddressSpace>,

    /// Live cells by current address
    pub(crate) cells: RwLock<IndexMap<CellAddr, Arc<Cell>>>,

    /// Zones indexed by id
    zones: RwLock<Vec<Arc<Zone>>>,

    /// External slots
    pub(crate) roots: RootTable,

    /// Gray queue and default tracer
    marker: Marker,

    /// Invariant checks
    validator: Box<dyn BarrierValidator>,

    /// Barrier counters
    stats: AtomicBarrierStats,

    /// Collector event log
    logger: GcLogger,

    /// Heap-wide unique id source
    next_unique_id: Arc<AtomicU64>,

    /// Pending eager minor collection
    minor_gc_request: Mutex<Option<MinorGcReason>>,

    /// Mutator scopes vs collections
    safepoint: Safepoint,

    /// Thread inside a collection session
    collecting_thread: Mutex<Option<ThreadId>>,

    /// Zones in the current major collection
    pub(crate) collecting_zones: Mutex<Vec<ZoneId>>,

    /// Zones whose registries still need sweeping
    pub(crate) sweep_queue: Mutex<Vec<ZoneId>>,

    pub(crate) minor_count: AtomicU64,
    pub(crate) major_count: AtomicU64,
}

impl Heap {
    /// Create a heap
    ///
    /// # Errors
    /// Returns `Configuration` if `config` does not validate.
    pub fn new(config: BarrierConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BarrierError::Configuration(e.to_string()))?;

        let logger = GcLogger::new(GcLoggerConfig {
            console: config.verbose,
            json: config.json_events,
            ..Default::default()
        });

        log::debug!(
            "heap created: nursery {} bytes, store buffer capacity {}, strict {}",
            config.nursery_size,
            config.store_buffer_capacity,
            config.strict_checks
        );

        Ok(Self {
            phase: AtomicU8::new(HeapPhase::Idle as u8),
            space: Mutex::new(AddressSpace::new(config.nursery_size)),
            cells: RwLock::new(IndexMap::new()),
            zones: RwLock::new(Vec::new()),
            roots: RootTable::new(),
            marker: Marker::new(),
            validator: verify::validator_for(&config),
            stats: AtomicBarrierStats::new(),
            logger,
            next_unique_id: Arc::new(AtomicU64::new(1)),
            minor_gc_request: Mutex::new(None),
            safepoint: Safepoint::new(),
            collecting_thread: Mutex::new(None),
            collecting_zones: Mutex::new(Vec::new()),
            sweep_queue: Mutex::new(Vec::new()),
            minor_count: AtomicU64::new(0),
            major_count: AtomicU64::new(0),
            config,
        })
    }

    /// Create a heap with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(BarrierConfig::default())
    }

    // === State ===

    pub fn config(&self) -> &BarrierConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> HeapPhase {
        HeapPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: HeapPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn safepoint(&self) -> &Safepoint {
        &self.safepoint
    }

    /// Keep collections out until the returned scope is dropped
    ///
    /// Wrap any sequence that reads a cell address and uses it later (read a
    /// root, then store it into a field) so no collection can move or free
    /// the cell in between. Collections started from inside a scope on the
    /// same thread fail with `InvalidPhase`.
    pub fn mutator_scope(&self) -> MutatorScope<'_> {
        if self.collecting_thread() == Some(thread::current().id()) {
            return self.safepoint.bypass();
        }
        self.safepoint.enter_mutator()
    }

    /// Thread currently running a collection, if any
    pub fn collecting_thread(&self) -> Option<ThreadId> {
        *self.collecting_thread.lock()
    }

    pub(crate) fn set_collecting_thread(&self, thread: Option<ThreadId>) -> Option<ThreadId> {
        std::mem::replace(&mut *self.collecting_thread.lock(), thread)
    }

    /// Context for running barriers against this heap
    pub fn barrier_context(&self) -> BarrierContext<'_> {
        BarrierContext::new(self)
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn validator(&self) -> &dyn BarrierValidator {
        self.validator.as_ref()
    }

    pub fn barrier_stats(&self) -> &AtomicBarrierStats {
        &self.stats
    }

    /// Snapshot of the barrier counters
    pub fn stats(&self) -> BarrierStats {
        self.stats.snapshot()
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn minor_gc_count(&self) -> u64 {
        self.minor_count.load(Ordering::Relaxed)
    }

    pub fn major_gc_count(&self) -> u64 {
        self.major_count.load(Ordering::Relaxed)
    }

    pub fn nursery_used(&self) -> usize {
        self.space.lock().nursery_used()
    }

    // === Zones ===

    /// Create a zone; regular zones are owned by the calling thread
    pub fn new_zone(&self, kind: ZoneKind) -> ZoneId {
        let mut zones = self.zones.write();
        let id = ZoneId(zones.len() as u32);
        zones.push(Arc::new(Zone::new(
            id,
            kind,
            self.config.store_buffer_capacity,
            self.next_unique_id.clone(),
            self.config.max_unique_ids,
        )));
        log::debug!("zone {} created ({:?})", id, kind);
        id
    }

    pub fn zone(&self, id: ZoneId) -> Result<Arc<Zone>> {
        self.zones
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or(BarrierError::UnknownZone(id))
    }

    pub fn zones(&self) -> Vec<Arc<Zone>> {
        self.zones.read().clone()
    }

    // === Cells ===

    /// Allocate a cell in the nursery
    ///
    /// A full nursery triggers a minor collection and the allocation is
    /// retried once. Inside a [`MutatorScope`] that collection cannot run and
    /// the allocation fails with `InvalidPhase`.
    pub fn allocate(&self, zone: ZoneId, kind: CellKind, slot_count: usize) -> Result<CellAddr> {
        self.zone(zone)?;
        let size = cell_size(slot_count);
        let capacity = self.space.lock().nursery_capacity();
        if size > capacity {
            return Err(BarrierError::NurseryExhausted { size, capacity });
        }

        for attempt in 0..2 {
            {
                let _scope = self.mutator_scope();
                let addr = self.space.lock().alloc_nursery(size);
                if let Some(addr) = addr {
                    self.cells
                        .write()
                        .insert(addr, Arc::new(Cell::new(kind, zone, slot_count)));
                    return Ok(addr);
                }
            }
            if attempt == 0 {
                self.minor_gc(MinorGcReason::OutOfNursery)?;
            }
        }
        Err(BarrierError::NurseryExhausted { size, capacity })
    }

    /// Allocate a cell directly in the tenured generation
    ///
    /// Cells allocated while their zone is being marked start black.
    pub fn allocate_tenured(
        &self,
        zone: ZoneId,
        kind: CellKind,
        slot_count: usize,
    ) -> Result<CellAddr> {
        let zone_ref = self.zone(zone)?;
        let _scope = self.mutator_scope();
        let addr = self.space.lock().alloc_tenured(cell_size(slot_count))?;
        let cell = Cell::new(kind, zone, slot_count);
        if zone_ref.needs_incremental_barrier() {
            cell.header().set_color(CellColor::Black);
        }
        self.cells.write().insert(addr, Arc::new(cell));
        Ok(addr)
    }

    #[inline]
    pub fn cell(&self, addr: CellAddr) -> Option<Arc<Cell>> {
        self.cells.read().get(&addr).cloned()
    }

    pub fn contains_cell(&self, addr: CellAddr) -> bool {
        self.cells.read().contains_key(&addr)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.read().len()
    }

    /// Addresses of every cell, in allocation order
    pub fn cell_addresses(&self) -> Vec<CellAddr> {
        self.cells.read().keys().copied().collect()
    }

    fn checked_slot(&self, owner: CellAddr, index: u32) -> Result<(Arc<Cell>, SlotAddr)> {
        let cell = self
            .cell(owner)
            .ok_or(BarrierError::InvalidCell { address: owner })?;
        if cell.slot(index).is_none() {
            return Err(BarrierError::InvalidSlot {
                owner,
                index,
                length: cell.slot_count(),
            });
        }
        Ok((cell, SlotAddr::field(owner, index)))
    }

    pub fn read_field(&self, owner: CellAddr, index: u32) -> Result<Value> {
        let (cell, _) = self.checked_slot(owner, index)?;
        cell.slot(index)
            .map(HeapSlot::get)
            .ok_or(BarrierError::Internal("slot vanished".into()))
    }

    /// Barriered store into a cell field, followed by a safepoint
    pub fn write_field(&self, owner: CellAddr, index: u32, value: Value) -> Result<()> {
        {
            let _scope = self.mutator_scope();
            let (cell, addr) = self.checked_slot(owner, index)?;
            if let Some(slot) = cell.slot(index) {
                slot.set(&self.barrier_context(), addr, value);
            }
        }
        self.check_safepoint()?;
        Ok(())
    }

    // === External slots ===

    /// Register a strong external slot
    pub fn new_root(&self) -> RootId {
        self.roots.add(RootKind::Strong)
    }

    /// Register a weak external slot
    pub fn new_weak_root(&self) -> RootId {
        self.roots.add(RootKind::Weak)
    }

    pub fn root_slot(&self, id: RootId) -> Result<Arc<HeapSlot>> {
        self.roots.get(id)
    }

    pub fn root(&self, id: RootId) -> Result<Value> {
        Ok(self.roots.get(id)?.get())
    }

    /// Barriered store into an external slot, followed by a safepoint
    pub fn set_root(&self, id: RootId, value: Value) -> Result<()> {
        let slot = self.roots.get(id)?;
        slot.set(&self.barrier_context(), SlotAddr::External(id), value);
        self.check_safepoint()?;
        Ok(())
    }

    /// Clear and unregister an external slot
    ///
    /// Clearing runs the barriers; storing `undefined` never records an edge,
    /// so no safepoint is needed.
    pub fn release_root(&self, id: RootId) -> Result<()> {
        let slot = self.roots.get(id)?;
        slot.set(&self.barrier_context(), SlotAddr::External(id), Value::Undefined);
        self.roots.remove(id)
    }

    // === Safepoints ===

    /// Ask for an eager minor collection at the next safepoint
    pub(crate) fn request_minor_gc(&self, zone: ZoneId, reason: MinorGcReason) {
        let mut request = self.minor_gc_request.lock();
        if request.is_none() {
            *request = Some(reason);
            drop(request);
            let entries = self
                .zone(zone)
                .map(|z| z.store_buffer().lock().len())
                .unwrap_or(0);
            log::debug!("zone {}: minor GC requested ({})", zone, reason);
            self.logger.log(GcEvent::StoreBufferOverflow {
                zone: zone.0,
                entries,
            });
        }
    }

    /// Minor collection requested but not yet run
    pub fn pending_minor_gc(&self) -> Option<MinorGcReason> {
        *self.minor_gc_request.lock()
    }

    pub(crate) fn clear_minor_gc_request(&self) {
        self.minor_gc_request.lock().take();
    }

    /// Service a pending minor collection request
    ///
    /// Inside a [`MutatorScope`] the request stays pending.
    pub fn check_safepoint(&self) -> Result<Option<MinorCollectionReport>> {
        let Some(reason) = self.pending_minor_gc() else {
            return Ok(None);
        };
        if self.phase().is_collecting() || self.safepoint.in_mutator_scope() {
            return Ok(None);
        }
        self.minor_gc(reason).map(Some)
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("phase", &self.phase())
            .field("cells", &self.cell_count())
            .field("zones", &self.zones.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_heap() -> Heap {
        Heap::new(BarrierConfig {
            nursery_size: 4096,
            strict_checks: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Heap::new(BarrierConfig {
            store_buffer_capacity: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(BarrierError::Configuration(_))));
    }

    #[test]
    fn test_allocate_in_nursery_and_tenured() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);

        let young = heap.allocate(zone, CellKind::Object, 2).unwrap();
        let old = heap.allocate_tenured(zone, CellKind::String, 0).unwrap();

        assert!(young.is_in_nursery());
        assert!(!old.is_in_nursery());
        assert_eq!(heap.cell(old).unwrap().kind(), CellKind::String);
        assert_eq!(heap.cell_count(), 2);
    }

    #[test]
    fn test_unknown_zone() {
        let heap = create_test_heap();
        let err = heap.allocate(ZoneId(9), CellKind::Object, 0).unwrap_err();
        assert!(matches!(err, BarrierError::UnknownZone(ZoneId(9))));
    }

    #[test]
    fn test_oversized_cell_rejected() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let err = heap.allocate(zone, CellKind::Object, 1024).unwrap_err();
        assert!(matches!(err, BarrierError::NurseryExhausted { .. }));
    }

    #[test]
    fn test_field_bounds_checked() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);
        let obj = heap.allocate_tenured(zone, CellKind::Object, 1).unwrap();

        heap.write_field(obj, 0, Value::Int32(5)).unwrap();
        assert_eq!(heap.read_field(obj, 0).unwrap(), Value::Int32(5));

        let err = heap.write_field(obj, 1, Value::Null).unwrap_err();
        assert!(matches!(err, BarrierError::InvalidSlot { length: 1, .. }));
    }

    #[test]
    fn test_roots_round_trip() {
        let heap = create_test_heap();
        let id = heap.new_root();
        heap.set_root(id, Value::Boolean(true)).unwrap();
        assert_eq!(heap.root(id).unwrap(), Value::Boolean(true));

        heap.release_root(id).unwrap();
        assert!(matches!(heap.root(id), Err(BarrierError::UnknownRoot(_))));
    }

    #[test]
    fn test_full_nursery_triggers_minor_gc() {
        let heap = create_test_heap();
        let zone = heap.new_zone(ZoneKind::Regular);

        // 4096-byte nursery, 32-byte cells
        for _ in 0..200 {
            heap.allocate(zone, CellKind::Object, 2).unwrap();
        }
        assert!(heap.minor_gc_count() >= 1);
    }

    #[test]
    fn test_heap_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Heap>();
    }
}
