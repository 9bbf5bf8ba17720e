//! Zones - Independently collectable heap partitions
//!
//! A zone owns its store buffer and its unique-id registry, and carries the
//! per-zone collector flags the barriers consult. Regular zones belong to a
//! single mutator thread; the shared read-only zone serves identity lookups
//! from any thread.

use super::store_buffer::StoreBuffer;
use crate::cell::{CellAddr, ZoneId};
use crate::error::Result;
use crate::identity::registry::{HashNumber, UniqueIdRegistry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Kind of zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    /// Owned by one mutator thread
    Regular,
    /// Immutable data shared by every thread
    SharedReadOnly,
}

/// Zone - a heap partition
pub struct Zone {
    id: ZoneId,
    kind: ZoneKind,

    /// Thread allowed to mutate this zone; `None` means any thread
    owner: Mutex<Option<ThreadId>>,

    /// Recorded tenured→nursery edges
    store_buffer: Mutex<StoreBuffer>,

    /// Stable ids of this zone's cells
    unique_ids: UniqueIdRegistry,

    /// Zone is being marked incrementally
    needs_incremental_barrier: AtomicBool,

    /// Zone is being prepared for a collection
    gc_preparing: AtomicBool,
}

impl Zone {
    pub(crate) fn new(
        id: ZoneId,
        kind: ZoneKind,
        store_buffer_capacity: usize,
        next_unique_id: Arc<AtomicU64>,
        max_unique_ids: Option<usize>,
    ) -> Self {
        let owner = match kind {
            ZoneKind::Regular => Some(thread::current().id()),
            ZoneKind::SharedReadOnly => None,
        };
        Self {
            id,
            kind,
            owner: Mutex::new(owner),
            store_buffer: Mutex::new(StoreBuffer::new(store_buffer_capacity)),
            unique_ids: UniqueIdRegistry::new(id, next_unique_id, max_unique_ids),
            needs_incremental_barrier: AtomicBool::new(false),
            gc_preparing: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> ZoneId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    #[inline]
    pub fn is_shared_read_only(&self) -> bool {
        self.kind == ZoneKind::SharedReadOnly
    }

    // === Ownership ===

    pub fn owner_thread(&self) -> Option<ThreadId> {
        *self.owner.lock()
    }

    /// Hand the zone to another thread (or to every thread with `None`)
    pub fn set_owner_thread(&self, owner: Option<ThreadId>) {
        *self.owner.lock() = owner;
    }

    /// Check if `thread` may mutate this zone
    pub fn is_accessible_from(&self, thread: ThreadId) -> bool {
        self.owner.lock().map_or(true, |owner| owner == thread)
    }

    // === Collector flags ===

    #[inline]
    pub fn needs_incremental_barrier(&self) -> bool {
        self.needs_incremental_barrier.load(Ordering::Acquire)
    }

    pub fn set_needs_incremental_barrier(&self, value: bool) {
        self.needs_incremental_barrier.store(value, Ordering::Release);
    }

    #[inline]
    pub fn is_gc_preparing(&self) -> bool {
        self.gc_preparing.load(Ordering::Acquire)
    }

    pub fn set_gc_preparing(&self, value: bool) {
        self.gc_preparing.store(value, Ordering::Release);
    }

    // === Owned structures ===

    pub fn store_buffer(&self) -> &Mutex<StoreBuffer> {
        &self.store_buffer
    }

    pub fn unique_ids(&self) -> &UniqueIdRegistry {
        &self.unique_ids
    }

    pub fn has_unique_id(&self, addr: CellAddr) -> bool {
        self.unique_ids.has_unique_id(addr)
    }

    pub fn maybe_get_unique_id(&self, addr: CellAddr) -> Option<u64> {
        self.unique_ids.maybe_get_unique_id(addr)
    }

    pub fn get_or_create_unique_id(&self, addr: CellAddr) -> Result<u64> {
        self.unique_ids.get_or_create_unique_id(addr)
    }

    pub fn get_unique_id_infallible(&self, addr: CellAddr) -> u64 {
        self.unique_ids.get_unique_id_infallible(addr)
    }

    pub fn maybe_get_hash_code(&self, addr: CellAddr) -> Option<HashNumber> {
        self.unique_ids.maybe_get_hash_code(addr)
    }

    pub fn get_or_create_hash_code(&self, addr: CellAddr) -> Result<HashNumber> {
        self.unique_ids.get_or_create_hash_code(addr)
    }

    pub fn get_hash_code_infallible(&self, addr: CellAddr) -> HashNumber {
        self.unique_ids.get_hash_code_infallible(addr)
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("needs_incremental_barrier", &self.needs_incremental_barrier())
            .field("gc_preparing", &self.is_gc_preparing())
            .finish()
    }
}
