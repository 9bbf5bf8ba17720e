//! Unique-Identity Registry - Stable ids for movable cells
//!
//! Each zone owns one registry mapping a cell's *current* address to a
//! 64-bit id. The id is assigned lazily on first request and survives every
//! relocation because the collector rekeys the entry whenever it moves the
//! cell. Entries of dead cells are dropped lazily by sweeping.
//!
//! Ids come from a counter shared by every zone of a heap. The counter starts
//! at 1 and only ever increases, so 0 is never handed out and an id is never
//! reused, even when a freed address is reused by a new cell.
//!
//! The registry lock is the one structure mutator threads may contend on: two
//! workers assigning an id to the same shared cell serialize here and agree
//! on a single id.

use crate::cell::{CellAddr, ZoneId};
use crate::error::{BarrierError, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hash code type used by hash-based containers
pub type HashNumber = u32;

/// Fold a unique id into a hash code
///
/// The high and low 32-bit halves are XORed so that ids differing in either
/// half hash differently.
#[inline]
pub fn unique_id_to_hash(uid: u64) -> HashNumber {
    ((uid >> 32) as u32) ^ (uid as u32)
}

/// UniqueIdRegistry - per-zone address → id table
pub struct UniqueIdRegistry {
    /// Owning zone
    zone: ZoneId,

    /// Current address → unique id
    ids: Mutex<IndexMap<CellAddr, u64>>,

    /// Heap-wide id source
    next_id: Arc<AtomicU64>,

    /// Optional entry budget
    limit: Option<usize>,
}

impl UniqueIdRegistry {
    /// Create a registry drawing ids from `next_id`
    pub fn new(zone: ZoneId, next_id: Arc<AtomicU64>, limit: Option<usize>) -> Self {
        Self {
            zone,
            ids: Mutex::new(IndexMap::new()),
            next_id,
            limit,
        }
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    // === Unique ids ===

    pub fn has_unique_id(&self, addr: CellAddr) -> bool {
        self.ids.lock().contains_key(&addr)
    }

    /// Id of `addr`, never assigning one
    pub fn maybe_get_unique_id(&self, addr: CellAddr) -> Option<u64> {
        self.ids.lock().get(&addr).copied()
    }

    /// Id of `addr`, assigning a fresh one if needed
    ///
    /// Returns `OutOfMemory` if storage for a new entry cannot be reserved;
    /// nothing is recorded in that case.
    pub fn get_or_create_unique_id(&self, addr: CellAddr) -> Result<u64> {
        let mut ids = self.ids.lock();
        if let Some(&uid) = ids.get(&addr) {
            return Ok(uid);
        }

        let requested = ids.len() + 1;
        if self.limit.map_or(false, |limit| requested > limit) {
            return Err(self.out_of_memory(requested));
        }
        ids.try_reserve(1)
            .map_err(|_| self.out_of_memory(requested))?;

        let uid = self.next_id.fetch_add(1, Ordering::Relaxed);
        ids.insert(addr, uid);
        log::trace!("zone {}: assigned unique id {} to {}", self.zone, uid, addr);
        Ok(uid)
    }

    /// Id of `addr`, assigning one if needed
    ///
    /// # Panics
    ///
    /// Panics if the registry cannot grow. Callers use this where running
    /// out of memory is not a recoverable condition.
    pub fn get_unique_id_infallible(&self, addr: CellAddr) -> u64 {
        match self.get_or_create_unique_id(addr) {
            Ok(uid) => uid,
            Err(err) => panic!("failed to assign unique id to {}: {}", addr, err),
        }
    }

    // === Hash codes ===

    pub fn maybe_get_hash_code(&self, addr: CellAddr) -> Option<HashNumber> {
        self.maybe_get_unique_id(addr).map(unique_id_to_hash)
    }

    pub fn get_or_create_hash_code(&self, addr: CellAddr) -> Result<HashNumber> {
        self.get_or_create_unique_id(addr).map(unique_id_to_hash)
    }

    pub fn get_hash_code_infallible(&self, addr: CellAddr) -> HashNumber {
        unique_id_to_hash(self.get_unique_id_infallible(addr))
    }

    // === Collector operations ===

    /// Move the entry of a relocated cell to its new address
    ///
    /// Returns false if the cell had no id.
    pub fn rekey(&self, old: CellAddr, new: CellAddr) -> bool {
        let mut ids = self.ids.lock();
        match ids.swap_remove(&old) {
            Some(uid) => {
                ids.insert(new, uid);
                true
            }
            None => false,
        }
    }

    /// Rekey many entries under one lock acquisition
    pub fn rekey_all<I>(&self, moves: I) -> usize
    where
        I: IntoIterator<Item = (CellAddr, CellAddr)>,
    {
        let mut ids = self.ids.lock();
        let mut moved = Vec::new();
        for (old, new) in moves {
            if let Some(uid) = ids.swap_remove(&old) {
                moved.push((new, uid));
            }
        }
        // Insert after removing so a destination that was also a source is
        // never clobbered.
        let count = moved.len();
        ids.extend(moved);
        count
    }

    /// Forget the id of a cell that is being freed
    pub fn remove(&self, addr: CellAddr) -> Option<u64> {
        self.ids.lock().swap_remove(&addr)
    }

    /// Drop every entry whose cell `is_dead` reports as unreachable
    ///
    /// Returns the number of removed entries.
    pub fn sweep<F>(&self, mut is_dead: F) -> usize
    where
        F: FnMut(CellAddr) -> bool,
    {
        let mut ids = self.ids.lock();
        let before = ids.len();
        ids.retain(|addr, _| !is_dead(*addr));
        before - ids.len()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    fn out_of_memory(&self, requested: usize) -> BarrierError {
        log::warn!(
            "zone {}: unique-id registry exhausted at {} entries",
            self.zone,
            requested - 1
        );
        BarrierError::OutOfMemory {
            zone: self.zone,
            requested,
        }
    }
}
