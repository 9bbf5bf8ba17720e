//! Movable-Cell Hasher - Hash policy for relocatable keys
//!
//! A cell's address is useless as a hash input once a compacting collector
//! can move it. The hasher hashes the cell's unique id instead, and compares
//! keys by zone plus unique id.
//!
//! ```text
//! maybe_get_hash   lookup only, never allocates     Option<HashNumber>
//! ensure_hash      assigns an id on demand           Result<HashNumber>
//! hash             id must be obtainable             HashNumber (panics)
//! matches          null == null, else zone and id    bool
//! ```
//!
//! A null pointer hashes to 0 and only matches another null.
//!
//! Stored keys must be held weakly (see [`CellHashMap`](super::CellHashMap)).
//! Once a dead cell is freed its address can be handed to a new cell, and a
//! raw key left behind is then indistinguishable from that new cell.

use super::registry::HashNumber;
use crate::barrier::BarrierContext;
use crate::cell::CellRef;
use crate::error::{BarrierError, Result};
use crate::logging::GcEvent;
use std::marker::PhantomData;

/// MovableCellHasher - hash policy over nullable typed cell pointers
pub struct MovableCellHasher<T>(PhantomData<fn() -> T>);

impl<T: CellRef> MovableCellHasher<T> {
    /// Hash of `lookup` if it already has a unique id
    pub fn maybe_get_hash(ctx: &BarrierContext<'_>, lookup: Option<T>) -> Option<HashNumber> {
        let Some(cell) = lookup else {
            return Some(0);
        };
        ctx.zone_of(cell.addr())?.maybe_get_hash_code(cell.addr())
    }

    /// Hash of `lookup`, assigning a unique id if needed
    ///
    /// # Errors
    /// `OutOfMemory` if the zone registry cannot grow; nothing is cached.
    /// `InvalidCell` if `lookup` does not name a live cell.
    pub fn ensure_hash(ctx: &BarrierContext<'_>, lookup: Option<T>) -> Result<HashNumber> {
        let Some(cell) = lookup else {
            return Ok(0);
        };
        let _scope = ctx.heap().mutator_scope();
        let addr = cell.addr();
        let zone = ctx
            .zone_of(addr)
            .ok_or(BarrierError::InvalidCell { address: addr })?;

        zone.get_or_create_hash_code(addr).map_err(|err| {
            if let BarrierError::OutOfMemory { zone, requested } = &err {
                ctx.heap().logger().log(GcEvent::UniqueIdExhausted {
                    zone: zone.0,
                    entries: requested - 1,
                });
            }
            err
        })
    }

    /// Hash of `lookup`
    ///
    /// # Panics
    /// - `lookup` does not name a live cell (never allocated, or already
    ///   freed by the sweeper).
    /// - No unique id can be obtained because the zone registry is
    ///   exhausted. Callers must have made sure the hash exists, typically
    ///   with [`Self::ensure_hash`].
    pub fn hash(ctx: &BarrierContext<'_>, lookup: Option<T>) -> HashNumber {
        let Some(cell) = lookup else {
            return 0;
        };
        let _scope = ctx.heap().mutator_scope();
        let addr = cell.addr();
        let Some(zone) = ctx.zone_of(addr) else {
            panic!("hash of {} which is not a live cell", addr);
        };
        ctx.validator().check_hash_access(ctx, &zone);
        zone.get_hash_code_infallible(addr)
    }

    /// Check if the stored `key` and `lookup` denote the same cell
    ///
    /// A key whose cell is dead never matches, whether sweeping has dropped
    /// its unique id yet or not. `key` must come from a weakly held slot: a
    /// raw key that outlives its cell may alias a newer cell at the same
    /// address.
    pub fn matches(ctx: &BarrierContext<'_>, key: Option<T>, lookup: Option<T>) -> bool {
        let (key, lookup) = match (key, lookup) {
            (None, lookup) => return lookup.is_none(),
            (Some(_), None) => return false,
            (Some(key), Some(lookup)) => (key.addr(), lookup.addr()),
        };

        let Some(zone) = ctx.zone_of(lookup) else {
            return false;
        };
        ctx.validator().check_hash_access(ctx, &zone);

        let key_cell = ctx.cell(key);
        if key_cell.as_ref().map_or(false, |cell| cell.header().is_dead()) {
            return false;
        }
        let same_zone = key_cell.map(|cell| cell.zone());
        if same_zone.is_some() && same_zone != Some(zone.id()) {
            return false;
        }

        let Some(key_id) = zone.maybe_get_unique_id(key) else {
            // Dead key: sweeping already dropped its id
            ctx.validator().check_unmatched_key(ctx, key);
            return false;
        };
        ctx.validator().check_lookup_has_id(ctx, &zone, lookup);
        zone.maybe_get_unique_id(lookup) == Some(key_id)
    }
}
