//! Post-Write Barrier - Generational edge tracking
//!
//! Runs after a slot has been updated. Its job is the generational
//! invariant: every slot outside the nursery that holds a nursery cell is in
//! a store buffer, so a minor collection can find every such edge without
//! scanning the tenured heap.
//!
//! Decision table:
//! ```text
//! new value                 owner           action
//! ───────────────────────── ─────────────── ───────────────────────────────
//! non-cell / tenured cell   any             none
//! nursery cell              nursery cell    none (scanned with the nursery)
//! nursery cell              tenured cell    record in owner's zone buffer
//! nursery cell              external slot   record in value's zone buffer
//! ```
//!
//! While marking, the barrier also shades a white tenured value stored into
//! a black owner, so no black cell ever points directly at a white one.
//!
//! Reaching the store buffer capacity keeps the entry and requests an eager
//! minor collection; the heap services it at the next safepoint.

use super::BarrierContext;
use crate::cell::{Generation, SlotAddr, Value};
use crate::collector::MinorGcReason;
use crate::heap::{PutOutcome, StoreBufferEntry};

/// Post-write barrier
///
/// `slot` must already hold `next`.
pub fn post_barrier(ctx: &BarrierContext<'_>, slot: SlotAddr, prev: Value, next: Value) {
    let stats = ctx.stats();
    stats.record_post_invocation();

    let validator = ctx.validator();
    validator.precondition_for_post_barrier(ctx, slot, next);

    if ctx.is_incremental_marking() {
        shade_on_insert(ctx, slot, next);
    }

    if !record_edge(ctx, slot, next) {
        stats.record_post_fast_path();
    }

    validator.after_post_barrier(ctx, slot, prev, next);
}

/// Shade `next` if it is a white tenured cell stored into a black owner
fn shade_on_insert(ctx: &BarrierContext<'_>, slot: SlotAddr, next: Value) {
    let (Some(owner), Some(target)) = (slot.owner(), next.as_cell()) else {
        return;
    };
    if target.is_in_nursery() {
        return;
    }

    let tracer = ctx.tracer();
    let owner_is_black = ctx
        .cell(owner)
        .map_or(false, |cell| tracer.is_marked_black(&cell));
    if !owner_is_black {
        return;
    }

    let Some(cell) = ctx.cell(target) else {
        return;
    };
    let marking_zone = ctx
        .zone(cell.zone())
        .map_or(false, |zone| zone.needs_incremental_barrier());
    if marking_zone && cell.header().is_white() {
        tracer.mark_gray(target, &cell);
        ctx.stats().record_insertion_shade();
        log::trace!("post-barrier shaded {} stored into black {}", target, owner);
    }
}

/// Record a tenured→nursery edge; returns false if nothing needed recording
fn record_edge(ctx: &BarrierContext<'_>, slot: SlotAddr, next: Value) -> bool {
    let Some(target) = next.as_cell() else {
        return false;
    };
    if !target.is_in_nursery() {
        return false;
    }

    let zone_source = match slot {
        SlotAddr::Field { owner, .. } => {
            if owner.is_in_nursery() {
                return false;
            }
            owner
        }
        SlotAddr::External(_) => target,
    };
    let Some(zone) = ctx.zone_of(zone_source) else {
        log::warn!("post-barrier: {} does not name a live cell", zone_source);
        return false;
    };

    let entry = StoreBufferEntry {
        slot,
        owner_generation: Generation::Tenured,
    };
    let outcome = zone.store_buffer().lock().put(entry);

    let stats = ctx.stats();
    match outcome {
        PutOutcome::Inserted => stats.record_store_buffer_insert(),
        PutOutcome::Duplicate => stats.record_store_buffer_duplicate(),
        PutOutcome::Overflowed => {
            stats.record_store_buffer_insert();
            stats.record_store_buffer_overflow();
            ctx.heap()
                .request_minor_gc(zone.id(), MinorGcReason::FullStoreBuffer);
        }
    }
    true
}
