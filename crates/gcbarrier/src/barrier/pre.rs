//! Pre-Write Barrier - Snapshot-at-the-beginning marking
//!
//! Runs on the value a slot held *before* the store. While a zone is being
//! marked incrementally, overwriting the last reference to a white cell
//! could hide it from the marker; graying the old value keeps it in the
//! snapshot the marker is tracing.
//!
//! ```text
//! slot: A ──► X (white)        slot.set(B)
//!                              └─ pre_barrier(X): X white → gray, queued
//! ```

use super::BarrierContext;
use crate::cell::Value;

/// Pre-write barrier
///
/// No-op unless incremental marking is in progress. Nursery cells and cells
/// of zones that are not being marked are skipped.
#[inline]
pub fn pre_barrier(ctx: &BarrierContext<'_>, prev: Value) {
    let stats = ctx.stats();
    stats.record_pre_invocation();

    // Fast path: a single phase check
    if !ctx.is_incremental_marking() {
        stats.record_pre_fast_path();
        return;
    }

    let Some(addr) = prev.as_cell() else {
        return;
    };
    // The nursery was evicted when marking started and is never marked
    if addr.is_in_nursery() {
        return;
    }

    pre_barrier_slow(ctx, addr);
}

#[cold]
fn pre_barrier_slow(ctx: &BarrierContext<'_>, addr: crate::cell::CellAddr) {
    let Some(cell) = ctx.cell(addr) else {
        log::warn!("pre-barrier: old value {} is not a live cell", addr);
        return;
    };
    let needs_barrier = ctx
        .zone(cell.zone())
        .map_or(false, |zone| zone.needs_incremental_barrier());
    if !needs_barrier {
        return;
    }

    if cell.header().is_white() {
        ctx.tracer().mark_gray(addr, &cell);
        ctx.stats().record_shade();
        log::trace!("pre-barrier shaded {}", addr);
    }
}
