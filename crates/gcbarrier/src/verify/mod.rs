//! Verify Module - Barrier invariant checking
//!
//! A runtime-selectable validation layer. Barriers and the movable-cell
//! hasher report to a [`BarrierValidator`] at fixed points; the strict
//! validator turns every broken invariant into a panic, the no-op validator
//! compiles down to nothing.
//!
//! Checked invariants:
//! - the slot handle being mutated is the slot its address names, and a
//!   post-barrier only runs once the slot holds the new value
//! - outside incremental marking, no cell involved in a post-barrier is gray
//!   unless its zone is being prepared for collection
//! - only the owner thread mutates a zone (or hashes its cells), unless it
//!   is the thread running an active collection
//! - a hash-table key without a unique id is about to be finalized, and a
//!   lookup value has a unique id
//!
//! Violations are bugs in the caller. They are logged at error level and
//! then abort the current thread with a panic.

use crate::barrier::BarrierContext;
use crate::cell::{CellAddr, CellColor, HeapSlot, SlotAddr, Value};
use crate::config::BarrierConfig;
use crate::heap::Zone;
use std::fmt;
use std::sync::Arc;

/// Category of a broken barrier invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Slot handle and slot address disagree, or the slot lost its value
    WrongSlot,
    /// Gray cell observed outside incremental marking
    UnexpectedGray,
    /// Zone touched from a thread that does not own it
    ForeignZoneAccess,
    /// Key without unique id that is still alive
    LiveKeyWithoutId,
    /// Lookup value without unique id
    LookupWithoutId,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvariantViolation::WrongSlot => "wrong slot",
            InvariantViolation::UnexpectedGray => "unexpected gray cell",
            InvariantViolation::ForeignZoneAccess => "foreign zone access",
            InvariantViolation::LiveKeyWithoutId => "live key without unique id",
            InvariantViolation::LookupWithoutId => "lookup without unique id",
        };
        f.write_str(name)
    }
}

/// Validation hooks called by barriers and the movable-cell hasher
pub trait BarrierValidator: Send + Sync {
    /// Check if this validator enforces anything
    fn is_strict(&self) -> bool;

    /// Before a barriered store: `slot` must be the slot `addr` names
    fn precondition_for_set(&self, ctx: &BarrierContext<'_>, addr: SlotAddr, slot: &HeapSlot);

    /// On entry to a post-barrier: the slot holds `next` and the zone being
    /// written is accessible from this thread
    fn precondition_for_post_barrier(&self, ctx: &BarrierContext<'_>, slot: SlotAddr, next: Value);

    /// On exit from a post-barrier
    fn after_post_barrier(&self, ctx: &BarrierContext<'_>, slot: SlotAddr, prev: Value, next: Value);

    /// Before hashing a cell of `zone`
    fn check_hash_access(&self, ctx: &BarrierContext<'_>, zone: &Zone);

    /// A key without unique id failed to match
    fn check_unmatched_key(&self, ctx: &BarrierContext<'_>, key: CellAddr);

    /// A lookup value is about to be compared by unique id
    fn check_lookup_has_id(&self, ctx: &BarrierContext<'_>, zone: &Zone, lookup: CellAddr);
}

/// Validator selected by `config.strict_checks`
pub fn validator_for(config: &BarrierConfig) -> Box<dyn BarrierValidator> {
    if config.strict_checks {
        Box::new(StrictValidator)
    } else {
        Box::new(NoopValidator)
    }
}

/// NoopValidator - release-mode validator
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl BarrierValidator for NoopValidator {
    #[inline(always)]
    fn is_strict(&self) -> bool {
        false
    }

    #[inline(always)]
    fn precondition_for_set(&self, _: &BarrierContext<'_>, _: SlotAddr, _: &HeapSlot) {}

    #[inline(always)]
    fn precondition_for_post_barrier(&self, _: &BarrierContext<'_>, _: SlotAddr, _: Value) {}

    #[inline(always)]
    fn after_post_barrier(&self, _: &BarrierContext<'_>, _: SlotAddr, _: Value, _: Value) {}

    #[inline(always)]
    fn check_hash_access(&self, _: &BarrierContext<'_>, _: &Zone) {}

    #[inline(always)]
    fn check_unmatched_key(&self, _: &BarrierContext<'_>, _: CellAddr) {}

    #[inline(always)]
    fn check_lookup_has_id(&self, _: &BarrierContext<'_>, _: &Zone, _: CellAddr) {}
}

/// StrictValidator - panics on every broken invariant
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictValidator;

impl StrictValidator {
    fn check_zone_access(&self, ctx: &BarrierContext<'_>, zone: &Zone) {
        if ctx.current_thread_can_access_zone(zone) || ctx.current_thread_is_performing_gc() {
            return;
        }
        violation(
            InvariantViolation::ForeignZoneAccess,
            format_args!(
                "zone {} is owned by {:?}, accessed from {:?}",
                zone.id(),
                zone.owner_thread(),
                std::thread::current().id()
            ),
        );
    }
}

impl BarrierValidator for StrictValidator {
    fn is_strict(&self) -> bool {
        true
    }

    fn precondition_for_set(&self, ctx: &BarrierContext<'_>, addr: SlotAddr, slot: &HeapSlot) {
        let same = match addr {
            SlotAddr::Field { owner, index } => ctx
                .cell(owner)
                .and_then(|cell| cell.slot(index).map(|s| std::ptr::eq(s, slot)))
                .unwrap_or(false),
            SlotAddr::External(id) => ctx
                .heap()
                .root_slot(id)
                .map(|s| std::ptr::eq(Arc::as_ptr(&s), slot))
                .unwrap_or(false),
        };
        if !same {
            violation(
                InvariantViolation::WrongSlot,
                format_args!("slot handle does not live at {}", addr),
            );
        }
    }

    fn precondition_for_post_barrier(&self, ctx: &BarrierContext<'_>, slot: SlotAddr, next: Value) {
        let current = match slot {
            SlotAddr::Field { owner, index } => ctx
                .cell(owner)
                .and_then(|cell| cell.slot(index).map(HeapSlot::get)),
            SlotAddr::External(id) => ctx.heap().root_slot(id).ok().map(|s| s.get()),
        };
        if current != Some(next) {
            violation(
                InvariantViolation::WrongSlot,
                format_args!("{} holds {:?}, post-barrier saw {:?}", slot, current, next),
            );
        }

        if let Some(zone) = slot.owner().and_then(|owner| ctx.zone_of(owner)) {
            self.check_zone_access(ctx, &zone);
        }
    }

    fn after_post_barrier(&self, ctx: &BarrierContext<'_>, slot: SlotAddr, prev: Value, next: Value) {
        if ctx.is_incremental_marking() {
            return;
        }
        let involved = [slot.owner(), prev.as_cell(), next.as_cell()];
        for addr in involved.into_iter().flatten() {
            let Some(cell) = ctx.cell(addr) else {
                continue;
            };
            if cell.color() != CellColor::Gray {
                continue;
            }
            let preparing = ctx
                .zone(cell.zone())
                .map_or(false, |zone| zone.is_gc_preparing());
            if !preparing {
                violation(
                    InvariantViolation::UnexpectedGray,
                    format_args!("{} is gray in phase {}", addr, ctx.phase()),
                );
            }
        }
    }

    fn check_hash_access(&self, ctx: &BarrierContext<'_>, zone: &Zone) {
        if !zone.is_shared_read_only() {
            self.check_zone_access(ctx, zone);
        }
    }

    fn check_unmatched_key(&self, ctx: &BarrierContext<'_>, key: CellAddr) {
        let finalizing = ctx
            .cell(key)
            .map_or(true, |cell| ctx.tracer().is_about_to_be_finalized(&cell));
        if !finalizing {
            violation(
                InvariantViolation::LiveKeyWithoutId,
                format_args!("key {} has no unique id but is still alive", key),
            );
        }
    }

    fn check_lookup_has_id(&self, _ctx: &BarrierContext<'_>, zone: &Zone, lookup: CellAddr) {
        if !zone.has_unique_id(lookup) {
            violation(
                InvariantViolation::LookupWithoutId,
                format_args!("lookup {} in zone {} has no unique id", lookup, zone.id()),
            );
        }
    }
}

#[cold]
#[track_caller]
fn violation(kind: InvariantViolation, detail: fmt::Arguments<'_>) -> ! {
    log::error!("barrier invariant violated: {}: {}", kind, detail);
    panic!("barrier invariant violated: {}: {}", kind, detail);
}
