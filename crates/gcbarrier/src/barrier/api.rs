//! Embedder entry points
//!
//! For code that stores into a slot by itself and then reports the store.
//! Each function must be called *after* the slot already holds `next`.
//! The per-kind wrappers only fix the pointer type; they all funnel into
//! the same two barriers.

use super::{post_barrier, pre_barrier, BarrierContext};
use crate::cell::{BigIntRef, GcThing, ObjectRef, ScriptRef, SlotAddr, StringRef, Value};

/// Pre-write barrier on a typed old value
#[inline]
pub fn pre_write_barrier<T: GcThing>(ctx: &BarrierContext<'_>, prev: T) {
    pre_barrier(ctx, prev.into_value());
}

/// Post-write barrier on typed old/new values
#[inline]
pub fn post_write_barrier<T: GcThing>(ctx: &BarrierContext<'_>, slot: SlotAddr, prev: T, next: T) {
    post_barrier(ctx, slot, prev.into_value(), next.into_value());
}

/// Pre- and post-write barriers for a completed store
#[inline]
pub fn write_barriers<T: GcThing>(ctx: &BarrierContext<'_>, slot: SlotAddr, prev: T, next: T) {
    let prev = prev.into_value();
    pre_barrier(ctx, prev);
    post_barrier(ctx, slot, prev, next.into_value());
}

macro_rules! typed_barriers {
    ($($ty:ty => $post:ident, $both:ident;)*) => {
        $(
            #[inline]
            pub fn $post(ctx: &BarrierContext<'_>, slot: SlotAddr, prev: $ty, next: $ty) {
                post_write_barrier(ctx, slot, prev, next);
            }

            #[inline]
            pub fn $both(ctx: &BarrierContext<'_>, slot: SlotAddr, prev: $ty, next: $ty) {
                write_barriers(ctx, slot, prev, next);
            }
        )*
    };
}

typed_barriers! {
    Option<ObjectRef> => heap_object_post_write_barrier, heap_object_write_barriers;
    Option<StringRef> => heap_string_post_write_barrier, heap_string_write_barriers;
    Option<BigIntRef> => heap_bigint_post_write_barrier, heap_bigint_write_barriers;
    Option<ScriptRef> => heap_script_post_write_barrier, heap_script_write_barriers;
    Value => heap_value_post_write_barrier, heap_value_write_barriers;
}
