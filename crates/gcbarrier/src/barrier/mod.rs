//! Barrier Module - Pre & Post Write Barriers
//!
//! Every store of a heap reference into a slot is bracketed by two barriers:
//!
//! ```text
//!   prev = slot.get()
//!   pre_barrier(prev)          incremental marking: gray the old value
//!   slot.store(next)
//!   post_barrier(prev, next)   generational: record tenured→nursery edges
//! ```
//!
//! Pre-Barrier:
//! Keeps the snapshot the incremental marker traces intact. Fast path is a
//! single phase check.
//!
//! Post-Barrier:
//! Records slots that may point from longer-lived storage into the nursery
//! in the store buffer of the owning zone, and during marking shades white
//! values stored into black owners.
//!
//! Barriers run synchronously on the mutator thread. They never block on the
//! collector, never allocate cells and never start a collection: a full
//! store buffer only *requests* a minor collection.

pub mod api;
pub mod context;
pub mod post;
pub mod pre;
pub mod stats;

pub use context::{BarrierContext, HeapPhase};
pub use post::post_barrier;
pub use pre::pre_barrier;
pub use stats::{AtomicBarrierStats, BarrierStats};
