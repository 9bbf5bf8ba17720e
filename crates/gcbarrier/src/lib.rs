//! # gcbarrier - Write Barriers & Movable-Cell Identity
//!
//! gcbarrier implements the write-barrier layer of a generational,
//! incremental, moving garbage collector together with stable identity for
//! cells that the collector may relocate.
//!
//! ## Overview
//!
//! - **Pre-Barrier**: Snapshot-at-the-beginning marking: the value about to
//!   be overwritten is shaded gray while incremental marking is active
//! - **Post-Barrier**: Records tenured→nursery edges in the owning zone's
//!   store buffer; a full buffer requests an eager minor collection
//! - **Unique Ids**: Lazily assigned per-zone 64-bit ids that survive
//!   relocation
//! - **Movable-Cell Hasher**: Hash policy keyed on unique ids, plus a cell-keyed
//!   map built on it
//! - **Strict Validation**: Debug-mode invariant checker that turns barrier
//!   misuse into a fatal assertion
//!
//! A small reference heap (nursery, tenured space, zones, roots, minor and
//! incremental major collections, compaction) hosts the barriers so that
//! their behavior can be exercised end to end.
//!
//! ## Quick Start
//!
//! ```rust
//! use gcbarrier::{BarrierConfig, CellHashMap, CellKind, CellRef, Heap, ObjectRef, Value, ZoneKind};
//!
//! fn main() -> gcbarrier::Result<()> {
//!     let heap = Heap::new(BarrierConfig::default())?;
//!     let zone = heap.new_zone(ZoneKind::Regular);
//!
//!     // Tenured owner, nursery value: the post-barrier records the edge
//!     let owner = heap.allocate_tenured(zone, CellKind::Object, 1)?;
//!     let young = heap.allocate(zone, CellKind::Object, 0)?;
//!     heap.write_field(owner, 0, Value::Cell(young))?;
//!     assert_eq!(heap.stats().store_buffer_inserts, 1);
//!
//!     // Keys keep matching after the cell moves
//!     let mut map = CellHashMap::new(&heap);
//!     map.insert(ObjectRef::from_addr(owner), "owner")?;
//!     heap.compact(&[])?;
//!     assert_eq!(map.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Mutator Threads                       │
//! │        HeapSlot::set / heap_*_write_barriers              │
//! │                │                      │                   │
//! │          pre_barrier             post_barrier             │
//! │                │                      │                   │
//! └────────────────┼──────────────────────┼───────────────────┘
//!                  ▼                      ▼
//!        ┌──────────────────┐   ┌───────────────────┐
//!        │  Marker (gray    │   │  Zone store buffer│
//!        │  queue)          │   │  (remembered set) │
//!        └────────┬─────────┘   └─────────┬─────────┘
//!                 │                       │
//! ┌───────────────┼───────────────────────┼───────────────────┐
//! │               ▼     Collector         ▼                   │
//! │      incremental marking        minor collection          │
//! │      sweeping                   compaction                │
//! │              └──── rekey unique-id registries ───┘        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Thread Safety
//!
//! - `Heap` is `Send + Sync`; barriers may run concurrently on many threads
//! - Mutator work runs inside a [`MutatorScope`]; a collection stops the
//!   world by taking the heap's safepoint lock exclusively
//! - A regular zone may only be hashed from its owning thread (or by the
//!   collector); shared read-only zones are exempt
//!
//! ## Modules
//!
//! - [`barrier`]: Pre/post barriers, barrier context and statistics
//! - [`cell`]: Cell model, tagged values, typed pointers and slots
//! - [`collector`]: Minor collection, incremental marking, sweeping, compaction
//! - [`config`]: Configuration parameters and validation
//! - [`error`]: Error types
//! - [`heap`]: Reference heap, zones, store buffers and roots
//! - [`identity`]: Unique ids, movable-cell hasher and cell-keyed map
//! - [`logging`]: Collector event history
//! - [`verify`]: Strict invariant checking

// Cell model
pub mod cell;
pub mod config;
pub mod error;

// Heap and collector
pub mod collector;
pub mod heap;

// Barriers and identity
pub mod barrier;
pub mod identity;
pub mod verify;

// Monitoring
pub mod logging;

pub use barrier::api::{
    heap_bigint_post_write_barrier, heap_bigint_write_barriers, heap_object_post_write_barrier,
    heap_object_write_barriers, heap_script_post_write_barrier, heap_script_write_barriers,
    heap_string_post_write_barrier, heap_string_write_barriers, heap_value_post_write_barrier,
    heap_value_write_barriers, post_write_barrier, pre_write_barrier, write_barriers,
};
pub use barrier::{post_barrier, pre_barrier, BarrierContext, BarrierStats, HeapPhase};
pub use cell::{
    BigIntRef, Cell, CellAddr, CellColor, CellKind, CellRef, Generation, GcThing, HeapSlot,
    ObjectRef, RootId, ScriptRef, SlotAddr, StringRef, Value, ZoneId,
};
pub use collector::{MinorGcReason, Tracer};
pub use config::BarrierConfig;
pub use error::{BarrierError, Result};
pub use heap::{Heap, MutatorScope, RootKind, Zone, ZoneKind};
pub use identity::{unique_id_to_hash, CellHashMap, HashNumber, MovableCellHasher, UniqueIdRegistry};
pub use verify::{BarrierValidator, InvariantViolation};

/// gcbarrier version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
