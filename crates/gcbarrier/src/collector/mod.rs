//! Collector Module - Reference collector driving the barriers
//!
//! A small generational, incremental, compacting collector over the
//! simulated heap. It exists to give the barriers something real to protect:
//!
//! 1. **Minor collection** - promotes nursery cells reachable from roots and
//!    from store-buffer entries, then empties the nursery
//! 2. **Incremental marking** - tri-color marking in budgeted slices while
//!    the mutator keeps running behind the pre/post barriers
//! 3. **Sweeping** - drops unique ids of dead cells zone by zone, then frees
//!    the dead cells
//! 4. **Compaction** - moves tenured cells, fixes every slot and rekeys the
//!    unique-id registries
//!
//! Every collection stops the world: it holds the heap's safepoint lock
//! exclusively, so it waits for open mutator scopes and keeps new ones out.
//! This also serializes collections. The thread holding it is "the thread
//! performing GC" for the zone-access checks. The collector fixes up edges
//! with unbarriered stores only.
//!
//! There is no scheduling policy: every phase runs when asked, plus the
//! mandatory eager minor collection a full store buffer requests.

pub mod compact;
pub mod forwarding;
pub mod marker;
pub mod marking;
pub mod minor;
pub mod sweep;

pub use compact::CompactionReport;
pub use forwarding::ForwardingTable;
pub use marker::{Marker, Tracer};
pub use marking::MarkingReport;
pub use minor::MinorCollectionReport;
pub use sweep::{MajorCollectionReport, SweepReport};

use crate::barrier::HeapPhase;
use crate::error::{BarrierError, Result};
use crate::heap::Heap;
use parking_lot::RwLockWriteGuard;
use std::fmt;
use std::thread::{self, ThreadId};

/// Reason for a minor collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinorGcReason {
    /// A store buffer reached its capacity
    FullStoreBuffer,
    /// Nursery allocation failed
    OutOfNursery,
    /// Nursery emptied before a major phase
    EvictNursery,
    /// Embedder request
    Explicit,
}

impl MinorGcReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MinorGcReason::FullStoreBuffer => "FULL_STORE_BUFFER",
            MinorGcReason::OutOfNursery => "OUT_OF_NURSERY",
            MinorGcReason::EvictNursery => "EVICT_NURSERY",
            MinorGcReason::Explicit => "EXPLICIT",
        }
    }
}

impl fmt::Display for MinorGcReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CollectionSession - exclusive right to run collector work
///
/// Holds the heap's safepoint lock exclusively and marks the current thread
/// as the one performing GC. On drop the heap is left in the `resume` phase.
pub(crate) struct CollectionSession<'h> {
    heap: &'h Heap,
    resume: HeapPhase,
    previous_thread: Option<ThreadId>,
    _world: RwLockWriteGuard<'h, ()>,
}

impl<'h> CollectionSession<'h> {
    pub(crate) fn enter(heap: &'h Heap) -> Result<Self> {
        let current = thread::current().id();
        if heap.collecting_thread() == Some(current) {
            return Err(BarrierError::InvalidPhase {
                expected: "a mutator phase".into(),
                actual: heap.phase().to_string(),
            });
        }
        if heap.safepoint().in_mutator_scope() {
            return Err(BarrierError::InvalidPhase {
                expected: "no open mutator scope".into(),
                actual: "collection started inside a mutator scope".into(),
            });
        }

        let world = heap.safepoint().stop_the_world();
        let resume = heap.phase();
        if resume.is_collecting() {
            return Err(BarrierError::InvalidPhase {
                expected: "a mutator phase".into(),
                actual: resume.to_string(),
            });
        }
        let previous_thread = heap.set_collecting_thread(Some(current));
        Ok(Self {
            heap,
            resume,
            previous_thread,
            _world: world,
        })
    }

    /// Phase the session started in
    pub(crate) fn entry_phase(&self) -> HeapPhase {
        self.resume
    }

    /// Fail unless the session started in `expected`
    pub(crate) fn require(&self, expected: HeapPhase) -> Result<()> {
        if self.resume == expected {
            Ok(())
        } else {
            Err(BarrierError::InvalidPhase {
                expected: expected.to_string(),
                actual: self.resume.to_string(),
            })
        }
    }

    /// Phase to leave the heap in when the session ends
    pub(crate) fn resume_in(&mut self, phase: HeapPhase) {
        self.resume = phase;
    }
}

impl Drop for CollectionSession<'_> {
    fn drop(&mut self) {
        self.heap.set_phase(self.resume);
        self.heap.set_collecting_thread(self.previous_thread);
    }
}
