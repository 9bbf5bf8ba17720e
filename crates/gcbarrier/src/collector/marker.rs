//! Marker - Gray queue for incremental marking
//!
//! Barriers on any mutator thread and the marker itself push newly grayed
//! cells here. The queue is a lock-free `SegQueue`, so barriers on threads
//! that own different zones never contend on it.
//!
//! ```text
//!  pre-barrier ──┐
//!  post-barrier ─┼──► gray queue ──► mark_slice: scan slots, blacken
//!  promotion ────┘
//! ```

use crate::cell::{Cell, CellAddr, CellColor};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracing operations barriers depend on
pub trait Tracer: Send + Sync {
    /// Shade a white cell gray and queue it for scanning
    ///
    /// Shading an already gray or black cell is a no-op.
    fn mark_gray(&self, addr: CellAddr, cell: &Cell);

    fn is_marked_black(&self, cell: &Cell) -> bool;

    /// Check if sweeping has identified the cell as unreachable
    fn is_about_to_be_finalized(&self, cell: &Cell) -> bool;
}

/// Marker - gray queue plus marking counters
pub struct Marker {
    /// Gray cells waiting to be scanned
    gray: SegQueue<CellAddr>,

    /// Cells shaded gray this cycle
    marked_count: AtomicU64,

    /// Cells scanned (blackened) this cycle
    scanned_count: AtomicU64,
}

impl Marker {
    pub fn new() -> Self {
        Self {
            gray: SegQueue::new(),
            marked_count: AtomicU64::new(0),
            scanned_count: AtomicU64::new(0),
        }
    }

    /// Queue a cell that is already gray
    pub(crate) fn push_gray(&self, addr: CellAddr) {
        self.gray.push(addr);
        self.marked_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pop_gray(&self) -> Option<CellAddr> {
        self.gray.pop()
    }

    pub(crate) fn record_scanned(&self) {
        self.scanned_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn has_gray(&self) -> bool {
        !self.gray.is_empty()
    }

    pub fn gray_len(&self) -> usize {
        self.gray.len()
    }

    pub fn marked_count(&self) -> u64 {
        self.marked_count.load(Ordering::Relaxed)
    }

    pub fn scanned_count(&self) -> u64 {
        self.scanned_count.load(Ordering::Relaxed)
    }

    /// Drop queued work and zero the counters for a new cycle
    pub(crate) fn reset(&self) {
        while self.gray.pop().is_some() {}
        self.marked_count.store(0, Ordering::Relaxed);
        self.scanned_count.store(0, Ordering::Relaxed);
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for Marker {
    #[inline]
    fn mark_gray(&self, addr: CellAddr, cell: &Cell) {
        if cell.header().try_mark_gray() {
            self.push_gray(addr);
        }
    }

    #[inline]
    fn is_marked_black(&self, cell: &Cell) -> bool {
        cell.color() == CellColor::Black
    }

    #[inline]
    fn is_about_to_be_finalized(&self, cell: &Cell) -> bool {
        cell.header().is_dead()
    }
}
