//! Address Space Management - Nursery & Tenured Ranges
//!
//! The simulated heap hands out addresses from two fixed, disjoint ranges.
//! Generation is therefore a pure function of the address, exactly like a
//! chunk-based nursery check.
//!
//! Virtual Address Layout:
//! ```text
//! 0x0000_1000_0000 ─┐
//!                   │  Nursery (256MB reserved, nursery_size used)
//! 0x0000_2000_0000 ─┘
//!
//! 0x0001_0000_0000 ─┐
//!                   │  Tenured (bump + per-size free lists)
//! 0x8000_0000_0000 ─┘
//! ```
//!
//! The nursery is a bump region reset wholesale by every minor collection.
//! Tenured addresses released by the sweeper or the compactor are recycled
//! through exact-size free lists, so a swept cell's address can come back
//! holding a different cell.

use crate::cell::{CellAddr, Generation};
use crate::error::{BarrierError, Result};
use indexmap::IndexMap;

/// Nursery range base
pub const NURSERY_BASE: usize = 0x0000_1000_0000;

/// End of the reserved nursery range
pub const NURSERY_LIMIT: usize = 0x0000_2000_0000;

/// Tenured range base
pub const TENURED_BASE: usize = 0x0001_0000_0000;

/// End of the tenured range (fits the 48-bit slot payload)
pub const TENURED_LIMIT: usize = 0x8000_0000_0000;

/// Cell alignment in bytes
pub const CELL_ALIGNMENT: usize = 16;

/// Generation of a raw address
#[inline]
pub fn generation_of(raw: usize) -> Generation {
    if (NURSERY_BASE..NURSERY_LIMIT).contains(&raw) {
        Generation::Nursery
    } else {
        Generation::Tenured
    }
}

/// AddressSpace - address allocation for both generations
pub struct AddressSpace {
    /// Next free nursery address
    nursery_top: usize,

    /// End of the usable nursery
    nursery_end: usize,

    /// Next never-used tenured address
    tenured_top: usize,

    /// Released tenured addresses by size
    free_lists: IndexMap<usize, Vec<usize>>,

    /// Live tenured bytes
    tenured_used: usize,
}

impl AddressSpace {
    /// Create address space with a nursery of `nursery_size` bytes
    pub fn new(nursery_size: usize) -> Self {
        let nursery_end = (NURSERY_BASE + nursery_size).min(NURSERY_LIMIT);
        Self {
            nursery_top: NURSERY_BASE,
            nursery_end,
            tenured_top: TENURED_BASE,
            free_lists: IndexMap::new(),
            tenured_used: 0,
        }
    }

    /// Bump-allocate in the nursery
    ///
    /// Returns `None` when the nursery is full.
    pub fn alloc_nursery(&mut self, size: usize) -> Option<CellAddr> {
        let size = align_up(size);
        let end = self.nursery_top.checked_add(size)?;
        if end > self.nursery_end {
            return None;
        }
        let addr = CellAddr::new(self.nursery_top)?;
        self.nursery_top = end;
        Some(addr)
    }

    /// Allocate a tenured address, recycling released ones first
    pub fn alloc_tenured(&mut self, size: usize) -> Result<CellAddr> {
        let size = align_up(size);
        if let Some(raw) = self.free_lists.get_mut(&size).and_then(Vec::pop) {
            self.tenured_used += size;
            return CellAddr::new(raw)
                .ok_or_else(|| BarrierError::Internal("null address on free list".into()));
        }
        self.alloc_tenured_fresh(size)
    }

    /// Allocate a tenured address that has never been handed out
    ///
    /// The compactor uses this so that no destination aliases a cell that is
    /// still waiting to be moved.
    pub fn alloc_tenured_fresh(&mut self, size: usize) -> Result<CellAddr> {
        let size = align_up(size);
        let end = self
            .tenured_top
            .checked_add(size)
            .filter(|end| *end <= TENURED_LIMIT)
            .ok_or_else(|| {
                BarrierError::Internal("tenured address space exhausted".into())
            })?;
        let addr = CellAddr::new(self.tenured_top)
            .ok_or_else(|| BarrierError::Internal("null tenured address".into()))?;
        self.tenured_top = end;
        self.tenured_used += size;
        Ok(addr)
    }

    /// Return a tenured address to its free list
    pub fn release_tenured(&mut self, addr: CellAddr, size: usize) {
        debug_assert_eq!(addr.generation(), Generation::Tenured);
        let size = align_up(size);
        self.free_lists.entry(size).or_default().push(addr.get());
        self.tenured_used = self.tenured_used.saturating_sub(size);
    }

    /// Empty the nursery after a minor collection
    pub fn reset_nursery(&mut self) {
        self.nursery_top = NURSERY_BASE;
    }

    pub fn nursery_used(&self) -> usize {
        self.nursery_top - NURSERY_BASE
    }

    pub fn nursery_capacity(&self) -> usize {
        self.nursery_end - NURSERY_BASE
    }

    pub fn tenured_used(&self) -> usize {
        self.tenured_used
    }

    /// Use up the tenured range and forget released addresses
    #[cfg(test)]
    pub(crate) fn exhaust_tenured(&mut self) {
        self.tenured_top = TENURED_LIMIT;
        self.free_lists.clear();
    }
}

#[inline]
fn align_up(size: usize) -> usize {
    (size.max(CELL_ALIGNMENT) + CELL_ALIGNMENT - 1) & !(CELL_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nursery_bump_and_reset() {
        let mut space = AddressSpace::new(64);
        let a = space.alloc_nursery(32).unwrap();
        let b = space.alloc_nursery(32).unwrap();
        assert_eq!(a.get(), NURSERY_BASE);
        assert_eq!(b.get(), NURSERY_BASE + 32);
        assert!(space.alloc_nursery(16).is_none());

        space.reset_nursery();
        assert_eq!(space.nursery_used(), 0);
        assert_eq!(space.alloc_nursery(16), Some(a));
    }

    #[test]
    fn test_tenured_addresses_are_recycled_by_size() {
        let mut space = AddressSpace::new(4096);
        let a = space.alloc_tenured(48).unwrap();
        let _b = space.alloc_tenured(48).unwrap();
        space.release_tenured(a, 48);

        // Different size class does not reuse it
        let c = space.alloc_tenured(64).unwrap();
        assert_ne!(c, a);

        assert_eq!(space.alloc_tenured(48).unwrap(), a);
    }

    #[test]
    fn test_fresh_allocation_skips_free_list() {
        let mut space = AddressSpace::new(4096);
        let a = space.alloc_tenured(32).unwrap();
        space.release_tenured(a, 32);
        let fresh = space.alloc_tenured_fresh(32).unwrap();
        assert_ne!(fresh, a);
    }

    #[test]
    fn test_exhausted_tenured_range_fails() {
        let mut space = AddressSpace::new(4096);
        space.exhaust_tenured();
        assert!(space.alloc_tenured(32).is_err());
        assert!(space.alloc_tenured_fresh(32).is_err());
    }

    #[test]
    fn test_generation_of_ranges() {
        assert_eq!(generation_of(NURSERY_BASE), Generation::Nursery);
        assert_eq!(generation_of(NURSERY_LIMIT - 1), Generation::Nursery);
        assert_eq!(generation_of(NURSERY_LIMIT), Generation::Tenured);
        assert_eq!(generation_of(TENURED_BASE), Generation::Tenured);
    }
}
