//! Cell Header - Marking metadata for collector-managed cells
//!
//! Mark Word layout:
//! ```text
//! ┌──────────────────────────────┬──────┬───────────┐
//! │          unused              │ Dead │  Color    │
//! │           63-3               │  2   │   1-0     │
//! └──────────────────────────────┴──────┴───────────┘
//!
//! Color: 0 = white, 1 = gray, 2 = black
//! ```

use super::{CellColor, CellKind, ZoneId};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Size of the simulated cell header in bytes
pub const HEADER_SIZE: usize = 16;

/// Mark word bit positions
pub const COLOR_SHIFT: usize = 0;
pub const DEAD_BIT: usize = 2;

/// Masks for mark word fields
pub const COLOR_MASK: usize = 0b11 << COLOR_SHIFT;
pub const DEAD_MASK: usize = 1 << DEAD_BIT;

const WHITE: usize = 0;
const GRAY: usize = 1;
const BLACK: usize = 2;

/// Cell Header
///
/// The mark word is atomic: barriers on mutator threads and the marker may
/// race to shade the same cell, and exactly one of them must win.
pub struct CellHeader {
    mark_word: AtomicUsize,
    kind: CellKind,
    zone: ZoneId,
}

impl CellHeader {
    pub fn new(kind: CellKind, zone: ZoneId) -> Self {
        Self {
            mark_word: AtomicUsize::new(WHITE),
            kind,
            zone,
        }
    }

    pub(crate) fn relocated_copy(&self) -> Self {
        Self {
            mark_word: AtomicUsize::new(self.mark_word.load(Ordering::Acquire)),
            kind: self.kind,
            zone: self.zone,
        }
    }

    #[inline]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    #[inline]
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    // === Color Operations ===

    #[inline]
    pub fn color(&self) -> CellColor {
        decode_color(self.mark_word.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_white(&self) -> bool {
        self.color() == CellColor::White
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.color() == CellColor::Black
    }

    /// Unconditionally set color, keeping the other mark word bits
    #[inline]
    pub fn set_color(&self, color: CellColor) {
        let bits = encode_color(color);
        let mut current = self.mark_word.load(Ordering::Acquire);
        loop {
            let new = (current & !COLOR_MASK) | bits;
            match self.mark_word.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(val) => current = val,
            }
        }
    }

    /// Shade white to gray atomically
    ///
    /// Returns true if this call performed the transition; false if the cell
    /// was already gray or black.
    #[inline]
    pub fn try_mark_gray(&self) -> bool {
        let mut current = self.mark_word.load(Ordering::Acquire);
        loop {
            if current & COLOR_MASK != WHITE {
                return false;
            }
            let new = (current & !COLOR_MASK) | GRAY;
            match self.mark_word.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(val) => current = val,
            }
        }
    }

    // === Liveness Operations ===

    /// Check if the sweeper identified this cell as unreachable
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.mark_word.load(Ordering::Acquire) & DEAD_MASK != 0
    }

    #[inline]
    pub fn set_dead(&self) {
        self.mark_word.fetch_or(DEAD_MASK, Ordering::AcqRel);
    }

    #[inline]
    pub fn clear_dead(&self) {
        self.mark_word.fetch_and(!DEAD_MASK, Ordering::AcqRel);
    }
}

#[inline]
fn encode_color(color: CellColor) -> usize {
    match color {
        CellColor::White => WHITE,
        CellColor::Gray => GRAY,
        CellColor::Black => BLACK,
    }
}

#[inline]
fn decode_color(word: usize) -> CellColor {
    match (word & COLOR_MASK) >> COLOR_SHIFT {
        WHITE => CellColor::White,
        GRAY => CellColor::Gray,
        _ => CellColor::Black,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_header() -> CellHeader {
        CellHeader::new(CellKind::Object, ZoneId(0))
    }

    #[test]
    fn test_new_header_is_white_and_live() {
        let header = create_test_header();
        assert!(header.is_white());
        assert!(!header.is_dead());
    }

    #[test]
    fn test_try_mark_gray_only_from_white() {
        let header = create_test_header();

        assert!(header.try_mark_gray());
        assert_eq!(header.color(), CellColor::Gray);

        // Already gray
        assert!(!header.try_mark_gray());

        header.set_color(CellColor::Black);
        assert!(!header.try_mark_gray());
        assert!(header.is_black());
    }

    #[test]
    fn test_dead_bit_independent_of_color() {
        let header = create_test_header();
        header.set_color(CellColor::Black);
        header.set_dead();

        assert!(header.is_dead());
        assert!(header.is_black());

        header.set_color(CellColor::White);
        assert!(header.is_dead());

        header.clear_dead();
        assert!(!header.is_dead());
        assert!(header.is_white());
    }

    #[test]
    fn test_concurrent_shading_has_one_winner() {
        use std::sync::atomic::AtomicUsize as Counter;
        use std::sync::Arc;

        let header = Arc::new(create_test_header());
        let winners = Arc::new(Counter::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let header = header.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if header.try_mark_gray() {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert_eq!(header.color(), CellColor::Gray);
    }
}
