//! Barrier Statistics - Performance Monitoring
//!
//! Counters for the write barriers. Used for:
//! - Debugging and profiling
//! - Store buffer sizing
//! - Verifying that the fast paths stay fast
//!
//! Metrics tracked:
//! - Pre/post barrier invocations and fast-path exits
//! - Cells shaded by either barrier
//! - Store buffer inserts, duplicates and overflows

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// BarrierStats - snapshot of barrier counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarrierStats {
    /// Pre-barrier invocations
    pub pre_invocations: u64,
    /// Pre-barriers that exited on the phase check
    pub pre_fast_path: u64,
    /// Cells shaded gray by the pre-barrier
    pub cells_shaded: u64,
    /// Post-barrier invocations
    pub post_invocations: u64,
    /// Post-barriers that recorded nothing
    pub post_fast_path: u64,
    /// Store buffer entries added
    pub store_buffer_inserts: u64,
    /// Store buffer insertions that found the entry present
    pub store_buffer_duplicates: u64,
    /// Insertions that reached the buffer capacity
    pub store_buffer_overflows: u64,
    /// Cells shaded gray by the post-barrier's insertion step
    pub insertion_shades: u64,
    /// Combined fast path rate over both barriers (percentage)
    pub fast_path_rate: f64,
}

impl BarrierStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge stats from another source
    pub fn merge(&mut self, other: &BarrierStats) {
        self.pre_invocations += other.pre_invocations;
        self.pre_fast_path += other.pre_fast_path;
        self.cells_shaded += other.cells_shaded;
        self.post_invocations += other.post_invocations;
        self.post_fast_path += other.post_fast_path;
        self.store_buffer_inserts += other.store_buffer_inserts;
        self.store_buffer_duplicates += other.store_buffer_duplicates;
        self.store_buffer_overflows += other.store_buffer_overflows;
        self.insertion_shades += other.insertion_shades;
        self.recalculate_fast_path_rate();
    }

    #[inline]
    fn recalculate_fast_path_rate(&mut self) {
        self.fast_path_rate = fast_path_rate(
            self.pre_invocations + self.post_invocations,
            self.pre_fast_path + self.post_fast_path,
        );
    }

    /// Total barrier invocations
    #[inline]
    pub fn total_invocations(&self) -> u64 {
        self.pre_invocations + self.post_invocations
    }

    /// Get slow path rate (percentage)
    #[inline]
    pub fn slow_path_rate(&self) -> f64 {
        100.0 - self.fast_path_rate
    }
}

impl Default for BarrierStats {
    fn default() -> Self {
        Self {
            pre_invocations: 0,
            pre_fast_path: 0,
            cells_shaded: 0,
            post_invocations: 0,
            post_fast_path: 0,
            store_buffer_inserts: 0,
            store_buffer_duplicates: 0,
            store_buffer_overflows: 0,
            insertion_shades: 0,
            fast_path_rate: 100.0,
        }
    }
}

/// AtomicBarrierStats - thread-safe stats collector
///
/// Every counter is a relaxed atomic: barriers on different mutator threads
/// bump them without coordination.
#[derive(Default)]
pub struct AtomicBarrierStats {
    pre_invocations: AtomicU64,
    pre_fast_path: AtomicU64,
    cells_shaded: AtomicU64,
    post_invocations: AtomicU64,
    post_fast_path: AtomicU64,
    store_buffer_inserts: AtomicU64,
    store_buffer_duplicates: AtomicU64,
    store_buffer_overflows: AtomicU64,
    insertion_shades: AtomicU64,
}

impl AtomicBarrierStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_pre_invocation(&self) {
        self.pre_invocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pre_fast_path(&self) {
        self.pre_fast_path.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_shade(&self) {
        self.cells_shaded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_post_invocation(&self) {
        self.post_invocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_post_fast_path(&self) {
        self.post_fast_path.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_buffer_insert(&self) {
        self.store_buffer_inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_buffer_duplicate(&self) {
        self.store_buffer_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_buffer_overflow(&self) {
        self.store_buffer_overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_insertion_shade(&self) {
        self.insertion_shades.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> BarrierStats {
        let mut stats = BarrierStats {
            pre_invocations: self.pre_invocations.load(Ordering::Relaxed),
            pre_fast_path: self.pre_fast_path.load(Ordering::Relaxed),
            cells_shaded: self.cells_shaded.load(Ordering::Relaxed),
            post_invocations: self.post_invocations.load(Ordering::Relaxed),
            post_fast_path: self.post_fast_path.load(Ordering::Relaxed),
            store_buffer_inserts: self.store_buffer_inserts.load(Ordering::Relaxed),
            store_buffer_duplicates: self.store_buffer_duplicates.load(Ordering::Relaxed),
            store_buffer_overflows: self.store_buffer_overflows.load(Ordering::Relaxed),
            insertion_shades: self.insertion_shades.load(Ordering::Relaxed),
            fast_path_rate: 100.0,
        };
        stats.recalculate_fast_path_rate();
        stats
    }

    /// Reset all stats to zero
    pub fn reset(&self) {
        for counter in [
            &self.pre_invocations,
            &self.pre_fast_path,
            &self.cells_shaded,
            &self.post_invocations,
            &self.post_fast_path,
            &self.store_buffer_inserts,
            &self.store_buffer_duplicates,
            &self.store_buffer_overflows,
            &self.insertion_shades,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[inline]
fn fast_path_rate(total: u64, fast: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (fast as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = BarrierStats::new();
        assert_eq!(stats.total_invocations(), 0);
        assert_eq!(stats.fast_path_rate, 100.0);
    }

    #[test]
    fn test_atomic_stats_snapshot() {
        let stats = AtomicBarrierStats::new();
        for _ in 0..4 {
            stats.record_pre_invocation();
            stats.record_pre_fast_path();
        }
        for _ in 0..4 {
            stats.record_post_invocation();
        }
        stats.record_post_fast_path();
        stats.record_store_buffer_insert();
        stats.record_store_buffer_duplicate();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pre_invocations, 4);
        assert_eq!(snapshot.post_invocations, 4);
        assert_eq!(snapshot.store_buffer_inserts, 1);
        assert_eq!(snapshot.store_buffer_duplicates, 1);
        // 5 of 8 took a fast path
        assert!((snapshot.fast_path_rate - 62.5).abs() < 0.01);
    }

    #[test]
    fn test_atomic_stats_reset() {
        let stats = AtomicBarrierStats::new();
        stats.record_pre_invocation();
        stats.record_shade();
        stats.record_store_buffer_overflow();

        stats.reset();
        assert_eq!(stats.snapshot(), BarrierStats::default());
    }

    #[test]
    fn test_stats_merge() {
        let mut total = BarrierStats {
            pre_invocations: 10,
            pre_fast_path: 10,
            ..Default::default()
        };
        let other = BarrierStats {
            post_invocations: 10,
            post_fast_path: 0,
            store_buffer_inserts: 10,
            ..Default::default()
        };
        total.merge(&other);

        assert_eq!(total.total_invocations(), 20);
        assert_eq!(total.store_buffer_inserts, 10);
        assert!((total.slow_path_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = AtomicBarrierStats::new();
        stats.record_post_invocation();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["post_invocations"], 1);
    }

    #[test]
    fn test_atomic_stats_concurrent() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(AtomicBarrierStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_post_invocation();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().post_invocations, 800);
    }
}
