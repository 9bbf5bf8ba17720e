//! Error Module - Barrier & Identity Error Types
//!
//! Defines all error types surfaced by gcbarrier.
//!
//! # Error Categories
//!
//! ## Resource Errors
//! - `OutOfMemory` - Unique-id registry storage could not grow
//! - `NurseryExhausted` - Cell larger than the nursery could ever hold
//!
//! ## Lookup Errors
//! - `InvalidCell` - Address does not name a live cell
//! - `InvalidSlot` - Slot index outside the owner's slot range
//! - `UnknownZone` - Zone id not registered with the heap
//! - `UnknownRoot` - External slot was never registered or was released
//!
//! ## State Errors
//! - `InvalidPhase` - Collector phase transition not allowed
//! - `Configuration` - Invalid configuration
//! - `Internal` - Invariant violation caught in a recoverable path
//!
//! Barrier invariant violations are *not* represented here: they are fatal
//! and reported by the validator in [`crate::verify`].

use crate::cell::{CellAddr, ZoneId};
use thiserror::Error;

/// Main error type for all gcbarrier operations
///
/// # Examples
///
/// ```rust
/// use gcbarrier::BarrierError;
///
/// fn handle_error(err: BarrierError) {
///     match err {
///         BarrierError::OutOfMemory { zone, .. } => {
///             eprintln!("registry of zone {} is full", zone);
///         }
///         _ => eprintln!("Other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum BarrierError {
    /// Registry storage exhausted
    ///
    /// **When returned:** `ensure_hash` / `get_or_create_unique_id` could not
    /// reserve room for a new entry.
    ///
    /// **Recovery strategy:** Treat the hash as unavailable and retry later.
    /// Nothing was cached.
    #[error("Out of memory: unique-id registry of zone {zone} cannot hold {requested} entries")]
    OutOfMemory { zone: ZoneId, requested: usize },

    /// Allocation request can never fit in the nursery
    #[error("Nursery exhausted: cell of {size} bytes exceeds nursery capacity {capacity}")]
    NurseryExhausted { size: usize, capacity: usize },

    /// Address does not refer to a live cell
    #[error("Invalid cell address: {address}")]
    InvalidCell { address: CellAddr },

    /// Slot index out of range
    #[error("Invalid slot: index {index} out of bounds for cell {owner} with {length} slots")]
    InvalidSlot {
        owner: CellAddr,
        index: u32,
        length: usize,
    },

    /// Zone id not known to the heap
    #[error("Unknown zone: {0}")]
    UnknownZone(ZoneId),

    /// External slot not registered
    #[error("Unknown root slot: {0}")]
    UnknownRoot(u32),

    /// Collector phase transition not allowed
    ///
    /// **Example scenario:** Starting a mark slice while no incremental
    /// collection is active.
    #[error("Invalid phase: expected {expected}, got {actual}")]
    InvalidPhase { expected: String, actual: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error - indicates a bug in gcbarrier
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BarrierError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BarrierError::OutOfMemory { .. } | BarrierError::NurseryExhausted { .. }
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            BarrierError::InvalidPhase { .. } | BarrierError::Internal(_)
        )
    }
}

/// Result type alias for gcbarrier operations
pub type Result<T> = std::result::Result<T, BarrierError>;

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_is_recoverable() {
        let err = BarrierError::OutOfMemory {
            zone: ZoneId(3),
            requested: 17,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_bug());
        assert!(err.to_string().contains("zone 3"));
    }

    #[test]
    fn test_phase_error_is_bug() {
        let err = BarrierError::InvalidPhase {
            expected: "Marking".into(),
            actual: "Idle".into(),
        };
        assert!(err.is_bug());
        assert!(!err.is_recoverable());
    }
}
