//! Movable-Cell Identity
//!
//! Stable identity for cells that a moving collector may relocate:
//!
//! - [`UniqueIdRegistry`] - per-zone lazily assigned 64-bit ids
//! - [`MovableCellHasher`] - hash policy keyed on those ids
//! - [`CellHashMap`] - map whose keys survive relocation

pub mod hasher;
pub mod map;
pub mod registry;

pub use hasher::MovableCellHasher;
pub use map::CellHashMap;
pub use registry::{unique_id_to_hash, HashNumber, UniqueIdRegistry};
