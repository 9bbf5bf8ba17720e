//! Cell-keyed hash map
//!
//! `CellHashMap` uses [`MovableCellHasher`] as its key policy, so its keys
//! can be moved by the collector without rehashing. Each key is held in a
//! weak external slot: the collector forwards it when the cell moves and
//! clears it when the cell dies, and `sweep` drops such entries.

use super::hasher::MovableCellHasher;
use super::registry::HashNumber;
use crate::cell::{CellRef, RootId, SlotAddr, Value};
use crate::error::Result;
use crate::heap::Heap;
use rustc_hash::FxHashMap;
use std::marker::PhantomData;

struct Entry<V> {
    key: RootId,
    value: V,
}

/// CellHashMap - hash map keyed by movable cells
pub struct CellHashMap<'h, T: CellRef, V> {
    heap: &'h Heap,
    buckets: FxHashMap<HashNumber, Vec<Entry<V>>>,
    len: usize,
    _key: PhantomData<fn() -> T>,
}

impl<'h, T: CellRef, V> CellHashMap<'h, T, V> {
    pub fn new(heap: &'h Heap) -> Self {
        Self {
            heap,
            buckets: FxHashMap::default(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Insert or replace; returns the previous value
    ///
    /// # Errors
    /// `OutOfMemory` if the key's unique id cannot be assigned; the map is
    /// left unchanged.
    pub fn insert(&mut self, key: T, value: V) -> Result<Option<V>> {
        let ctx = self.heap.barrier_context();
        let hash = MovableCellHasher::<T>::ensure_hash(&ctx, Some(key))?;

        let heap = self.heap;
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(entry) = bucket
            .iter_mut()
            .find(|entry| MovableCellHasher::matches(&ctx, key_of::<T>(heap, entry.key), Some(key)))
        {
            return Ok(Some(std::mem::replace(&mut entry.value, value)));
        }

        // Barriered store without a safepoint: `key` stays valid for the caller
        let root = heap.new_weak_root();
        heap.root_slot(root)?
            .set(&ctx, SlotAddr::External(root), Value::Cell(key.addr()));
        bucket.push(Entry { key: root, value });
        self.len += 1;
        Ok(None)
    }

    pub fn get(&self, key: T) -> Option<&V> {
        let ctx = self.heap.barrier_context();
        let hash = MovableCellHasher::<T>::maybe_get_hash(&ctx, Some(key))?;
        self.buckets
            .get(&hash)?
            .iter()
            .find(|entry| {
                MovableCellHasher::matches(&ctx, key_of::<T>(self.heap, entry.key), Some(key))
            })
            .map(|entry| &entry.value)
    }

    pub fn contains_key(&self, key: T) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: T) -> Option<V> {
        let ctx = self.heap.barrier_context();
        let hash = MovableCellHasher::<T>::maybe_get_hash(&ctx, Some(key))?;
        let heap = self.heap;
        let bucket = self.buckets.get_mut(&hash)?;
        let index = bucket.iter().position(|entry| {
            MovableCellHasher::matches(&ctx, key_of::<T>(heap, entry.key), Some(key))
        })?;

        let entry = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        self.release(entry.key);
        self.len -= 1;
        Some(entry.value)
    }

    /// Drop entries whose key died; returns how many were dropped
    pub fn sweep(&mut self) -> usize {
        let heap = self.heap;
        let mut dead_roots = Vec::new();
        for bucket in self.buckets.values_mut() {
            bucket.retain(|entry| {
                let alive = key_of::<T>(heap, entry.key).map_or(false, |key| is_live_key(heap, key));
                if !alive {
                    dead_roots.push(entry.key);
                }
                alive
            });
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());

        let removed = dead_roots.len();
        for root in dead_roots {
            self.release(root);
        }
        self.len -= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current keys; cleared (dead) keys are skipped
    pub fn keys(&self) -> Vec<T> {
        self.buckets
            .values()
            .flatten()
            .filter_map(|entry| key_of::<T>(self.heap, entry.key))
            .collect()
    }

    fn release(&self, root: RootId) {
        if let Err(err) = self.heap.release_root(root) {
            log::warn!("cell map: failed to release key slot {}: {}", root, err);
        }
    }
}

impl<T: CellRef, V> Drop for CellHashMap<'_, T, V> {
    fn drop(&mut self) {
        let roots: Vec<RootId> = self
            .buckets
            .values()
            .flatten()
            .map(|entry| entry.key)
            .collect();
        for root in roots {
            self.release(root);
        }
    }
}

/// Current key stored in `root`, `None` once cleared
fn key_of<T: CellRef>(heap: &Heap, root: RootId) -> Option<T> {
    heap.root(root).ok()?.as_cell().map(T::from_addr)
}

fn is_live_key<T: CellRef>(heap: &Heap, key: T) -> bool {
    let addr = key.addr();
    let Some(cell) = heap.cell(addr) else {
        return false;
    };
    !cell.header().is_dead()
        && heap
            .zone(cell.zone())
            .map_or(false, |zone| zone.has_unique_id(addr))
}
