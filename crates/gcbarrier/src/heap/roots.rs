//! External Slots - Rooted handles outside the managed heap
//!
//! Embedder code holds heap references in slots registered here. Strong
//! slots are marking roots and keep their referent alive across minor
//! collections. Weak slots are only updated when their referent moves and
//! are cleared to null when it dies.
//!
//! Every slot is a [`HeapSlot`], so embedder stores go through the same
//! barrier pair as field stores.

use crate::cell::{HeapSlot, RootId};
use crate::error::{BarrierError, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Strength of an external slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// Keeps the referent alive
    Strong,
    /// Cleared when the referent dies
    Weak,
}

#[derive(Clone)]
struct RootEntry {
    slot: Arc<HeapSlot>,
    kind: RootKind,
}

/// RootTable - registry of external slots
pub struct RootTable {
    entries: RwLock<Vec<Option<RootEntry>>>,
    free: Mutex<Vec<u32>>,
}

impl RootTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Register a new undefined slot
    pub fn add(&self, kind: RootKind) -> RootId {
        let entry = RootEntry {
            slot: Arc::new(HeapSlot::new()),
            kind,
        };
        let mut entries = self.entries.write();
        if let Some(index) = self.free.lock().pop() {
            entries[index as usize] = Some(entry);
            return RootId(index);
        }
        entries.push(Some(entry));
        RootId((entries.len() - 1) as u32)
    }

    /// Slot registered under `id`
    pub fn get(&self, id: RootId) -> Result<Arc<HeapSlot>> {
        self.entries
            .read()
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .map(|entry| entry.slot.clone())
            .ok_or(BarrierError::UnknownRoot(id.0))
    }

    pub fn kind(&self, id: RootId) -> Result<RootKind> {
        self.entries
            .read()
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .map(|entry| entry.kind)
            .ok_or(BarrierError::UnknownRoot(id.0))
    }

    /// Unregister `id`; its index may be handed out again
    pub fn remove(&self, id: RootId) -> Result<()> {
        let mut entries = self.entries.write();
        match entries.get_mut(id.0 as usize) {
            Some(entry @ Some(_)) => {
                *entry = None;
                self.free.lock().push(id.0);
                Ok(())
            }
            _ => Err(BarrierError::UnknownRoot(id.0)),
        }
    }

    /// Every registered slot of the given kind
    pub fn snapshot(&self, kind: RootKind) -> Vec<(RootId, Arc<HeapSlot>)> {
        self.entries
            .read()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Some(entry) if entry.kind == kind => {
                    Some((RootId(index as u32), entry.slot.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Every registered slot
    pub fn all(&self) -> Vec<(RootId, Arc<HeapSlot>)> {
        self.entries
            .read()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .as_ref()
                    .map(|entry| (RootId(index as u32), entry.slot.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RootTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Value;

    #[test]
    fn test_add_get_remove() {
        let roots = RootTable::new();
        let id = roots.add(RootKind::Strong);
        assert_eq!(roots.get(id).unwrap().get(), Value::Undefined);
        assert_eq!(roots.kind(id).unwrap(), RootKind::Strong);

        roots.remove(id).unwrap();
        assert!(matches!(roots.get(id), Err(BarrierError::UnknownRoot(_))));
        assert!(roots.remove(id).is_err());
    }

    #[test]
    fn test_released_index_is_reused() {
        let roots = RootTable::new();
        let a = roots.add(RootKind::Strong);
        let _b = roots.add(RootKind::Weak);
        roots.remove(a).unwrap();

        let c = roots.add(RootKind::Weak);
        assert_eq!(c, a);
        assert_eq!(roots.kind(c).unwrap(), RootKind::Weak);
    }

    #[test]
    fn test_snapshot_filters_by_kind() {
        let roots = RootTable::new();
        roots.add(RootKind::Strong);
        roots.add(RootKind::Weak);
        roots.add(RootKind::Strong);

        assert_eq!(roots.snapshot(RootKind::Strong).len(), 2);
        assert_eq!(roots.snapshot(RootKind::Weak).len(), 1);
        assert_eq!(roots.all().len(), 3);
    }
}
