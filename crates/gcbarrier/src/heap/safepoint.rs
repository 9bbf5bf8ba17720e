//! Safepoint - Mutator / collector exclusion
//!
//! A collection may only run at a point where no mutator is between reading
//! a cell address and using it. Mutator work that touches addresses
//! (allocation, barriered stores, unique-id assignment) runs inside a
//! [`MutatorScope`], which holds the safepoint lock shared. A collection
//! holds it exclusively for its whole duration.
//!
//! ```text
//! mutator A  ──[scope]────[scope]──               ──[scope]──
//! mutator B  ─────[scope]────              ──[scope]──
//! collector                       [stop-the-world]
//!                                 ▲ waits for every open scope
//! ```
//!
//! ## Rules
//!
//! - Scopes nest; only the outermost one on a thread takes the lock.
//! - The thread performing a collection never blocks on its own lock: a
//!   scope opened by it is a no-op.
//! - A thread with an open scope cannot start a collection on the same
//!   heap. The collection returns an error instead of deadlocking, and
//!   [`Heap::check_safepoint`](crate::Heap::check_safepoint) leaves the
//!   request pending until the scope closes.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::RefCell;

thread_local! {
    /// Open scopes of the current thread: (safepoint key, nesting depth)
    static OPEN_SCOPES: RefCell<Vec<(usize, usize)>> = RefCell::new(Vec::new());
}

/// Safepoint - the lock mutators share and collections take exclusively
pub struct Safepoint {
    lock: RwLock<()>,
}

impl Safepoint {
    pub fn new() -> Self {
        Self {
            lock: RwLock::new(()),
        }
    }

    #[inline]
    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Check if the calling thread has an open scope on this safepoint
    pub fn in_mutator_scope(&self) -> bool {
        let key = self.key();
        OPEN_SCOPES.with(|scopes| scopes.borrow().iter().any(|(k, _)| *k == key))
    }

    /// Open a mutator scope, waiting for a running collection to finish
    pub fn enter_mutator(&self) -> MutatorScope<'_> {
        let key = self.key();
        let nested = OPEN_SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            match scopes.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => {
                    entry.1 += 1;
                    true
                }
                None => false,
            }
        });

        let guard = if nested {
            None
        } else {
            let guard = self.lock.read();
            OPEN_SCOPES.with(|scopes| scopes.borrow_mut().push((key, 1)));
            Some(guard)
        };
        MutatorScope {
            safepoint: Some(self),
            _guard: guard,
        }
    }

    /// Scope that holds nothing, for the thread performing a collection
    pub(crate) fn bypass(&self) -> MutatorScope<'_> {
        MutatorScope {
            safepoint: None,
            _guard: None,
        }
    }

    /// Wait until every mutator scope is closed and keep new ones out
    pub(crate) fn stop_the_world(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

impl Default for Safepoint {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Safepoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Safepoint")
            .field("in_mutator_scope", &self.in_mutator_scope())
            .finish()
    }
}

/// MutatorScope - keeps collections out while alive
///
/// Cell addresses read inside a scope stay valid until it is dropped.
#[must_use = "a mutator scope only excludes collections while it is alive"]
pub struct MutatorScope<'a> {
    /// `None` for a bypass scope
    safepoint: Option<&'a Safepoint>,
    _guard: Option<RwLockReadGuard<'a, ()>>,
}

impl Drop for MutatorScope<'_> {
    fn drop(&mut self) {
        let Some(safepoint) = self.safepoint else {
            return;
        };
        let key = safepoint.key();
        OPEN_SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(pos) = scopes.iter().position(|(k, _)| *k == key) {
                scopes[pos].1 -= 1;
                if scopes[pos].1 == 0 {
                    scopes.swap_remove(pos);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_scopes_nest() {
        let safepoint = Safepoint::new();
        assert!(!safepoint.in_mutator_scope());
        {
            let _outer = safepoint.enter_mutator();
            let _inner = safepoint.enter_mutator();
            assert!(safepoint.in_mutator_scope());
        }
        assert!(!safepoint.in_mutator_scope());
        // Lock was released by the outermost scope
        drop(safepoint.stop_the_world());
    }

    #[test]
    fn test_scopes_are_per_safepoint() {
        let a = Safepoint::new();
        let b = Safepoint::new();
        let _scope = a.enter_mutator();
        assert!(a.in_mutator_scope());
        assert!(!b.in_mutator_scope());
        drop(b.stop_the_world());
    }

    #[test]
    fn test_stop_the_world_waits_for_scope() {
        let safepoint = Safepoint::new();
        let stopped = AtomicBool::new(false);

        thread::scope(|s| {
            let scope = safepoint.enter_mutator();
            s.spawn(|| {
                let _world = safepoint.stop_the_world();
                stopped.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(20));
            assert!(!stopped.load(Ordering::SeqCst));
            drop(scope);
        });
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_bypass_holds_nothing() {
        let safepoint = Safepoint::new();
        let _scope = safepoint.bypass();
        assert!(!safepoint.in_mutator_scope());
        drop(safepoint.stop_the_world());
    }
}
