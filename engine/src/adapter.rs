//! State adapters.
//!
//! An adapter owns the canonical snapshot. The engine reads it with
//! [`StateAdapter::get_snapshot`], writes through
//! [`StateAdapter::set_snapshot`], and learns about changes made by anyone
//! else through [`StateAdapter::subscribe`].

use crate::{ChangeReason, Filters, TableStateSnapshot};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

/// Callback invoked after the snapshot changed.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Source of truth for `{page, size, sort, filters}`.
pub trait StateAdapter<F>: Send + Sync {
    fn get_snapshot(&self) -> TableStateSnapshot<F>;

    fn set_snapshot(&self, next: TableStateSnapshot<F>, reason: ChangeReason);

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    fn subscribe(&self, listener: Listener) -> Subscription;

    /// Opaque key identifying where the state lives (e.g. a URL search string).
    fn search_key(&self) -> Option<String> {
        None
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ListenerMap {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// A set of listeners shared between an adapter and its subscriptions.
#[derive(Default)]
pub struct Listeners {
    inner: Mutex<ListenerMap>,
}

impl Listeners {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = {
            let mut map = lock(&self.inner);
            let id = map.next_id;
            map.next_id += 1;
            map.entries.insert(id, listener);
            id
        };
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        lock(&self.inner).entries.remove(&id);
    }

    /// Call every listener in registration order.
    ///
    /// Listeners run outside the lock, so they may subscribe or read the
    /// adapter themselves.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = lock(&self.inner).entries.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Handle returned by [`StateAdapter::subscribe`]; unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

/// Adapter that keeps the snapshot in memory.
#[derive(Debug)]
pub struct MemoryStateAdapter<F> {
    state: Mutex<MemoryState<F>>,
    listeners: Arc<Listeners>,
}

#[derive(Debug)]
struct MemoryState<F> {
    snapshot: TableStateSnapshot<F>,
    history: Vec<ChangeReason>,
}

impl<F: Filters> MemoryStateAdapter<F> {
    pub fn new(initial: TableStateSnapshot<F>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                snapshot: initial,
                history: Vec::new(),
            }),
            listeners: Listeners::new_shared(),
        }
    }

    /// Reasons of every applied change, oldest first.
    pub fn history(&self) -> Vec<ChangeReason> {
        lock(&self.state).history.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<F: Filters> StateAdapter<F> for MemoryStateAdapter<F> {
    fn get_snapshot(&self) -> TableStateSnapshot<F> {
        lock(&self.state).snapshot.clone()
    }

    fn set_snapshot(&self, next: TableStateSnapshot<F>, reason: ChangeReason) {
        {
            let mut state = lock(&self.state);
            if state.snapshot == next {
                trace!(%reason, "snapshot unchanged; skipping notify");
                return;
            }
            state.snapshot = next;
            state.history.push(reason);
        }
        self.listeners.notify();
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.add(listener)
    }
}
