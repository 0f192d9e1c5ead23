//! Per-task cancellation bookkeeping.
//!
//! Every live task owns one entry: a cancellation flag, a weak reference to
//! the promise it is currently awaiting, and the task's fiber. Entries live
//! in a generational slab, so a [`TaskId`] that outlived its task simply
//! misses.
//!
//! The entry is the only owner of a suspended fiber. Dropping the registry
//! (with its runtime) unwinds the stacks of tasks that never finished.

use crate::fiber::Fiber;
use crate::promise::Cancellable;
use crate::utils::slab::{Key, Slab};

use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a task spawned through [`async_`](crate::async_) or
/// [`spawn`](crate::spawn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Key);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}.{}", self.0.index, self.0.generation)
    }
}

#[derive(Default)]
struct RegistryEntry {
    cancelled: bool,
    pending: Option<Weak<dyn Cancellable>>,
    fiber: Option<Rc<Fiber>>,
}

/// Table of live tasks, owned by the runtime.
pub(crate) struct Registry {
    entries: Slab<RegistryEntry>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Slab::new(),
        }
    }

    /// Adds an entry for a new task.
    pub(crate) fn register(&mut self) -> TaskId {
        let id = TaskId(self.entries.insert(RegistryEntry::default()));

        log::trace!("registry: registered {}", id);

        id
    }

    /// Hands ownership of the task's fiber to its entry.
    pub(crate) fn attach(&mut self, id: TaskId, fiber: Rc<Fiber>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.fiber = Some(fiber);
        }
    }

    /// Drops the entry of a terminated task.
    ///
    /// The fiber is handed back so the caller can release it once the
    /// registry is no longer borrowed.
    pub(crate) fn unregister(&mut self, id: TaskId) -> Option<Rc<Fiber>> {
        let entry = self.entries.remove(id.0)?;
        log::trace!("registry: unregistered {}", id);

        entry.fiber
    }

    /// Marks the task cancelled and returns the promise it is waiting on.
    ///
    /// Forwarding the cancellation is left to the caller so that it runs with
    /// the registry no longer borrowed: cancelling a promise may resume the
    /// task, which in turn touches the registry again.
    pub(crate) fn cancel(&mut self, id: TaskId) -> Option<Rc<dyn Cancellable>> {
        let entry = self.entries.get_mut(id.0)?;
        entry.cancelled = true;

        entry.pending.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn is_cancelled(&self, id: TaskId) -> bool {
        self.entries
            .get(id.0)
            .map(|entry| entry.cancelled)
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, id: TaskId) -> bool {
        self.entries.contains(id.0)
    }

    /// Records the promise the task is about to suspend on.
    pub(crate) fn set_pending_future(&mut self, id: TaskId, pending: Weak<dyn Cancellable>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.pending = Some(pending);
        }
    }

    pub(crate) fn clear_pending_future(&mut self, id: TaskId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.pending = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_future(&self, id: TaskId) -> Option<Rc<dyn Cancellable>> {
        self.entries
            .get(id.0)?
            .pending
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
