//! FIFO queue of callbacks deferred to the next loop iteration.

use std::cell::RefCell;
use std::collections::VecDeque;

pub(crate) type TickCallback = Box<dyn FnOnce()>;

/// Queue backing [`EventLoop::future_tick`](crate::EventLoop::future_tick).
///
/// Draining only runs the callbacks that were queued when the drain started;
/// callbacks queued from inside a tick wait for the next iteration.
pub(crate) struct TickQueue {
    queue: RefCell<VecDeque<TickCallback>>,
}

impl TickQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    /// Enqueues a callback at the back of the queue.
    pub(crate) fn push(&self, callback: TickCallback) {
        self.queue.borrow_mut().push_back(callback);
    }

    /// Dequeues the next callback, if any.
    pub(crate) fn pop(&self) -> Option<TickCallback> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Runs the callbacks queued so far and returns how many ran.
    pub(crate) fn drain(&self) -> usize {
        let count = self.len();

        for _ in 0..count {
            // No borrow is held while the callback runs.
            let Some(callback) = self.pop() else { break };
            callback();
        }

        count
    }
}
