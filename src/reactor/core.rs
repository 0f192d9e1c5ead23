use crate::runtime::context;
use crate::runtime::queue::TickQueue;
use crate::timer::{TimerDriver, TimerHandle};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

struct LoopInner {
    ticks: TickQueue,
    timers: RefCell<TimerDriver>,
    running: Cell<bool>,
    depth: Cell<usize>,
}

/// Single-threaded run-to-completion scheduler.
///
/// Cloning an `EventLoop` yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LoopInner {
                ticks: TickQueue::new(),
                timers: RefCell::new(TimerDriver::new()),
                running: Cell::new(false),
                depth: Cell::new(0),
            }),
        }
    }

    /// Returns the loop of the runtime the caller is running in.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn current() -> Self {
        context::current_runtime("EventLoop::current()")
            .event_loop
            .clone()
    }

    /// Schedules `callback` to run once after `delay`.
    pub fn add_timer<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        self.inner
            .timers
            .borrow_mut()
            .register(delay, Box::new(callback))
    }

    /// Cancels a timer that has not fired yet. No-op otherwise.
    pub fn cancel_timer(&self, handle: &TimerHandle) {
        let removed = self.inner.timers.borrow_mut().cancel(handle);

        log::trace!("cancel_timer: removed={}", removed);
    }

    /// Schedules `callback` for the next loop iteration, ahead of timers.
    pub fn future_tick<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.ticks.push(Box::new(callback));
    }

    /// Asks a running [`EventLoop::run`] to return after its current phase.
    pub fn stop(&self) {
        self.inner.running.set(false);
    }

    /// True while at least one `run()` call is active.
    pub fn is_running(&self) -> bool {
        self.inner.depth.get() > 0
    }

    /// True if ticks or timers are queued.
    pub fn has_pending_work(&self) -> bool {
        !self.inner.ticks.is_empty() || !self.inner.timers.borrow().is_empty()
    }

    /// Runs queued ticks and timers until stopped or out of work.
    ///
    /// Each iteration drains the ticks queued so far, then fires every timer
    /// whose deadline has passed. When only future timers remain the thread
    /// sleeps until the nearest deadline.
    pub fn run(&self) {
        let inner = &self.inner;

        let outer = inner.running.replace(true);
        inner.depth.set(inner.depth.get() + 1);

        while inner.running.get() {
            inner.ticks.drain();

            if !inner.running.get() {
                break;
            }

            self.fire_timers();

            if !inner.running.get() {
                break;
            }

            if !inner.ticks.is_empty() {
                continue;
            }

            let next = inner.timers.borrow().next_remaining();

            match next {
                Some(remaining) if remaining > Duration::ZERO => std::thread::sleep(remaining),
                Some(_) => {}
                None => break,
            }
        }

        // A nested run that went idle hands control back to the outer run;
        // an explicit stop() ends both.
        let stop_requested = !inner.running.get();
        inner.running.set(outer && !stop_requested);
        inner.depth.set(inner.depth.get() - 1);
    }

    fn fire_timers(&self) {
        let now = std::time::Instant::now();

        loop {
            let expired = self.inner.timers.borrow_mut().pop_expired(now);

            match expired {
                Some(callback) => callback(),
                None => break,
            }

            if !self.inner.running.get() {
                break;
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("ticks", &self.inner.ticks.len())
            .field("timers", &self.inner.timers.borrow().len())
            .field("running", &self.is_running())
            .finish()
    }
}
