//! Runtime owning the event loop, the task registry and the root driver.
//!
//! `block_on` runs a closure on the root context with the runtime installed
//! in thread-local storage, then drains whatever loop work the closure left
//! behind, much like an executor that runs every spawned task before
//! returning.

use crate::fiber::registry::{Registry, TaskId};
use crate::promise::Cancellable;
use crate::reactor::core::EventLoop;
use crate::runtime::context::enter_context;
use crate::runtime::driver::Driver;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Default stack size of task fibers and of the driver coroutine.
pub(crate) const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Smallest stack size accepted by [`RuntimeBuilder`](crate::RuntimeBuilder).
pub(crate) const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Config {
    pub(crate) stack_size: usize,
    pub(crate) drain_on_shutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            drain_on_shutdown: true,
        }
    }
}

/// State shared by the runtime handle, its fibers and its promise handlers.
pub(crate) struct RuntimeInner {
    pub(crate) event_loop: EventLoop,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) driver: Driver,
    pub(crate) config: Config,
}

impl RuntimeInner {
    /// Cancels the task `id`: sets its flag and forwards the cancellation to
    /// the promise it is awaiting, if any.
    ///
    /// Unknown or terminated tasks are ignored.
    pub(crate) fn cancel_task(&self, id: TaskId) {
        let target = self.registry.borrow_mut().cancel(id);

        log::debug!(
            "cancel {}: forwarding to pending promise={}",
            id,
            target.is_some()
        );

        // The registry borrow is released before the promise's canceller runs.
        if let Some(target) = target {
            target.cancel();
        }
    }

    pub(crate) fn is_cancelled(&self, id: TaskId) -> bool {
        self.registry.borrow().is_cancelled(id)
    }

    pub(crate) fn set_pending_future(&self, id: TaskId, pending: Weak<dyn Cancellable>) {
        self.registry.borrow_mut().set_pending_future(id, pending);
    }

    pub(crate) fn clear_pending_future(&self, id: TaskId) {
        self.registry.borrow_mut().clear_pending_future(id);
    }
}

/// Single-threaded runtime for fiber-based tasks.
///
/// # Example
/// ```ignore
/// use reactor_async::{Runtime, await_, spawn, delay_secs};
///
/// let rt = Runtime::new();
/// let value = rt.block_on(|| {
///     let task = spawn(|| {
///         delay_secs(0.01)?;
///         Ok(42)
///     });
///     await_(task)
/// });
/// assert_eq!(value.unwrap(), 42);
/// ```
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub(crate) fn with_config(config: Config) -> Self {
        log::debug!(
            "runtime: stack_size={} drain_on_shutdown={}",
            config.stack_size,
            config.drain_on_shutdown
        );

        Self {
            inner: Rc::new(RuntimeInner {
                event_loop: EventLoop::new(),
                registry: RefCell::new(Registry::new()),
                driver: Driver::new(config.stack_size),
                config,
            }),
        }
    }

    /// Runs `function` on the root context of this runtime.
    ///
    /// Inside the closure, `await_` drives the event loop until the awaited
    /// promise settles, and `spawn`/`async_` start tasks on this runtime.
    /// Once the closure returns, outstanding loop work is drained unless the
    /// runtime was built with `drain_on_shutdown(false)`.
    ///
    /// # Example
    /// ```ignore
    /// let rt = Runtime::new();
    /// assert_eq!(rt.block_on(|| 1 + 1), 2);
    /// ```
    pub fn block_on<F, R>(&self, function: F) -> R
    where
        F: FnOnce() -> R,
    {
        enter_context(self.inner.clone(), || {
            let result = function();

            if self.inner.config.drain_on_shutdown {
                self.shutdown();
            }

            result
        })
    }

    /// Handle to the runtime's event loop.
    pub fn event_loop(&self) -> EventLoop {
        self.inner.event_loop.clone()
    }

    /// Number of tasks that have started and not yet terminated.
    pub fn active_tasks(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    // Drain outstanding work on the driver, like every other loop run.
    fn shutdown(&self) {
        if self.inner.event_loop.is_running() {
            return;
        }

        if let Err(error) = self.inner.driver.drain(&self.inner.event_loop) {
            log::warn!("runtime: could not drain on a driver ({}), running the loop in place", error);
            self.inner.event_loop.run();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
