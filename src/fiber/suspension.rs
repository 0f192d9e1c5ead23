//! Resume/throw/suspend handle for the current execution context.
//!
//! A [`Suspension`] is bound to the context that created it: either a task
//! fiber or the root context (the closure passed to `Runtime::block_on`).
//! [`Suspension::suspend`] pauses that context until someone calls
//! [`Suspension::resume`] or [`Suspension::throw`].
//!
//! Outcomes are delivered through a one-shot slot:
//!
//! - delivered while the fiber is suspended: the fiber resumes right away;
//! - delivered before the fiber suspends (the promise settled synchronously):
//!   the outcome is buffered and `suspend` returns it without switching;
//! - delivered to the root context: the outcome is stored and the event loop
//!   stopped, which hands control back from the driver to the root.
//!
//! Only the first delivery counts; later ones are ignored.
//!
//! A suspension refers to its fiber weakly. A suspended task is kept alive
//! by the runtime's registry, so handlers that can never fire do not keep a
//! fiber stack around once the runtime is gone.

use crate::error::Error;
use crate::fiber::{Fiber, FiberState, TaskId};
use crate::runtime::RuntimeInner;
use crate::runtime::context;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

struct Inner<T> {
    task: Option<TaskId>,
    fiber: Option<Weak<Fiber>>,
    runtime: Weak<RuntimeInner>,
    outcome: RefCell<Option<Result<T, Error>>>,
    // Root context only: true while `suspend` is spinning the driver.
    waiting: Cell<bool>,
}

/// Handle used to suspend the current context and resume it later.
///
/// Cloning yields another handle to the same suspension.
///
/// # Example
/// ```ignore
/// use reactor_async::{Suspension, EventLoop};
/// use std::time::Duration;
///
/// let suspension = Suspension::<u32>::current();
/// let handle = suspension.clone();
/// EventLoop::current().add_timer(Duration::from_millis(5), move || handle.resume(7));
/// assert_eq!(suspension.suspend().unwrap(), 7);
/// ```
pub struct Suspension<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Suspension<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Suspension<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("task", &self.task())
            .field("ready", &self.inner.outcome.borrow().is_some())
            .finish()
    }
}

impl<T> Suspension<T> {
    /// Task this suspension belongs to, or `None` for the root context.
    pub fn task(&self) -> Option<TaskId> {
        self.inner.task
    }

    pub(crate) fn runtime(&self) -> Weak<RuntimeInner> {
        self.inner.runtime.clone()
    }

    /// True once an outcome has been delivered and not yet consumed.
    pub fn is_ready(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    /// Takes a buffered outcome without suspending.
    pub(crate) fn take_ready(&self) -> Option<Result<T, Error>> {
        self.inner.outcome.borrow_mut().take()
    }
}

impl<T: 'static> Suspension<T> {
    /// Creates a suspension for the calling context.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn current() -> Self {
        let fiber = Fiber::current();

        let runtime = match fiber.as_ref().and_then(|fiber| fiber.runtime()) {
            Some(runtime) => runtime,
            None => context::current_runtime("Suspension::current()"),
        };

        Self {
            inner: Rc::new(Inner {
                task: fiber.as_ref().map(|fiber| fiber.id()),
                fiber: fiber.as_ref().map(Rc::downgrade),
                runtime: Rc::downgrade(&runtime),
                outcome: RefCell::new(None),
                waiting: Cell::new(false),
            }),
        }
    }

    /// Delivers a value to the suspended context.
    pub fn resume(&self, value: T) {
        self.deliver(Ok(value));
    }

    /// Delivers an error; `suspend` returns it as `Err`.
    ///
    /// Non-error rejection values are normalized to
    /// [`Error::UnexpectedValue`].
    pub fn throw(&self, error: Error) {
        self.deliver(Err(error.normalize()));
    }

    /// Pauses the calling context until an outcome is delivered.
    ///
    /// Inside a task the fiber is switched out. On the root context the event
    /// loop runs on the driver coroutine until the outcome arrives; if the
    /// loop stops first, [`Error::LoopStopped`] is returned.
    ///
    /// # Panics
    /// Panics when called from a different context than the one the
    /// suspension was created in, or from a loop callback outside any task.
    pub fn suspend(&self) -> Result<T, Error> {
        if let Some(outcome) = self.take_ready() {
            return outcome;
        }

        let Some(fiber) = &self.inner.fiber else {
            return self.suspend_root();
        };

        match fiber.upgrade() {
            Some(fiber) => fiber.suspend(),
            None => panic!("Suspension::suspend() called after its task was dropped"),
        }

        match self.take_ready() {
            Some(outcome) => outcome,
            None => panic!("{:?} resumed without an outcome", self.inner.task),
        }
    }

    fn suspend_root(&self) -> Result<T, Error> {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return Err(Error::LoopStopped);
        };

        if Fiber::current().is_some() {
            panic!("Suspension created on the root context cannot suspend a task");
        }

        self.inner.waiting.set(true);
        let waited = runtime.driver.wait(&runtime.event_loop);
        self.inner.waiting.set(false);

        waited?;

        self.take_ready().unwrap_or(Err(Error::LoopStopped))
    }

    fn deliver(&self, outcome: Result<T, Error>) {
        {
            let mut slot = self.inner.outcome.borrow_mut();

            if slot.is_some() {
                log::trace!("suspension: outcome already delivered, ignoring");
                return;
            }

            *slot = Some(outcome);
        }

        match &self.inner.fiber {
            Some(fiber) => match fiber.upgrade() {
                Some(fiber) => match fiber.state() {
                    FiberState::Suspended => fiber.resume(),
                    // Settled before the fiber suspended; `suspend` picks it up.
                    FiberState::Running => {}
                    state => panic!("cannot deliver to {}: fiber is {:?}", fiber.id(), state),
                },
                None => log::trace!("suspension: {:?} is gone, dropping outcome", self.inner.task),
            },
            None => {
                if self.inner.waiting.get()
                    && let Some(runtime) = self.inner.runtime.upgrade()
                {
                    runtime.event_loop.stop();
                }
            }
        }
    }
}
