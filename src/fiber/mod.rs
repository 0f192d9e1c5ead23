//! Stackful fibers backing every task.
//!
//! A [`Fiber`] wraps one `corosensei` coroutine with its own stack. Suspending
//! a fiber keeps its whole call stack alive, so an error delivered on resume
//! surfaces at the exact call site of the suspension, inside whatever error
//! handling the task has in scope there.
//!
//! - [`registry`]: per-task cancellation state keyed by [`TaskId`]
//! - [`suspension`]: the resume/throw/suspend handle used by `await_`

pub mod registry;
pub mod suspension;

use crate::error::Error;
use crate::runtime::RuntimeInner;

pub use registry::TaskId;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::{Rc, Weak};

type FiberCoroutine = Coroutine<(), (), (), DefaultStack>;

/// Lifecycle of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    NotStarted,
    Running,
    Suspended,
    Terminated,
}

thread_local! {
    // Fibers currently executing, innermost last. A fiber resumed from a
    // promise handler running inside another fiber stacks on top of it.
    static ACTIVE: RefCell<Vec<Rc<Fiber>>> = const { RefCell::new(Vec::new()) };

    // Length of ACTIVE when the innermost generator body was entered. The
    // fibers below it are not the stack that is executing.
    static SUSPEND_FLOOR: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct Fiber {
    id: TaskId,
    runtime: Weak<RuntimeInner>,
    coroutine: RefCell<Option<FiberCoroutine>>,
    // Set by the coroutine body on its first run; valid for as long as the
    // coroutine has not returned.
    yielder: Rc<Cell<*const Yielder<(), ()>>>,
    state: Cell<FiberState>,
}

// Pops the fiber pushed by `resume`, also when the fiber panics.
struct ActiveGuard;

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().pop());
    }
}

/// Marks code running on a generator's own stack.
///
/// While the guard is alive, the fibers that were active when it was created
/// cannot be suspended: their yielder belongs to a different stack.
pub(crate) struct GeneratorScope {
    previous: usize,
}

impl GeneratorScope {
    pub(crate) fn enter() -> Self {
        let depth = ACTIVE.with(|active| active.borrow().len());

        Self {
            previous: SUSPEND_FLOOR.with(|floor| floor.replace(depth)),
        }
    }
}

impl Drop for GeneratorScope {
    fn drop(&mut self) {
        SUSPEND_FLOOR.with(|floor| floor.set(self.previous));
    }
}

impl Fiber {
    /// Allocates a fiber that runs `body` on its first resume.
    pub(crate) fn new<F>(id: TaskId, runtime: &Rc<RuntimeInner>, body: F) -> Result<Rc<Self>, Error>
    where
        F: FnOnce() + 'static,
    {
        let stack = DefaultStack::new(runtime.config.stack_size)
            .map_err(|error| Error::Stack(error.to_string()))?;

        let yielder = Rc::new(Cell::new(ptr::null()));
        let slot = yielder.clone();

        let coroutine = Coroutine::with_stack(stack, move |handle: &Yielder<(), ()>, ()| {
            slot.set(handle as *const Yielder<(), ()>);
            body();
        });

        Ok(Rc::new(Self {
            id,
            runtime: Rc::downgrade(runtime),
            coroutine: RefCell::new(Some(coroutine)),
            yielder,
            state: Cell::new(FiberState::NotStarted),
        }))
    }

    /// Returns the innermost fiber currently executing on this thread.
    pub(crate) fn current() -> Option<Rc<Fiber>> {
        ACTIVE.with(|active| active.borrow().last().cloned())
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn state(&self) -> FiberState {
        self.state.get()
    }

    pub(crate) fn runtime(&self) -> Option<Rc<RuntimeInner>> {
        self.runtime.upgrade()
    }

    /// Starts or continues the fiber until it suspends or returns.
    ///
    /// # Panics
    /// Panics if the fiber is running or has terminated.
    pub(crate) fn resume(self: &Rc<Self>) {
        let coroutine = self.coroutine.borrow_mut().take();

        let Some(mut coroutine) = coroutine else {
            panic!("cannot resume {}: fiber is {:?}", self.id, self.state.get());
        };

        log::trace!("{}: resume from {:?}", self.id, self.state.get());

        self.state.set(FiberState::Running);
        ACTIVE.with(|active| active.borrow_mut().push(self.clone()));

        let result = {
            let _active = ActiveGuard;
            panic::catch_unwind(AssertUnwindSafe(|| coroutine.resume(())))
        };

        match result {
            Ok(CoroutineResult::Yield(())) => {
                *self.coroutine.borrow_mut() = Some(coroutine);
                self.state.set(FiberState::Suspended);
                log::trace!("{}: suspended", self.id);
            }
            Ok(CoroutineResult::Return(())) => {
                self.state.set(FiberState::Terminated);
                log::trace!("{}: terminated", self.id);
            }
            Err(payload) => {
                self.state.set(FiberState::Terminated);
                panic::resume_unwind(payload);
            }
        }
    }

    /// Suspends the calling fiber until the next [`Fiber::resume`].
    ///
    /// The handle is released before switching out: while suspended, a fiber
    /// is owned by the registry, never by its own stack.
    ///
    /// # Panics
    /// Panics if `self` is not the innermost running fiber, or if the call
    /// comes from a generator body running on top of it.
    pub(crate) fn suspend(self: Rc<Self>) {
        let depth = ACTIVE.with(|active| active.borrow().len());

        if depth > 0 && depth <= SUSPEND_FLOOR.with(Cell::get) {
            panic!(
                "await_() called inside a generator body; yield the promise with Co::yield_() instead"
            );
        }

        let is_current = Fiber::current().is_some_and(|fiber| Rc::ptr_eq(&fiber, &self));

        if !is_current || self.state.get() != FiberState::Running {
            panic!("{} can only be suspended from its own stack", self.id);
        }

        let yielder = self.yielder.get();
        assert!(!yielder.is_null(), "{} suspended before it started", self.id);

        drop(self);

        // SAFETY: the pointer was taken from the `&Yielder` handed to this
        // coroutine's body, which lives on the coroutine stack until the body
        // returns. The fiber is the innermost active one and no generator
        // stack sits above it, so we are running on that stack and the body
        // has not returned.
        unsafe { (*yielder).suspend(()) }
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        // A coroutine dropped while suspended is force-unwound by corosensei,
        // running the destructors still live on its stack.
        if self.state.get() == FiberState::Suspended {
            log::trace!("{}: dropped while suspended", self.id);
        }
    }
}
