//! Scheduler-driving coroutine used by root-level awaits.
//!
//! Code running outside of any task (the closure passed to `block_on`) has no
//! fiber of its own to suspend. Instead it hands control to the driver: a
//! lazily created coroutine whose body spins the event loop, suspending back
//! to the root every time the loop stops. A root-level `await_` resumes the
//! driver and checks its outcome once the driver yields.
//!
//! At teardown the driver (a suspended one, or a fresh one when none exists)
//! is resumed with [`DriverCommand::Drain`], which runs the loop until it is
//! idle and lets the driver return.

use crate::error::Error;
use crate::reactor::core::EventLoop;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

/// What the driver should do when resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    /// Run the loop until it stops, then suspend again.
    Run,
    /// Run the loop until it stops, then terminate.
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverState {
    /// No driver exists, or the previous one terminated.
    Idle,
    Running,
    Suspended,
}

type DriverCoroutine = Coroutine<DriverCommand, (), (), DefaultStack>;

pub(crate) struct Driver {
    coroutine: RefCell<Option<DriverCoroutine>>,
    state: Cell<DriverState>,
    stack_size: usize,
}

impl Driver {
    pub(crate) fn new(stack_size: usize) -> Self {
        Self {
            coroutine: RefCell::new(None),
            state: Cell::new(DriverState::Idle),
            stack_size,
        }
    }

    /// Runs `event_loop` on the driver until the loop stops.
    ///
    /// # Panics
    /// Panics if the driver is already running, i.e. when a root-level await
    /// is attempted from an event loop callback that is not part of a task.
    pub(crate) fn wait(&self, event_loop: &EventLoop) -> Result<(), Error> {
        let coroutine = match self.state.get() {
            DriverState::Running => panic!(
                "await_() called from an event loop callback outside of a task; wrap the callback in spawn()"
            ),
            DriverState::Suspended => self.coroutine.borrow_mut().take(),
            DriverState::Idle => None,
        };

        let coroutine = match coroutine {
            Some(coroutine) => coroutine,
            None => self.create(event_loop)?,
        };

        self.step(coroutine, DriverCommand::Run);

        Ok(())
    }

    /// Runs the loop on the driver until it is idle and lets the driver
    /// terminate.
    ///
    /// A suspended driver is resumed one last time; otherwise a fresh one is
    /// created, so loop callbacks always run on the driver's stack.
    pub(crate) fn drain(&self, event_loop: &EventLoop) -> Result<(), Error> {
        let coroutine = match self.state.get() {
            DriverState::Running => return Ok(()),
            DriverState::Suspended => self.coroutine.borrow_mut().take(),
            DriverState::Idle => None,
        };

        let coroutine = match coroutine {
            Some(coroutine) => coroutine,
            None if !event_loop.has_pending_work() => return Ok(()),
            None => self.create(event_loop)?,
        };

        log::debug!("driver: draining outstanding loop work");

        self.step(coroutine, DriverCommand::Drain);

        Ok(())
    }

    fn create(&self, event_loop: &EventLoop) -> Result<DriverCoroutine, Error> {
        let stack =
            DefaultStack::new(self.stack_size).map_err(|error| Error::Stack(error.to_string()))?;
        let event_loop = event_loop.clone();

        log::debug!("driver: created with a {} byte stack", self.stack_size);

        Ok(Coroutine::with_stack(
            stack,
            move |yielder: &Yielder<DriverCommand, ()>, mut command: DriverCommand| loop {
                event_loop.run();

                if command == DriverCommand::Drain {
                    return;
                }

                command = yielder.suspend(());
            },
        ))
    }

    fn step(&self, mut coroutine: DriverCoroutine, command: DriverCommand) {
        self.state.set(DriverState::Running);

        let result = panic::catch_unwind(AssertUnwindSafe(|| coroutine.resume(command)));

        match result {
            Ok(CoroutineResult::Yield(())) => {
                *self.coroutine.borrow_mut() = Some(coroutine);
                self.state.set(DriverState::Suspended);
            }
            Ok(CoroutineResult::Return(())) => {
                log::trace!("driver: terminated");
                self.state.set(DriverState::Idle);
            }
            Err(payload) => {
                // A loop callback panicked; the driver's stack is gone.
                self.state.set(DriverState::Idle);
                panic::resume_unwind(payload);
            }
        }
    }
}
