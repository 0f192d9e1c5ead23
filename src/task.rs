//! Tasks: fiber-backed functions that look synchronous.
//!
//! [`spawn`] (and the [`async_`] wrapper built on it) runs a function on a
//! fresh fiber and returns a [`Promise`] for its result. Inside the function,
//! [`await_`] blocks the task, not the thread, until a promise settles.
//!
//! # Starting tasks
//!
//! The function body starts immediately: it runs synchronously up to its
//! first suspension (or to completion) before `spawn` returns.
//!
//! ```ignore
//! use reactor_async::{Runtime, await_, spawn, delay_secs};
//!
//! Runtime::new().block_on(|| {
//!     let task = spawn(|| {
//!         delay_secs(0.01)?;
//!         Ok("done")
//!     });
//!     assert_eq!(await_(task).unwrap(), "done");
//! });
//! ```
//!
//! # Cancellation
//!
//! Cancelling the promise returned by `spawn` forwards the cancellation to
//! the one promise the task is awaiting at that moment. Its rejection
//! surfaces at that `await_` call, where the task may handle it like any
//! other error:
//!
//! ```ignore
//! let task = spawn(|| match await_(never_settles()) {
//!     Err(error) if error.is_cancelled() => Ok(42),
//!     other => other,
//! });
//! task.cancel(); // task resolves with 42
//! ```
//!
//! Later awaits of a cancelled task are not cancelled automatically; the task
//! can check [`is_cancelled`] to stop cooperatively.

use crate::error::Error;
use crate::fiber::registry::TaskId;
use crate::fiber::suspension::Suspension;
use crate::fiber::Fiber;
use crate::promise::{Deferred, Promise};
use crate::runtime::RuntimeInner;
use crate::runtime::context;

use std::rc::{Rc, Weak};

/// Blocks the current task until `promise` settles.
///
/// Returns the fulfilled value, or the rejection reason as `Err`. A rejection
/// with a non-error value is reported as [`Error::UnexpectedValue`]; every
/// other error is returned unchanged.
///
/// An already settled promise returns immediately, without yielding to the
/// event loop. Called outside of any task (inside `Runtime::block_on`), the
/// event loop runs until the promise settles; if the loop stops or runs out
/// of work first, [`Error::LoopStopped`] is returned.
///
/// # Panics
/// Panics outside of a runtime context, or when called from an event loop
/// callback that is not part of a task.
pub fn await_<T>(promise: Promise<T>) -> Result<T, Error>
where
    T: Clone + 'static,
{
    let suspension = Suspension::<T>::current();
    let task = suspension.task();
    let runtime = suspension.runtime();

    let on_fulfilled = {
        let suspension = suspension.clone();
        let runtime = runtime.clone();
        move |value: T| {
            clear_pending(&runtime, task);
            suspension.resume(value);
        }
    };

    let on_rejected = {
        let suspension = suspension.clone();
        let runtime = runtime.clone();
        move |error: Error| {
            clear_pending(&runtime, task);
            suspension.throw(error);
        }
    };

    promise.then(on_fulfilled, on_rejected);

    if let Some(outcome) = suspension.take_ready() {
        return outcome;
    }

    if let Some(id) = task
        && let Some(runtime) = runtime.upgrade()
    {
        runtime.set_pending_future(id, promise.downgrade());
    }

    let outcome = suspension.suspend();

    // The promise stays alive on this stack while suspended, so a pending
    // cancellation can still reach it through the registry.
    drop(promise);

    outcome
}

fn clear_pending(runtime: &Weak<RuntimeInner>, task: Option<TaskId>) {
    if let Some(id) = task
        && let Some(runtime) = runtime.upgrade()
    {
        runtime.clear_pending_future(id);
    }
}

// Unregisters the task when its body returns, panics or is unwound.
struct Registration {
    runtime: Weak<RuntimeInner>,
    id: TaskId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            let fiber = runtime.registry.borrow_mut().unregister(self.id);
            drop(fiber);
        }
    }
}

/// Runs `function` as a new task and returns a promise for its result.
///
/// The function starts right away on its own fiber and runs until its first
/// suspension before `spawn` returns. Cancelling the returned promise cancels
/// the promise the task is currently awaiting.
///
/// # Panics
/// Panics if called outside of a runtime context.
pub fn spawn<T, F>(function: F) -> Promise<T>
where
    F: FnOnce() -> Result<T, Error> + 'static,
    T: Clone + 'static,
{
    let runtime = context::current_runtime("spawn()");
    let id = runtime.registry.borrow_mut().register();

    let deferred = {
        let runtime = Rc::downgrade(&runtime);
        Deferred::with_canceller(move |_| {
            if let Some(runtime) = runtime.upgrade() {
                runtime.cancel_task(id);
            }
            Ok(())
        })
    };

    let resolver = deferred.resolver();
    let registration = Registration {
        runtime: Rc::downgrade(&runtime),
        id,
    };

    let body = move || {
        let result = function();
        drop(registration);

        match result {
            Ok(value) => resolver.resolve(value),
            Err(error) => resolver.reject(error),
        }
    };

    match Fiber::new(id, &runtime, body) {
        Ok(fiber) => {
            log::trace!("{}: spawned", id);
            runtime.registry.borrow_mut().attach(id, fiber.clone());
            fiber.resume();
        }
        Err(error) => {
            log::debug!("{}: could not start: {}", id, error);
            runtime.registry.borrow_mut().unregister(id);
            deferred.reject(error);
        }
    }

    deferred.promise()
}

/// Wraps `function` so that every call starts a new task.
///
/// The returned closure takes the function's argument (use a tuple for
/// several, `()` for none) and returns a promise, like [`spawn`].
///
/// # Example
/// ```ignore
/// let double = async_(|n: u32| {
///     delay_secs(0.01)?;
///     Ok(n * 2)
/// });
/// assert_eq!(await_(double(21)).unwrap(), 42);
/// ```
pub fn async_<A, T, F>(function: F) -> impl Fn(A) -> Promise<T>
where
    F: Fn(A) -> Result<T, Error> + 'static,
    A: 'static,
    T: Clone + 'static,
{
    let function = Rc::new(function);

    move |args: A| {
        let function = function.clone();
        spawn(move || function(args))
    }
}

/// Returns the id of the task running on the current fiber.
pub fn current_task() -> Option<TaskId> {
    Fiber::current().map(|fiber| fiber.id())
}

/// True if the current task's promise has been cancelled.
///
/// Always false outside of a task.
pub fn is_cancelled() -> bool {
    let Some(fiber) = Fiber::current() else {
        return false;
    };

    fiber
        .runtime()
        .map(|runtime| runtime.is_cancelled(fiber.id()))
        .unwrap_or(false)
}
