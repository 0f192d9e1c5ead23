//! Thread-local runtime context.
//!
//! `Runtime::block_on` installs its runtime here so that the free functions
//! of the crate (`await_`, `spawn`, `delay`, `EventLoop::current`, ...) can
//! find it without an explicit handle. Code running inside a task fiber
//! resolves the runtime through the fiber itself, which keeps working when a
//! fiber is resumed from a promise handler after `block_on` has returned.
//!
//! # Example
//!
//! ```ignore
//! use reactor_async::runtime::context::{enter_context, current_runtime};
//!
//! enter_context(runtime.clone(), || {
//!     let runtime = current_runtime("example()");
//!     // ...
//! });
//! ```

use crate::fiber::Fiber;
use crate::runtime::core::RuntimeInner;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// Runtime of the innermost active `block_on` on this thread.
    ///
    /// Set by [`enter_context`].
    pub(crate) static CURRENT_RUNTIME: RefCell<Option<Rc<RuntimeInner>>> = const { RefCell::new(None) };
}

// Restores the previous runtime on drop, so a panicking closure does not
// leave a stale runtime installed.
struct ContextGuard {
    previous: Option<Rc<RuntimeInner>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();

        CURRENT_RUNTIME.with(|current| *current.borrow_mut() = previous);
    }
}

/// Enters `runtime` for the duration of `function`.
///
/// The previous context is restored on exit, so nested `block_on` calls on
/// different runtimes are allowed.
pub(crate) fn enter_context<F, R>(runtime: Rc<RuntimeInner>, function: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = CURRENT_RUNTIME.with(|current| current.borrow_mut().replace(runtime));
    let _guard = ContextGuard { previous };

    function()
}

/// Returns the runtime the caller is running in, if any.
///
/// The active fiber's runtime wins over the thread-local one.
pub(crate) fn try_current_runtime() -> Option<Rc<RuntimeInner>> {
    if let Some(runtime) = Fiber::current().and_then(|fiber| fiber.runtime()) {
        return Some(runtime);
    }

    CURRENT_RUNTIME.with(|current| current.borrow().clone())
}

/// Returns the runtime the caller is running in.
///
/// # Panics
/// Panics if called outside of `Runtime::block_on` and outside of any task.
/// `caller` names the public entry point in the panic message.
pub(crate) fn current_runtime(caller: &str) -> Rc<RuntimeInner> {
    match try_current_runtime() {
        Some(runtime) => runtime,
        None => panic!("{} called outside of a runtime context", caller),
    }
}
