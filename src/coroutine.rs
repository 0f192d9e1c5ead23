//! Generator-driven coroutines.
//!
//! [`coroutine`] runs a [`Generator`] that yields promises: each yielded
//! promise is awaited by the driver, and its value (or error) is sent back
//! into the generator at the yield point. The generator's return value
//! becomes the value of the promise returned by `coroutine`.
//!
//! Unlike tasks, a coroutine never suspends its caller: everything happens
//! from promise handlers.
//!
//! # Example
//! ```ignore
//! use reactor_async::{coroutine, Generator, Promise, Routine};
//!
//! let promise = coroutine(|| {
//!     Ok(Routine::from(Generator::new(|co| {
//!         let a = co.yield_(Promise::resolved(1))?;
//!         let b = co.yield_(Promise::resolved(2))?;
//!         Ok(a + b)
//!     })?))
//! });
//! ```

use crate::error::Error;
use crate::fiber::GeneratorScope;
use crate::promise::{Deferred, Promise, Resolver};
use crate::runtime::context;
use crate::runtime::core::DEFAULT_STACK_SIZE;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

enum Resume<T> {
    Start,
    Fulfilled(T),
    Rejected(Error),
}

/// Yield handle passed to the body of a [`Generator`].
pub struct Co<'y, T> {
    yielder: &'y Yielder<Resume<T>, Promise<T>>,
}

impl<T> Co<'_, T> {
    /// Hands `promise` to the driver and waits for its outcome.
    ///
    /// Returns the fulfilled value, or the rejection as `Err` (non-error
    /// rejection values are normalized to `Error::UnexpectedValue`).
    pub fn yield_(&self, promise: Promise<T>) -> Result<T, Error> {
        match self.yielder.suspend(promise) {
            Resume::Fulfilled(value) => Ok(value),
            Resume::Rejected(error) => Err(error),
            Resume::Start => unreachable!("generator restarted"),
        }
    }
}

type GeneratorCoroutine<T, R> = Coroutine<Resume<T>, Promise<T>, Result<R, Error>, DefaultStack>;

enum Step<T, R> {
    Yielded(Promise<T>),
    Complete(Result<R, Error>),
}

/// Lazy sequence of promises ending with a value of type `R`.
///
/// The body runs on its own stack and must hand promises to the driver with
/// [`Co::yield_`]. Calling `await_` from inside the body panics once it would
/// have to suspend.
pub struct Generator<T: 'static, R: 'static> {
    coroutine: GeneratorCoroutine<T, R>,
}

impl<T: 'static, R: 'static> Generator<T, R> {
    /// Creates a generator running `body` on its own stack.
    ///
    /// Nothing runs until the generator is driven by [`coroutine`].
    pub fn new<F>(body: F) -> Result<Self, Error>
    where
        F: FnOnce(&Co<'_, T>) -> Result<R, Error> + 'static,
    {
        let stack_size = context::try_current_runtime()
            .map(|runtime| runtime.config.stack_size)
            .unwrap_or(DEFAULT_STACK_SIZE);
        let stack = DefaultStack::new(stack_size).map_err(|error| Error::Stack(error.to_string()))?;

        let coroutine = Coroutine::with_stack(
            stack,
            move |yielder: &Yielder<Resume<T>, Promise<T>>, _start: Resume<T>| {
                body(&Co { yielder })
            },
        );

        Ok(Self { coroutine })
    }

    fn step(&mut self, input: Resume<T>) -> Step<T, R> {
        let _scope = GeneratorScope::enter();

        match self.coroutine.resume(input) {
            CoroutineResult::Yield(promise) => Step::Yielded(promise),
            CoroutineResult::Return(result) => Step::Complete(result),
        }
    }
}

/// What the function passed to [`coroutine`] produced.
pub enum Routine<T: 'static, R: 'static> {
    /// A plain value; the coroutine resolves with it right away.
    Value(R),
    /// A generator to drive.
    Generator(Generator<T, R>),
}

impl<T: 'static, R: 'static> From<Generator<T, R>> for Routine<T, R> {
    fn from(generator: Generator<T, R>) -> Self {
        Routine::Generator(generator)
    }
}

struct Driver<T: 'static, R: 'static> {
    generator: RefCell<Option<Generator<T, R>>>,
    current: RefCell<Option<Promise<T>>>,
    resolver: Resolver<R>,
    // Outcome of a yield that settled while `step` was still on the stack.
    queued: RefCell<Option<Resume<T>>>,
    stepping: Cell<bool>,
}

impl<T: Clone + 'static, R: Clone + 'static> Driver<T, R> {
    /// Feeds `input` to the generator and keeps going for as long as the
    /// yielded promises settle synchronously.
    ///
    /// Re-entrant calls from handlers only queue their input, so the stack
    /// depth does not grow with the number of yields.
    fn step(self: &Rc<Self>, input: Resume<T>) {
        if self.stepping.get() {
            *self.queued.borrow_mut() = Some(input);
            return;
        }

        self.stepping.set(true);

        let mut input = input;
        loop {
            self.step_once(input);

            let Some(next) = self.queued.borrow_mut().take() else {
                break;
            };
            input = next;
        }

        self.stepping.set(false);
    }

    fn step_once(self: &Rc<Self>, input: Resume<T>) {
        // Taken out while it runs, so handlers firing synchronously from the
        // generator body never see it borrowed.
        let Some(mut generator) = self.generator.borrow_mut().take() else {
            return;
        };

        match generator.step(input) {
            Step::Yielded(promise) => {
                *self.generator.borrow_mut() = Some(generator);
                *self.current.borrow_mut() = Some(promise.clone());

                let on_fulfilled = {
                    let driver = self.clone();
                    move |value: T| {
                        driver.current.borrow_mut().take();
                        driver.step(Resume::Fulfilled(value));
                    }
                };

                let on_rejected = {
                    let driver = self.clone();
                    move |error: Error| {
                        driver.current.borrow_mut().take();
                        driver.step(Resume::Rejected(error.normalize()));
                    }
                };

                promise.then(on_fulfilled, on_rejected);
            }
            Step::Complete(result) => {
                drop(generator);

                match result {
                    Ok(value) => self.resolver.resolve(value),
                    Err(error) => self.resolver.reject(error),
                }
            }
        }
    }
}

/// Runs `function` and drives the generator it returns.
///
/// - `function` fails: the returned promise is already rejected.
/// - it returns [`Routine::Value`]: the promise is already resolved.
/// - it returns a generator: the promise settles with the generator's
///   result once every yielded promise has been driven.
///
/// Cancelling the returned promise cancels the promise currently yielded.
pub fn coroutine<T, R, F>(function: F) -> Promise<R>
where
    F: FnOnce() -> Result<Routine<T, R>, Error>,
    T: Clone + 'static,
    R: Clone + 'static,
{
    let generator = match function() {
        Err(error) => return Promise::rejected(error),
        Ok(Routine::Value(value)) => return Promise::resolved(value),
        Ok(Routine::Generator(generator)) => generator,
    };

    let cancel_target: Rc<RefCell<Option<Weak<Driver<T, R>>>>> = Rc::new(RefCell::new(None));

    let deferred = {
        let cancel_target = cancel_target.clone();
        Deferred::with_canceller(move |_| {
            let driver = cancel_target.borrow().as_ref().and_then(|weak| weak.upgrade());

            if let Some(driver) = driver {
                let current = driver.current.borrow_mut().take();
                if let Some(current) = current {
                    current.cancel();
                }
            }
            Ok(())
        })
    };

    let driver = Rc::new(Driver {
        generator: RefCell::new(Some(generator)),
        current: RefCell::new(None),
        resolver: deferred.resolver(),
        queued: RefCell::new(None),
        stepping: Cell::new(false),
    });
    *cancel_target.borrow_mut() = Some(Rc::downgrade(&driver));

    driver.step(Resume::Start);

    deferred.promise()
}
