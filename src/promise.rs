//! Single-threaded, callback-driven promises.
//!
//! A [`Promise`] settles at most once. Handlers attached with
//! [`Promise::then`] run synchronously: at settlement, in attachment order, or
//! immediately when the promise is already settled. A pending promise created
//! with a canceller can be cancelled; the canceller runs at most once and
//! rejects the promise if it returns an error.
//!
//! # Example
//! ```ignore
//! use reactor_async::{Deferred, Error};
//!
//! let deferred = Deferred::new();
//! deferred.promise().then(|v: i32| println!("got {v}"), |e: Error| println!("failed: {e}"));
//! deferred.resolve(42);
//! ```

use crate::error::Error;

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

type Canceller<T> = Box<dyn FnOnce(&Resolver<T>) -> Result<(), Error>>;

struct Handler<T> {
    on_fulfilled: Box<dyn FnOnce(T)>,
    on_rejected: Box<dyn FnOnce(Error)>,
}

enum State<T> {
    Pending(Vec<Handler<T>>),
    Fulfilled(T),
    Rejected(Error),
}

pub(crate) struct Inner<T> {
    state: RefCell<State<T>>,
    canceller: RefCell<Option<Canceller<T>>>,
}

/// Type-erased cancellation target.
///
/// The suspension registry keeps a weak reference to the promise a task is
/// waiting on through this trait, so it can forward cancellation without
/// knowing the promise's value type.
pub trait Cancellable {
    fn cancel(self: Rc<Self>);
}

/// Handle to a value that may not be available yet.
pub struct Promise<T> {
    inner: Rc<Inner<T>>,
}

/// Settles the promise it was created for.
pub struct Resolver<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            State::Pending(_) => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };

        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T: Clone + 'static> Inner<T> {
    fn new(canceller: Option<Canceller<T>>) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(State::Pending(Vec::new())),
            canceller: RefCell::new(canceller),
        })
    }

    fn settle(&self, outcome: Result<T, Error>) {
        let handlers = {
            let mut state = self.state.borrow_mut();

            if !matches!(*state, State::Pending(_)) {
                return;
            }

            let settled = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(error) => State::Rejected(error.clone()),
            };

            match mem::replace(&mut *state, settled) {
                State::Pending(handlers) => handlers,
                _ => unreachable!(),
            }
        };

        // A settled promise can no longer be cancelled; release the captures.
        let canceller = self.canceller.borrow_mut().take();
        drop(canceller);

        for handler in handlers {
            match &outcome {
                Ok(value) => (handler.on_fulfilled)(value.clone()),
                Err(error) => (handler.on_rejected)(error.clone()),
            }
        }
    }
}

impl<T: Clone + 'static> Cancellable for Inner<T> {
    fn cancel(self: Rc<Self>) {
        if !matches!(*self.state.borrow(), State::Pending(_)) {
            return;
        }

        let Some(canceller) = self.canceller.borrow_mut().take() else {
            return;
        };

        let resolver = Resolver {
            inner: self.clone(),
        };

        if let Err(error) = canceller(&resolver) {
            resolver.reject(error);
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Creates a promise and hands its resolver to `executor` right away.
    pub fn new<E>(executor: E) -> Self
    where
        E: FnOnce(Resolver<T>),
    {
        let inner = Inner::new(None);
        executor(Resolver {
            inner: inner.clone(),
        });

        Self { inner }
    }

    /// Creates a cancellable promise.
    ///
    /// `canceller` runs at most once, on the first [`Promise::cancel`] while
    /// the promise is still pending. Returning `Err` rejects the promise.
    pub fn with_canceller<E, C>(executor: E, canceller: C) -> Self
    where
        E: FnOnce(Resolver<T>),
        C: FnOnce(&Resolver<T>) -> Result<(), Error> + 'static,
    {
        let inner = Inner::new(Some(Box::new(canceller)));
        executor(Resolver {
            inner: inner.clone(),
        });

        Self { inner }
    }

    /// Returns an already fulfilled promise.
    pub fn resolved(value: T) -> Self {
        Self::new(|resolver| resolver.resolve(value))
    }

    /// Returns an already rejected promise.
    pub fn rejected(error: Error) -> Self {
        Self::new(|resolver| resolver.reject(error))
    }

    /// Attaches outcome handlers.
    ///
    /// Exactly one of the two handlers runs, once. If the promise is already
    /// settled the handler runs before `then` returns.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + 'static,
        R: FnOnce(Error) + 'static,
    {
        let outcome = {
            let mut state = self.inner.state.borrow_mut();

            match &mut *state {
                State::Pending(handlers) => {
                    handlers.push(Handler {
                        on_fulfilled: Box::new(on_fulfilled),
                        on_rejected: Box::new(on_rejected),
                    });
                    return;
                }
                State::Fulfilled(value) => Ok(value.clone()),
                State::Rejected(error) => Err(error.clone()),
            }
        };

        match outcome {
            Ok(value) => on_fulfilled(value),
            Err(error) => on_rejected(error),
        }
    }

    /// Requests cancellation of a pending promise.
    pub fn cancel(&self) {
        self.inner.clone().cancel();
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Cancellable> {
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        weak
    }
}

impl<T> Promise<T> {
    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Pending(_))
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Rejected(_))
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Fulfils the promise. Ignored once settled.
    pub fn resolve(&self, value: T) {
        self.inner.settle(Ok(value));
    }

    /// Rejects the promise. Ignored once settled.
    pub fn reject(&self, error: Error) {
        self.inner.settle(Err(error));
    }

    /// Rejects the promise with a value that is not an error.
    pub fn reject_value<V: std::any::Any>(&self, value: V) {
        self.reject(Error::value(value));
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), State::Pending(_))
    }
}

/// A promise together with the resolver that settles it.
pub struct Deferred<T> {
    promise: Promise<T>,
    resolver: Resolver<T>,
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn new() -> Self {
        let inner = Inner::new(None);

        Self::from_inner(inner)
    }

    /// Creates a deferred whose promise runs `canceller` on cancellation.
    pub fn with_canceller<C>(canceller: C) -> Self
    where
        C: FnOnce(&Resolver<T>) -> Result<(), Error> + 'static,
    {
        let inner = Inner::new(Some(Box::new(canceller)));

        Self::from_inner(inner)
    }

    fn from_inner(inner: Rc<Inner<T>>) -> Self {
        Self {
            promise: Promise {
                inner: inner.clone(),
            },
            resolver: Resolver { inner },
        }
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    pub fn resolver(&self) -> Resolver<T> {
        self.resolver.clone()
    }

    pub fn resolve(&self, value: T) {
        self.resolver.resolve(value);
    }

    pub fn reject(&self, error: Error) {
        self.resolver.reject(error);
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}
