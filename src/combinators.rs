//! Ordered promise combinators.
//!
//! Each combinator takes task factories (closures returning a promise) and
//! returns a single promise for the combined outcome:
//!
//! - [`parallel`] starts every task up front and collects the results in
//!   input order.
//! - [`series`] starts the tasks one after another.
//! - [`waterfall`] is `series` where each task receives the previous
//!   task's value.
//!
//! All three reject with the first error and can be cancelled, which
//! cancels whatever inner promises are still pending.

use crate::error::Error;
use crate::promise::{Deferred, Promise, Resolver};

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::mem;
use std::rc::{Rc, Weak};

struct Parallel<T> {
    results: RefCell<Vec<Option<T>>>,
    pending: RefCell<BTreeMap<usize, Promise<T>>>,
    remaining: Cell<usize>,
    failed: Cell<bool>,
    resolver: Resolver<Vec<T>>,
}

impl<T: Clone + 'static> Parallel<T> {
    fn fulfilled(&self, index: usize, value: T) {
        if self.failed.get() {
            return;
        }

        self.pending.borrow_mut().remove(&index);
        self.results.borrow_mut()[index] = Some(value);
        self.remaining.set(self.remaining.get() - 1);

        if self.remaining.get() == 0 {
            let results = mem::take(&mut *self.results.borrow_mut());
            self.resolver.resolve(results.into_iter().flatten().collect());
        }
    }

    fn rejected(&self, error: Error) {
        if self.failed.replace(true) {
            return;
        }

        let pending = mem::take(&mut *self.pending.borrow_mut());
        self.resolver.reject(error);

        for promise in pending.into_values() {
            promise.cancel();
        }
    }

    fn cancel(&self) {
        let pending = mem::take(&mut *self.pending.borrow_mut());

        for promise in pending.into_values() {
            promise.cancel();
        }
    }
}

/// Starts every task at once and resolves with their results in input order.
///
/// Rejects with the first error and cancels every task still pending. A task
/// that rejects synchronously stops the remaining factories from being
/// invoked at all.
///
/// # Example
/// ```ignore
/// let all = parallel(vec![
///     Box::new(|| Promise::resolved(1)) as Box<dyn FnOnce() -> Promise<i32>>,
///     Box::new(|| Promise::resolved(2)),
/// ]);
/// assert_eq!(await_(all).unwrap(), vec![1, 2]);
/// ```
pub fn parallel<T, F, I>(tasks: I) -> Promise<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Promise<T>,
    T: Clone + 'static,
{
    let tasks: Vec<F> = tasks.into_iter().collect();

    if tasks.is_empty() {
        return Promise::resolved(Vec::new());
    }

    let target: Rc<RefCell<Weak<Parallel<T>>>> = Rc::new(RefCell::new(Weak::new()));

    let deferred = {
        let target = target.clone();
        Deferred::with_canceller(move |_| {
            let state = target.borrow().upgrade();
            if let Some(state) = state {
                state.cancel();
            }
            Ok(())
        })
    };

    let state = Rc::new(Parallel {
        results: RefCell::new(tasks.iter().map(|_| None).collect()),
        pending: RefCell::new(BTreeMap::new()),
        remaining: Cell::new(tasks.len()),
        failed: Cell::new(false),
        resolver: deferred.resolver(),
    });
    *target.borrow_mut() = Rc::downgrade(&state);

    for (index, task) in tasks.into_iter().enumerate() {
        if state.failed.get() {
            break;
        }

        let promise = task();
        state.pending.borrow_mut().insert(index, promise.clone());

        let on_fulfilled = {
            let state = state.clone();
            move |value: T| state.fulfilled(index, value)
        };
        let on_rejected = {
            let state = state.clone();
            move |error: Error| state.rejected(error)
        };

        promise.then(on_fulfilled, on_rejected);
    }

    deferred.promise()
}

struct Sequence<I, S, T> {
    tasks: RefCell<I>,
    current: RefCell<Option<Promise<T>>>,
    acc: RefCell<S>,
    resolver: Resolver<S>,
    // Set while `advance` is on the stack; `again` records that a task
    // settled synchronously and the next one is due.
    stepping: Cell<bool>,
    again: Cell<bool>,
}

// Shared driver of `series` and `waterfall`: `start` turns the next task and
// the accumulator into a promise, `fold` merges its value into the
// accumulator.
trait Step<T, S> {
    fn start(self, acc: &mut S) -> Promise<T>;
    fn fold(acc: &mut S, value: T);
}

struct SeriesTask<F>(F);

impl<T, F> Step<T, Vec<T>> for SeriesTask<F>
where
    F: FnOnce() -> Promise<T>,
{
    fn start(self, _: &mut Vec<T>) -> Promise<T> {
        (self.0)()
    }

    fn fold(acc: &mut Vec<T>, value: T) {
        acc.push(value);
    }
}

struct WaterfallTask<F>(F);

impl<T, F> Step<T, Option<T>> for WaterfallTask<F>
where
    F: FnOnce(Option<T>) -> Promise<T>,
{
    fn start(self, acc: &mut Option<T>) -> Promise<T> {
        (self.0)(acc.take())
    }

    fn fold(acc: &mut Option<T>, value: T) {
        *acc = Some(value);
    }
}

impl<I, S, T, P> Sequence<I, S, T>
where
    I: Iterator<Item = P> + 'static,
    P: Step<T, S>,
    S: Clone + Default + 'static,
    T: Clone + 'static,
{
    fn run(tasks: I) -> Promise<S> {
        let target: Rc<RefCell<Weak<Self>>> = Rc::new(RefCell::new(Weak::new()));

        let deferred = {
            let target = target.clone();
            Deferred::with_canceller(move |_| {
                let state = target.borrow().upgrade();
                let current = state.and_then(|state| state.current.borrow_mut().take());
                if let Some(current) = current {
                    current.cancel();
                }
                Ok(())
            })
        };

        let state = Rc::new(Self {
            tasks: RefCell::new(tasks),
            current: RefCell::new(None),
            acc: RefCell::new(S::default()),
            resolver: deferred.resolver(),
            stepping: Cell::new(false),
            again: Cell::new(false),
        });
        *target.borrow_mut() = Rc::downgrade(&state);

        state.advance();

        deferred.promise()
    }

    // Starts tasks until one is left pending. A task that settles inside
    // `then` only flags `again`, so already resolved tasks are chained in a
    // loop instead of through nested handlers.
    fn advance(self: &Rc<Self>) {
        if self.stepping.replace(true) {
            self.again.set(true);
            return;
        }

        loop {
            self.again.set(false);
            self.start_next();

            if !self.again.get() {
                break;
            }
        }

        self.stepping.set(false);
    }

    fn start_next(self: &Rc<Self>) {
        let task = self.tasks.borrow_mut().next();

        let Some(task) = task else {
            let acc = mem::take(&mut *self.acc.borrow_mut());
            self.resolver.resolve(acc);
            return;
        };

        let promise = {
            let mut acc = mem::take(&mut *self.acc.borrow_mut());
            let promise = task.start(&mut acc);
            *self.acc.borrow_mut() = acc;
            promise
        };
        *self.current.borrow_mut() = Some(promise.clone());

        let on_fulfilled = {
            let state = self.clone();
            move |value: T| {
                state.current.borrow_mut().take();
                P::fold(&mut state.acc.borrow_mut(), value);
                state.advance();
            }
        };
        let on_rejected = {
            let state = self.clone();
            move |error: Error| {
                state.current.borrow_mut().take();
                state.resolver.reject(error);
            }
        };

        promise.then(on_fulfilled, on_rejected);
    }
}

/// Runs the tasks one at a time and resolves with all results in order.
///
/// Rejects with the first error without starting the remaining tasks.
/// Cancelling the returned promise cancels the task in flight.
pub fn series<T, F, I>(tasks: I) -> Promise<Vec<T>>
where
    I: IntoIterator<Item = F>,
    I::IntoIter: 'static,
    F: FnOnce() -> Promise<T> + 'static,
    T: Clone + 'static,
{
    Sequence::run(tasks.into_iter().map(SeriesTask))
}

/// Like [`series`], passing each task the value of the previous one.
///
/// The first task receives `None`. Resolves with the last task's value, or
/// with `None` when there are no tasks.
///
/// # Example
/// ```ignore
/// let last = waterfall(vec![
///     Box::new(|_| Promise::resolved(1)) as Box<dyn FnOnce(Option<i32>) -> Promise<i32>>,
///     Box::new(|prev| Promise::resolved(prev.unwrap_or(0) + 1)),
/// ]);
/// assert_eq!(await_(last).unwrap(), Some(2));
/// ```
pub fn waterfall<T, F, I>(tasks: I) -> Promise<Option<T>>
where
    I: IntoIterator<Item = F>,
    I::IntoIter: 'static,
    F: FnOnce(Option<T>) -> Promise<T> + 'static,
    T: Clone + 'static,
{
    Sequence::run(tasks.into_iter().map(WaterfallTask))
}
