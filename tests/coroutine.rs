use reactor_async::{Error, Generator, Promise, Routine, Runtime, await_, coroutine, spawn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Outcome<T> = Rc<RefCell<Option<Result<T, String>>>>;

fn observe<T: Clone + 'static>(promise: &Promise<T>) -> Outcome<T> {
    let outcome: Outcome<T> = Rc::new(RefCell::new(None));
    let fulfilled = outcome.clone();
    let rejected = outcome.clone();

    promise.then(
        move |value| *fulfilled.borrow_mut() = Some(Ok(value)),
        move |error| *rejected.borrow_mut() = Some(Err(error.to_string())),
    );

    outcome
}

fn never_settles<T: Clone + 'static>(message: &'static str) -> Promise<T> {
    Promise::with_canceller(|_| {}, move |_| Err(Error::msg(message)))
}

#[test]
fn test_coroutine_fulfills_if_function_returns_without_generator() {
    let promise = coroutine(|| Ok(Routine::<(), _>::Value(42)));

    assert_eq!(*observe(&promise).borrow(), Some(Ok(42)));
}

#[test]
fn test_coroutine_fulfills_if_generator_returns_immediately() {
    let promise = coroutine(|| Ok(Routine::Generator(Generator::<(), _>::new(|_| Ok(42))?)));

    assert_eq!(*observe(&promise).borrow(), Some(Ok(42)));
}

#[test]
fn test_coroutine_fulfills_after_yielding_promise() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::new(|co| {
            let value = co.yield_(Promise::resolved(42))?;
            Ok(value)
        })?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Ok(42)));
}

#[test]
fn test_coroutine_rejects_if_function_fails_without_generator() {
    let promise = coroutine(|| -> Result<Routine<(), i32>, Error> { Err(Error::msg("Foo")) });

    assert_eq!(*observe(&promise).borrow(), Some(Err("Foo".to_string())));
}

#[test]
fn test_coroutine_rejects_if_generator_fails_immediately() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<(), i32>::new(|_| Err(Error::msg("Foo")))?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Err("Foo".to_string())));
}

#[test]
fn test_coroutine_rejects_if_generator_fails_after_yielding_promise() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<String, ()>::new(|co| {
            let reason = co.yield_(Promise::resolved("Foo".to_string()))?;
            Err(Error::msg(reason))
        })?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Err("Foo".to_string())));
}

#[test]
fn test_coroutine_rejects_if_generator_rethrows_rejected_yield() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<(), ()>::new(|co| match co.yield_(Promise::rejected(Error::msg("Foo"))) {
            Err(error) => Err(Error::msg(format!("caught {}", error))),
            Ok(()) => Ok(()),
        })?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Err("caught Foo".to_string())));
}

#[test]
fn test_coroutine_fulfills_if_generator_returns_after_yielding_rejected_promise() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<i32, i32>::new(|co| match co.yield_(Promise::rejected(Error::msg("Foo"))) {
            Err(_) => Ok(42),
            Ok(value) => Ok(value),
        })?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Ok(42)));
}

#[test]
fn test_coroutine_normalizes_non_error_rejection() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<(), ()>::new(|co| {
            co.yield_(Promise::new(|resolver| resolver.reject_value(42_i64)))
        })?))
    });

    assert_eq!(
        *observe(&promise).borrow(),
        Some(Err(
            "Promise rejected with unexpected value of type i64".to_string()
        ))
    );
}

#[test]
fn test_coroutine_resumes_once_per_yield() {
    let resumes = Rc::new(Cell::new(0));

    let count = resumes.clone();
    let promise = coroutine(move || {
        Ok(Routine::Generator(Generator::new(move |co| {
            let mut sum = 0;
            for i in 1..=5 {
                sum += co.yield_(Promise::resolved(i))?;
                count.set(count.get() + 1);
            }
            Ok(sum)
        })?))
    });

    assert_eq!(*observe(&promise).borrow(), Some(Ok(15)));
    assert_eq!(resumes.get(), 5);
}

#[test]
fn test_coroutine_waits_for_pending_yield() {
    let deferred = reactor_async::Deferred::new();
    let yielded = deferred.promise();

    let promise = coroutine(move || {
        Ok(Routine::Generator(Generator::new(move |co| {
            let value: i32 = co.yield_(yielded)?;
            Ok(value * 2)
        })?))
    });
    let outcome = observe(&promise);

    assert!(outcome.borrow().is_none());

    deferred.resolve(21);

    assert_eq!(*outcome.borrow(), Some(Ok(42)));
}

#[test]
fn test_cancel_coroutine_rejects_when_pending_promise_rejects() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<(), ()>::new(|co| co.yield_(never_settles("Operation cancelled")))?))
    });

    promise.cancel();

    assert_eq!(
        *observe(&promise).borrow(),
        Some(Err("Operation cancelled".to_string()))
    );
}

#[test]
fn test_cancel_coroutine_fulfills_when_cancellation_is_caught() {
    let promise = coroutine(|| {
        Ok(Routine::Generator(Generator::<(), i32>::new(|co| match co.yield_(never_settles("Operation cancelled")) {
            Err(_) => Ok(42),
            Ok(()) => Ok(0),
        })?))
    });

    promise.cancel();

    assert_eq!(*observe(&promise).borrow(), Some(Ok(42)));
}

#[test]
fn test_cancel_coroutine_stays_pending_when_catch_yields_second_promise() {
    let second_cancelled = Rc::new(Cell::new(false));

    let flag = second_cancelled.clone();
    let promise = coroutine(move || {
        Ok(Routine::Generator(Generator::<(), ()>::new(move |co| {
            if co.yield_(never_settles("First operation cancelled")).is_err() {
                let second = Promise::with_canceller(
                    |_| {},
                    move |_| {
                        flag.set(true);
                        Err(Error::msg("Second operation never cancelled"))
                    },
                );
                co.yield_(second)?;
            }
            Ok(())
        })?))
    });

    promise.cancel();

    assert!(promise.is_pending());
    assert!(!second_cancelled.get());
}

fn sum_of_resolved_yields(count: u64) -> Promise<u64> {
    coroutine(move || {
        Ok(Routine::Generator(Generator::new(move |co| {
            let mut sum = 0;
            for i in 0..count {
                sum += co.yield_(Promise::resolved(i))?;
            }
            Ok(sum)
        })?))
    })
}

#[test]
fn test_coroutine_with_many_resolved_yields() {
    let promise = sum_of_resolved_yields(100_000);

    assert_eq!(*observe(&promise).borrow(), Some(Ok(4_999_950_000)));
}

#[test]
fn test_coroutine_with_many_resolved_yields_inside_task() {
    let rt = Runtime::new();

    let sum = rt.block_on(|| await_(spawn(|| await_(sum_of_resolved_yields(100_000)))));

    assert_eq!(sum.unwrap(), 4_999_950_000);
}

#[test]
#[should_panic(expected = "called inside a generator body")]
fn test_await_inside_generator_body_in_task_panics() {
    let rt = Runtime::new();

    rt.block_on(|| {
        let _ = spawn(|| {
            await_(coroutine(|| {
                Ok(Routine::Generator(Generator::<i32, i32>::new(|co| {
                    await_(Promise::<()>::new(|_| {}))?;
                    co.yield_(Promise::resolved(1)).map(|value| value + 1)
                })?))
            }))
        });
    });
}
