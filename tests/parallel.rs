use reactor_async::{Error, EventLoop, Promise, Runtime, await_, parallel};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Task<T> = Box<dyn FnOnce() -> Promise<T>>;

fn after(delay: Duration, value: i32) -> Promise<i32> {
    Promise::new(move |resolver| {
        EventLoop::current().add_timer(delay, move || resolver.resolve(value));
    })
}

fn counting_pending(cancelled: Rc<Cell<u32>>) -> Promise<i32> {
    Promise::with_canceller(
        |_| {},
        move |_| {
            cancelled.set(cancelled.get() + 1);
            Err(Error::msg("cancelled"))
        },
    )
}

#[test]
fn test_parallel_without_tasks() {
    let promise = parallel(Vec::<Task<i32>>::new());

    assert!(promise.is_fulfilled());

    let rt = Runtime::new();
    assert_eq!(rt.block_on(|| await_(promise)).unwrap(), Vec::<i32>::new());
}

#[test]
fn test_parallel_with_tasks_keeps_input_order() {
    let rt = Runtime::new();

    let (values, elapsed) = rt.block_on(|| {
        let tasks: Vec<Task<i32>> = vec![
            Box::new(|| after(Duration::from_millis(60), 1)),
            Box::new(|| after(Duration::from_millis(10), 2)),
            Box::new(|| Promise::resolved(3)),
        ];

        let start = Instant::now();
        let values = await_(parallel(tasks)).unwrap();
        (values, start.elapsed())
    });

    assert_eq!(values, vec![1, 2, 3]);
    assert!(elapsed >= Duration::from_millis(55));
    assert!(
        elapsed < Duration::from_millis(500),
        "Tasks should run concurrently"
    );
}

#[test]
fn test_parallel_with_error_stops_invoking_tasks() {
    let called = Rc::new(Cell::new(0));

    let (first, last) = (called.clone(), called.clone());
    let tasks: Vec<Task<&str>> = vec![
        Box::new(move || {
            first.set(first.get() + 1);
            Promise::resolved("foo")
        }),
        Box::new(|| Promise::rejected(Error::msg("whoops"))),
        Box::new(move || {
            last.set(last.get() + 1);
            Promise::resolved("bar")
        }),
    ];

    let promise = parallel(tasks);

    assert!(promise.is_rejected());
    assert_eq!(called.get(), 1);
}

#[test]
fn test_parallel_with_delayed_error_cancels_pending_once() {
    let rt = Runtime::new();
    let cancelled_a = Rc::new(Cell::new(0));
    let cancelled_c = Rc::new(Cell::new(0));

    let (a, c) = (cancelled_a.clone(), cancelled_c.clone());
    let result = rt.block_on(move || {
        let tasks: Vec<Task<i32>> = vec![
            Box::new(move || counting_pending(a)),
            Box::new(|| {
                Promise::new(|resolver| {
                    EventLoop::current().add_timer(Duration::from_millis(5), move || {
                        resolver.reject(Error::msg("whoops"))
                    });
                })
            }),
            Box::new(move || counting_pending(c)),
        ];

        await_(parallel(tasks))
    });

    assert_eq!(result.unwrap_err().to_string(), "whoops");
    assert_eq!(cancelled_a.get(), 1);
    assert_eq!(cancelled_c.get(), 1);
}

#[test]
fn test_cancel_parallel_cancels_all_pending() {
    let cancelled = Rc::new(Cell::new(0));

    let (a, b) = (cancelled.clone(), cancelled.clone());
    let tasks: Vec<Task<i32>> = vec![
        Box::new(move || counting_pending(a)),
        Box::new(|| Promise::resolved(2)),
        Box::new(move || counting_pending(b)),
    ];

    let promise = parallel(tasks);
    assert!(promise.is_pending());

    promise.cancel();

    assert!(promise.is_rejected());
    assert_eq!(cancelled.get(), 2);
}
