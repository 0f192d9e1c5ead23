use reactor_async::{EventLoop, Runtime, RuntimeBuilder, await_, delay_secs, spawn};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_builder_creation() {
    let rt = RuntimeBuilder::new().build();
    drop(rt);
}

#[test]
fn test_builder_immediate_result() {
    let rt = RuntimeBuilder::new().build();
    let value = 42;

    let result = rt.block_on(|| value);

    assert_eq!(result, 42, "Closure should return correct value");
}

#[test]
fn test_builder_multiple_instances() {
    let rt1 = RuntimeBuilder::new().build();
    let rt2 = RuntimeBuilder::new().build();

    let result1 = rt1.block_on(|| await_(spawn(|| Ok(10))));
    let result2 = rt2.block_on(|| await_(spawn(|| Ok(20))));

    assert_eq!(result1.unwrap(), 10);
    assert_eq!(result2.unwrap(), 20);
}

#[test]
fn test_builder_custom_stack_size() {
    let rt = RuntimeBuilder::new().fiber_stack_size(64 * 1024).build();

    let result = rt.block_on(|| {
        await_(spawn(|| {
            delay_secs(0.001)?;
            Ok("done")
        }))
    });

    assert_eq!(result.unwrap(), "done");
}

#[test]
fn test_builder_tiny_stack_is_clamped() {
    let rt = RuntimeBuilder::new().fiber_stack_size(1).build();

    let result = rt.block_on(|| await_(spawn(|| Ok(1))));

    assert_eq!(result.unwrap(), 1, "Stack size should be raised to the minimum");
}

#[test]
fn test_block_on_drains_pending_timers() {
    let rt = Runtime::new();
    let fired = Rc::new(Cell::new(false));

    let f = fired.clone();
    rt.block_on(move || {
        EventLoop::current().add_timer(Duration::from_millis(10), move || f.set(true));
    });

    assert!(fired.get(), "block_on should run outstanding timers");
}

#[test]
fn test_block_on_drains_suspended_tasks() {
    let rt = Runtime::new();
    let finished = Rc::new(Cell::new(false));

    let f = finished.clone();
    rt.block_on(move || {
        spawn(move || {
            delay_secs(0.01)?;
            f.set(true);
            Ok(())
        });
    });

    assert!(finished.get(), "Spawned task should have completed");
    assert_eq!(rt.active_tasks(), 0);
}

#[test]
fn test_block_on_drains_after_root_await() {
    let rt = Runtime::new();
    let finished = Rc::new(Cell::new(false));

    let f = finished.clone();
    rt.block_on(move || {
        await_(spawn(|| delay_secs(0.001))).unwrap();

        spawn(move || {
            delay_secs(0.01)?;
            f.set(true);
            Ok(())
        });
    });

    assert!(finished.get(), "Driver should be resumed once more at teardown");
}

#[test]
fn test_without_drain_work_stays_queued() {
    let rt = RuntimeBuilder::new().drain_on_shutdown(false).build();
    let fired = Rc::new(Cell::new(false));

    let f = fired.clone();
    rt.block_on(move || {
        EventLoop::current().add_timer(Duration::from_millis(5), move || f.set(true));
    });

    assert!(!fired.get());
    assert!(rt.event_loop().has_pending_work());

    rt.event_loop().run();

    assert!(fired.get());
}

#[test]
fn test_runtime_is_reusable_across_block_on_calls() {
    let rt = Runtime::new();

    for i in 0..3 {
        let value = rt.block_on(|| {
            await_(spawn(move || {
                delay_secs(0.001)?;
                Ok(i)
            }))
        });

        assert_eq!(value.unwrap(), i);
    }
}
