//! Timer-backed delays.

use crate::error::Error;
use crate::promise::{Promise, Resolver};
use crate::reactor::core::EventLoop;
use crate::task::await_;
use crate::timer::TimerHandle;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Returns a promise that resolves once `duration` has elapsed.
///
/// Cancelling the promise before it resolves removes the timer from the loop
/// and rejects with `Error::Cancelled("Delay cancelled")`.
///
/// # Panics
/// Panics if called outside of a runtime context.
pub fn sleep(duration: Duration) -> Promise<()> {
    let event_loop = EventLoop::current();
    let handle: Rc<Cell<Option<TimerHandle>>> = Rc::new(Cell::new(None));

    let executor = {
        let event_loop = event_loop.clone();
        let handle = handle.clone();
        move |resolver: Resolver<()>| {
            let timer = event_loop.add_timer(duration, move || resolver.resolve(()));
            handle.set(Some(timer));
        }
    };

    let canceller = move |_: &Resolver<()>| {
        if let Some(timer) = handle.take() {
            event_loop.cancel_timer(&timer);
        }
        Err(Error::cancelled("Delay cancelled"))
    };

    Promise::with_canceller(executor, canceller)
}

/// Blocks the current task for `duration`.
///
/// Other tasks and loop callbacks keep running meanwhile. Returns
/// `Err(Error::Cancelled)` if the task is cancelled while waiting, in which
/// case the timer is released early.
///
/// # Example
/// ```ignore
/// spawn(|| {
///     delay(Duration::from_millis(20))?;
///     Ok(())
/// });
/// ```
pub fn delay(duration: Duration) -> Result<(), Error> {
    await_(sleep(duration))
}

/// Like [`delay`], with the duration given in seconds.
///
/// Zero, negative and NaN values wait for the next timer phase only.
pub fn delay_secs(seconds: f64) -> Result<(), Error> {
    delay(duration_from_secs(seconds))
}

fn duration_from_secs(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_are_clamped() {
        assert_eq!(duration_from_secs(-1.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(0.25), Duration::from_millis(250));
        assert_eq!(duration_from_secs(f64::INFINITY), Duration::MAX);
    }
}
