//! One-shot timers for the event loop.
//!
//! Timers are kept ordered by deadline, with a sequence number breaking ties
//! so that timers sharing a deadline fire in the order they were added. The
//! loop fires expired timers once per iteration and sleeps until the nearest
//! deadline when nothing else is pending.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub(crate) type TimerCallback = Box<dyn FnOnce()>;

// Longer delays are clamped so the deadline cannot overflow `Instant`.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Handle returned by [`EventLoop::add_timer`](crate::EventLoop::add_timer).
///
/// Pass it to [`EventLoop::cancel_timer`](crate::EventLoop::cancel_timer) to
/// drop the timer before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    deadline: Instant,
    sequence: u64,
}

impl TimerHandle {
    /// Instant at which the timer fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Stores registered timers and hands out the expired ones.
pub(crate) struct TimerDriver {
    timers: BTreeMap<(Instant, u64), TimerCallback>,
    next_sequence: u64,
}

impl TimerDriver {
    pub(crate) fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Registers a callback to run once `delay` has elapsed.
    pub(crate) fn register(&mut self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let deadline = Instant::now() + delay.min(MAX_DELAY);
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        self.timers.insert((deadline, sequence), callback);

        TimerHandle { deadline, sequence }
    }

    /// Removes a timer. Returns `false` if it already fired or was cancelled.
    pub(crate) fn cancel(&mut self, handle: &TimerHandle) -> bool {
        self.timers
            .remove(&(handle.deadline, handle.sequence))
            .is_some()
    }

    /// Pops the earliest timer whose deadline is at or before `now`.
    ///
    /// The caller runs the callback with no borrow held, so callbacks are free
    /// to add or cancel timers.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<TimerCallback> {
        let key = *self.timers.keys().next()?;

        if key.0 > now {
            return None;
        }

        self.timers.remove(&key)
    }

    /// Returns the time remaining until the next deadline, if any.
    pub(crate) fn next_remaining(&self) -> Option<Duration> {
        let (deadline, _) = self.timers.keys().next()?;

        Some(deadline.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn expired_timers_pop_in_deadline_then_insertion_order() {
        let mut driver = TimerDriver::new();
        let fired = Rc::new(RefCell::new(Vec::new()));

        for (label, delay) in [("b", 0), ("c", 0), ("a", 0)] {
            let fired = fired.clone();
            driver.register(
                Duration::from_millis(delay),
                Box::new(move || fired.borrow_mut().push(label)),
            );
        }

        let now = Instant::now();
        while let Some(callback) = driver.pop_expired(now) {
            callback();
        }

        assert_eq!(*fired.borrow(), vec!["b", "c", "a"]);
        assert!(driver.is_empty());
    }

    #[test]
    fn future_timer_is_not_expired() {
        let mut driver = TimerDriver::new();
        driver.register(Duration::from_secs(60), Box::new(|| {}));

        assert!(driver.pop_expired(Instant::now()).is_none());
        assert_eq!(driver.len(), 1);
        assert!(driver.next_remaining().unwrap() > Duration::from_secs(59));
    }

    #[test]
    fn cancel_removes_timer_once() {
        let mut driver = TimerDriver::new();
        let handle = driver.register(Duration::from_millis(5), Box::new(|| {}));

        assert!(driver.cancel(&handle));
        assert!(!driver.cancel(&handle));
        assert!(driver.next_remaining().is_none());
    }
}
