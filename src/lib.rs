//! Fiber-based async/await on top of a single-threaded event loop.
//!
//! Code written against this crate looks synchronous: [`await_`] blocks the
//! current task until a [`Promise`] settles, while the thread keeps running
//! other tasks, timers and loop callbacks. Every task runs on its own
//! stackful fiber, so a suspension keeps the whole call stack, error
//! handling included.
//!
//! # Architecture
//!
//! - **Runtime**: owns the event loop and the task registry; `block_on` runs
//!   the root context
//! - **EventLoop**: run-to-completion scheduler with future ticks and timers
//! - **Promise**: single-threaded, cancellable promise with synchronous
//!   `then` handlers
//! - **Fiber / Suspension**: stackful coroutines and the resume/throw/suspend
//!   handle that `await_` is built on
//! - **Registry**: per-task cancellation flag and pending promise
//! - **Tasks**: [`spawn`] and [`async_`] start fibers, [`await_`] suspends them
//! - **Time**: [`delay`] and [`sleep`] for timer-based waits
//! - **Coroutine**: [`coroutine`] drives generators that yield promises
//! - **Combinators**: [`parallel`], [`series`] and [`waterfall`]
//! - **RuntimeBuilder**: fluent configuration of stack size and shutdown
//!
//! # Example
//!
//! ```ignore
//! use reactor_async::{Runtime, async_, await_, delay_secs};
//!
//! let rt = Runtime::new();
//! let answer = rt.block_on(|| {
//!     let slow_double = async_(|n: u32| {
//!         delay_secs(0.01)?;
//!         Ok(n * 2)
//!     });
//!     await_(slow_double(21))
//! });
//! assert_eq!(answer.unwrap(), 42);
//! ```

mod builder;
mod combinators;
mod coroutine;
mod error;
pub mod fiber;
mod promise;
pub mod reactor;
mod runtime;
mod task;
pub mod time;
mod timer;
mod utils;

pub use builder::RuntimeBuilder;
pub use combinators::{parallel, series, waterfall};
pub use coroutine::{Co, Generator, Routine, coroutine};
pub use error::Error;
pub use fiber::registry::TaskId;
pub use fiber::suspension::Suspension;
pub use promise::{Cancellable, Deferred, Promise, Resolver};
pub use reactor::core::EventLoop;
pub use runtime::Runtime;
pub use task::{async_, await_, current_task, is_cancelled, spawn};
pub use time::{delay, delay_secs, sleep};
pub use timer::TimerHandle;
