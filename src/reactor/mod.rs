//! Event loop driving every task.
//!
//! The loop is a plain run-to-completion scheduler: future ticks, one-shot
//! timers, and `run`/`stop`. Fibers never block the thread themselves; every
//! suspension ends up handing control back to this loop.
//!
//! - [`core`]: the [`EventLoop`](core::EventLoop) handle

pub mod core;
