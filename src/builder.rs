//! Fluent builder for Runtime construction.
//!
//! Provides a builder pattern interface for creating and configuring Runtime instances.

use crate::runtime::Runtime;
use crate::runtime::core::{Config, MIN_STACK_SIZE};

/// Builder for constructing Runtime instances with fluent API.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .fiber_stack_size(512 * 1024)
///     .drain_on_shutdown(false)
///     .build();
/// ```
pub struct RuntimeBuilder {
    config: Config,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with the default configuration: 256 KiB fiber
    /// stacks, loop drained when `block_on` returns.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the stack size of every task fiber, generator and of the root
    /// driver coroutine.
    ///
    /// Values below 16 KiB are raised to 16 KiB.
    pub fn fiber_stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = bytes.max(MIN_STACK_SIZE);
        self
    }

    /// Whether `block_on` runs the event loop until idle before returning.
    ///
    /// When disabled, timers and ticks left behind by the closure stay queued
    /// and run on the next `block_on` that drives the loop.
    pub fn drain_on_shutdown(mut self, drain: bool) -> Self {
        self.config.drain_on_shutdown = drain;
        self
    }

    /// Builds and returns a configured Runtime instance.
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}
