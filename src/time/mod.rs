//! Time utilities: blocking-looking delays for tasks.
//!
//! - [`delay`] / [`delay_secs`] pause the current task (not the thread)
//! - [`sleep`] is the promise the delays await, for callers that want to
//!   compose it instead of blocking on it
//!
//! # Example
//!
//! ```ignore
//! use reactor_async::{Runtime, spawn, time::delay};
//! use std::time::Duration;
//!
//! Runtime::new().block_on(|| {
//!     spawn(|| {
//!         delay(Duration::from_millis(10))?;
//!         println!("10ms later");
//!         Ok(())
//!     });
//! });
//! ```

pub mod delay;

pub use delay::{delay, delay_secs, sleep};
