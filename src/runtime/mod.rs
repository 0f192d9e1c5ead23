//! Runtime subsystem modules.

pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod driver;
pub(crate) mod queue;

pub use core::Runtime;
pub(crate) use core::RuntimeInner;
