//! Error type shared by promises, tasks and combinators.
//!
//! Every rejection travels as an [`Error`]. The enum is `Clone` because a
//! settled promise hands its outcome to each attached handler; user errors are
//! kept behind an `Rc` so every clone still points at the same error value.

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Errors produced or carried by the runtime.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A promise was rejected with something that is not an error.
    ///
    /// Produced by [`await_`](crate::await_) and [`coroutine`](crate::coroutine)
    /// when normalizing a [`Error::Value`] rejection.
    #[error("Promise rejected with unexpected value of type {type_name}")]
    UnexpectedValue { type_name: &'static str },

    /// Raw non-error rejection as stored inside a promise.
    #[error("promise rejected with a value of type {type_name}")]
    Value {
        type_name: &'static str,
        value: Rc<dyn Any>,
    },

    /// Raised at a suspension point when the pending operation was cancelled.
    #[error("{0}")]
    Cancelled(String),

    /// Plain message error.
    #[error("{0}")]
    Message(String),

    /// Error raised by user code, passed through untouched.
    #[error("{0}")]
    User(Rc<dyn std::error::Error + 'static>),

    /// The event loop stopped before a root-level await settled.
    #[error("event loop stopped before the awaited promise settled")]
    LoopStopped,

    /// A fiber stack could not be allocated.
    #[error("failed to allocate fiber stack: {0}")]
    Stack(String),
}

impl Error {
    /// Creates a plain message error.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::Message(message.to_string())
    }

    /// Creates a cancellation error with the given message.
    pub fn cancelled(message: impl fmt::Display) -> Self {
        Error::Cancelled(message.to_string())
    }

    /// Wraps an arbitrary error type.
    pub fn user<E: std::error::Error + 'static>(error: E) -> Self {
        Error::User(Rc::new(error))
    }

    /// Wraps a value that is not an error as a rejection reason.
    pub fn value<V: Any>(value: V) -> Self {
        Error::Value {
            type_name: type_name::<V>(),
            value: Rc::new(value),
        }
    }

    /// Turns a non-error rejection into [`Error::UnexpectedValue`].
    ///
    /// Every other variant is returned unchanged, so user errors keep their
    /// identity.
    pub fn normalize(self) -> Self {
        match self {
            Error::Value { type_name, .. } => Error::UnexpectedValue { type_name },
            other => other,
        }
    }

    /// Returns true for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Downcasts a [`Error::User`] payload.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Error::User(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn normalize_wraps_non_error_values() {
        let error = Error::value(false).normalize();

        assert_eq!(
            error.to_string(),
            "Promise rejected with unexpected value of type bool"
        );
    }

    #[test]
    fn normalize_keeps_user_error_identity() {
        let original = Error::user(Boom);
        let normalized = original.clone().normalize();

        match (&original, &normalized) {
            (Error::User(a), Error::User(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected user errors"),
        }
        assert!(normalized.downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn cancelled_reports_its_message() {
        let error = Error::cancelled("Delay cancelled");

        assert!(error.is_cancelled());
        assert_eq!(error.to_string(), "Delay cancelled");
    }
}
