//! Error types: configuration errors raised to the caller, and test failures
//! captured onto [`Test`](crate::Test) nodes.

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Configuration errors. These indicate a setup bug, not a test result, and
/// are returned to the caller instead of being recorded on a test node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BasilError {
    /// Two interceptors, or an interceptor and application code, collided
    /// on the same method name.
    #[error("cannot intercept `{0}`: the target already defines a method with that name")]
    CannotInterceptExistingMethod(String),

    #[error("no method named `{0}` is defined on the target")]
    NoSuchMethod(String),
}

/// What produced a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The test body panicked.
    Panic,
    /// The test body returned `Err`.
    Error,
    /// A setup plugin returned without calling its continuation.
    PluginDidNotDelegate,
    /// A pass made no progress, so the traversal could never complete.
    Stalled,
}

/// A failure captured on a test node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Failure {
            kind,
            message: message.into(),
        }
    }

    /// Normalize a panic payload. Payloads that are not strings still get a
    /// readable description.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test panicked with a non-string payload".to_string()
        };
        Failure::new(FailureKind::Panic, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Return types accepted from test bodies.
///
/// `()` always succeeds (a panic is still caught as a failure);
/// `Result<(), E>` records `Err` as a [`FailureKind::Error`] failure.
pub trait Outcome {
    fn into_failure(self) -> Option<Failure>;
}

impl Outcome for () {
    fn into_failure(self) -> Option<Failure> {
        None
    }
}

impl<E: fmt::Display> Outcome for Result<(), E> {
    fn into_failure(self) -> Option<Failure> {
        self.err()
            .map(|e| Failure::new(FailureKind::Error, e.to_string()))
    }
}
