//! Error types for the asynchronous runtime.
//!
//! Three families of errors flow through the runtime:
//! - [`RuntimeError`] for protocol violations raised synchronously to the
//!   caller (completing a future twice, listening twice, adding after close)
//!   and for the runtime's own payload errors (timeouts, null throws).
//! - [`AsyncError`] for payload errors that travel through futures and
//!   streams as data, together with the stack trace they were raised at.
//! - [`UncaughtError`] for errors that reached the root zone unhandled and
//!   are surfaced to the host by the event loop.

use crate::StackTrace;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

/// The kind of runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An operation was attempted in a state that does not allow it
    StateError,
    /// An argument was outside its accepted domain
    ArgumentError,
    /// A timer won the race against a future or stream
    Timeout,
    /// An error was raised without an error object
    NullThrown,
    /// A plain message-carrying exception
    Exception,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::StateError => "Bad state",
            ErrorKind::ArgumentError => "Invalid argument",
            ErrorKind::Timeout => "TimeoutException",
            ErrorKind::NullThrown => "NullThrownError",
            ErrorKind::Exception => "Exception",
        };
        f.write_str(name)
    }
}

/// An error produced by the runtime itself.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, RuntimeError};
///
/// let error = RuntimeError::state("Future already completed");
/// assert_eq!(error.kind, ErrorKind::StateError);
/// assert_eq!(error.to_string(), "Bad state: Future already completed");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl RuntimeError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A protocol violation such as double completion.
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateError, message)
    }

    /// An invalid argument.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message)
    }

    /// A timeout after `duration`.
    pub fn timeout(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("after {:?}: {}", duration, message.into()),
        )
    }

    /// The marker used when an error is raised without an error object.
    pub fn null_thrown() -> Self {
        Self::new(ErrorKind::NullThrown, "Throw of null.")
    }

    /// A generic exception carrying `message`.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exception, message)
    }
}

/// A payload error paired with the stack trace it was raised at.
///
/// Cloning is cheap: the error object is shared, so every listener of a
/// future or stream observes the same instance (see [`AsyncError::is_same`]).
///
/// # Examples
///
/// ```
/// use core_types::{AsyncError, ErrorKind, RuntimeError};
///
/// let error = AsyncError::msg("disk full");
/// assert_eq!(error.to_string(), "Exception: disk full");
/// assert_eq!(error.kind(), Some(&ErrorKind::Exception));
/// assert!(error.downcast_ref::<RuntimeError>().is_some());
/// ```
#[derive(Clone)]
pub struct AsyncError {
    error: Rc<dyn StdError>,
    stack_trace: StackTrace,
}

impl AsyncError {
    /// Wraps `error`, recording the caller as its stack trace.
    #[track_caller]
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        Self::with_stack_trace(error, StackTrace::current())
    }

    /// Wraps `error` with an explicit stack trace.
    pub fn with_stack_trace<E: StdError + 'static>(error: E, stack_trace: StackTrace) -> Self {
        Self {
            error: Rc::new(error),
            stack_trace,
        }
    }

    /// Wraps an already shared error object.
    pub fn from_shared(error: Rc<dyn StdError>, stack_trace: StackTrace) -> Self {
        Self { error, stack_trace }
    }

    /// Builds an error from an optional error object.
    ///
    /// A missing object is normalized to [`ErrorKind::NullThrown`] so error
    /// handlers never observe an absent error. A missing stack trace is
    /// replaced by the caller location.
    #[track_caller]
    pub fn nullable(error: Option<Rc<dyn StdError>>, stack_trace: Option<StackTrace>) -> Self {
        let stack_trace = stack_trace.unwrap_or_else(StackTrace::current);
        match error {
            Some(error) => Self::from_shared(error, stack_trace),
            None => Self::with_stack_trace(RuntimeError::null_thrown(), stack_trace),
        }
    }

    /// A plain exception carrying `message`.
    #[track_caller]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(RuntimeError::exception(message))
    }

    /// The wrapped error object.
    pub fn error(&self) -> &Rc<dyn StdError> {
        &self.error
    }

    /// The stack trace recorded for this error.
    pub fn stack_trace(&self) -> &StackTrace {
        &self.stack_trace
    }

    /// Returns the same error object with a different stack trace.
    pub fn with_trace(&self, stack_trace: StackTrace) -> Self {
        Self {
            error: self.error.clone(),
            stack_trace,
        }
    }

    /// Attempts to view the error object as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// Returns the kind if the error object is a [`RuntimeError`].
    pub fn kind(&self) -> Option<&ErrorKind> {
        self.downcast_ref::<RuntimeError>().map(|error| &error.kind)
    }

    /// Returns true if both values share the same error object.
    pub fn is_same(&self, other: &AsyncError) -> bool {
        Rc::ptr_eq(&self.error, &other.error)
    }
}

impl From<RuntimeError> for AsyncError {
    #[track_caller]
    fn from(error: RuntimeError) -> Self {
        AsyncError::new(error)
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncError")
            .field("error", &self.error)
            .field("stack_trace", &self.stack_trace)
            .finish()
    }
}

impl StdError for AsyncError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.error)
    }
}

/// An error that reached the root zone without being handled.
#[derive(Debug, Clone, Error)]
#[error("Uncaught error: {error}")]
pub struct UncaughtError {
    /// The error and its stack trace
    #[source]
    pub error: AsyncError,
}

impl From<AsyncError> for UncaughtError {
    fn from(error: AsyncError) -> Self {
        Self { error }
    }
}
