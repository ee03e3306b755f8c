//! Unit tests for RuntimeError, AsyncError and ErrorKind

use core_types::{AsyncError, ErrorKind, RuntimeError, StackTrace, UncaughtError};
use std::error::Error;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
struct DiskFull;

impl fmt::Display for DiskFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk full")
    }
}

impl Error for DiskFull {}

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_debug() {
        let kind = ErrorKind::StateError;
        let debug_str = format!("{:?}", kind);
        assert!(debug_str.contains("StateError"));
    }

    #[test]
    fn test_error_kind_equality() {
        assert_eq!(ErrorKind::Timeout, ErrorKind::Timeout);
        assert_ne!(ErrorKind::Timeout, ErrorKind::StateError);
    }
}

#[cfg(test)]
mod runtime_error_tests {
    use super::*;

    #[test]
    fn test_state_error_display() {
        let error = RuntimeError::state("Cannot add event after closing");
        assert_eq!(error.to_string(), "Bad state: Cannot add event after closing");
    }

    #[test]
    fn test_null_thrown_display() {
        assert_eq!(
            RuntimeError::null_thrown().to_string(),
            "NullThrownError: Throw of null."
        );
    }

    #[test]
    fn test_argument_error_kind() {
        assert_eq!(RuntimeError::argument("n < 0").kind, ErrorKind::ArgumentError);
    }
}

#[cfg(test)]
mod async_error_tests {
    use super::*;

    #[test]
    fn test_wraps_custom_error() {
        let error = AsyncError::new(DiskFull);
        assert_eq!(error.to_string(), "disk full");
        assert!(error.downcast_ref::<DiskFull>().is_some());
        assert!(error.kind().is_none());
    }

    #[test]
    fn test_explicit_stack_trace_is_kept() {
        let error = AsyncError::with_stack_trace(DiskFull, StackTrace::empty());
        assert!(error.stack_trace().is_empty());
    }

    #[test]
    fn test_nullable_with_object() {
        let shared: Rc<dyn Error> = Rc::new(DiskFull);
        let error = AsyncError::nullable(Some(shared.clone()), None);
        assert!(Rc::ptr_eq(error.error(), &shared));
    }

    #[test]
    fn test_with_trace_keeps_identity() {
        let error = AsyncError::msg("boom");
        let retraced = error.with_trace(StackTrace::empty());
        assert!(error.is_same(&retraced));
        assert!(retraced.stack_trace().is_empty());
    }

    #[test]
    fn test_runtime_error_conversion() {
        let error: AsyncError = RuntimeError::state("x").into();
        assert_eq!(error.kind(), Some(&ErrorKind::StateError));
    }

    #[test]
    fn test_source_is_payload() {
        let error = AsyncError::new(DiskFull);
        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }
}

#[cfg(test)]
mod uncaught_error_tests {
    use super::*;

    #[test]
    fn test_uncaught_display() {
        let uncaught = UncaughtError::from(AsyncError::msg("lost"));
        assert_eq!(uncaught.to_string(), "Uncaught error: Exception: lost");
    }
}
