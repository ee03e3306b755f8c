//! Contract compliance tests for core_types
//!
//! These tests pin the public surface other components rely on.

use core_types::{
    set_stack_trace_capture, stack_trace_capture_enabled, AsyncError, ErrorKind, RuntimeError,
    StackFrame, StackTrace, UncaughtError,
};

#[cfg(test)]
mod error_contract_tests {
    use super::*;

    /// Contract: ErrorKind has every runtime error category
    #[test]
    fn test_error_kind_variants() {
        let _ = ErrorKind::StateError;
        let _ = ErrorKind::ArgumentError;
        let _ = ErrorKind::Timeout;
        let _ = ErrorKind::NullThrown;
        let _ = ErrorKind::Exception;
    }

    /// Contract: RuntimeError exposes kind and message fields
    #[test]
    fn test_runtime_error_fields() {
        let error = RuntimeError {
            kind: ErrorKind::StateError,
            message: "Future already completed".to_string(),
        };
        assert_eq!(error, RuntimeError::state("Future already completed"));
    }

    /// Contract: AsyncError is cheap to clone and keeps its stack trace
    #[test]
    fn test_async_error_clone() {
        let error = AsyncError::msg("x");
        let clone = error.clone();
        assert!(clone.is_same(&error));
        assert_eq!(clone.stack_trace(), error.stack_trace());
    }

    /// Contract: UncaughtError exposes the AsyncError it wraps
    #[test]
    fn test_uncaught_error_field() {
        let uncaught = UncaughtError {
            error: AsyncError::msg("x"),
        };
        let _: &AsyncError = &uncaught.error;
    }
}

#[cfg(test)]
mod stack_trace_contract_tests {
    use super::*;

    /// Contract: StackFrame has public function_name, source_url, line, column
    #[test]
    fn test_stack_frame_fields() {
        let frame = StackFrame {
            function_name: None,
            source_url: None,
            line: 0,
            column: 0,
        };
        let _: Option<String> = frame.function_name;
        let _: Option<String> = frame.source_url;
        let _: u32 = frame.line;
        let _: u32 = frame.column;
    }

    /// Contract: capture can be toggled per thread
    #[test]
    fn test_capture_toggle() {
        assert!(stack_trace_capture_enabled());
        set_stack_trace_capture(false);
        assert!(StackTrace::current().is_empty());
        set_stack_trace_capture(true);
    }
}
