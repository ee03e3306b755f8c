//! Core error and stack trace types for the asynchronous runtime.
//!
//! This crate provides the foundational types shared by the runtime
//! components: the error model and the stack traces attached to errors.
//!
//! # Overview
//!
//! - [`AsyncError`] - Payload error with its stack trace
//! - [`RuntimeError`] - Errors raised by the runtime itself
//! - [`ErrorKind`] - Types of runtime errors
//! - [`UncaughtError`] - Errors surfaced to the host
//! - [`StackTrace`] / [`StackFrame`] - Where an error was raised
//!
//! # Examples
//!
//! ```
//! use core_types::{AsyncError, ErrorKind, RuntimeError};
//!
//! let error: AsyncError = RuntimeError::state("Stream has already been listened to.").into();
//! assert_eq!(error.kind(), Some(&ErrorKind::StateError));
//! assert!(!error.stack_trace().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod stack_trace;

pub use error::{AsyncError, ErrorKind, RuntimeError, UncaughtError};
pub use stack_trace::{
    set_stack_trace_capture, stack_trace_capture_enabled, StackFrame, StackTrace,
};
