//! Contract tests for async_runtime
//!
//! Pin the public API surface other components rely on.

mod contract_test;
