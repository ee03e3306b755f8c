//! Unit test runner for async_runtime
//! This file makes cargo test discover the unit test modules

mod event_loop_test;
mod stream_test;
mod zone_test;

/// Routes runtime logging to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
