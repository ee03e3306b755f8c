//! Integration test suite for the async runtime
//!
//! This crate provides integration tests that verify futures, streams,
//! zones and the event loop work together across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use async_runtime;
    pub use core_types;
}

use async_runtime::{ClockMode, EventLoop, RuntimeConfig};

/// An event loop on the virtual clock, with uncaught-error logging off so
/// expected failures stay quiet.
pub fn virtual_event_loop() -> EventLoop {
    let _ = env_logger::builder().is_test(true).try_init();
    log::debug!("starting virtual event loop");
    EventLoop::with_config(
        RuntimeConfig::new()
            .with_clock(ClockMode::Virtual)
            .with_log_uncaught_errors(false),
    )
}
