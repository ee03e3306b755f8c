//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is applied to the current thread's scheduler through
//! [`crate::EventLoop::with_config`]. It can be built in code or loaded from
//! JSON.

use serde::{Deserialize, Serialize};

/// Which clock drives timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Wall-clock time; the event loop sleeps until the next timer is due.
    #[default]
    Real,
    /// Simulated time; the event loop jumps straight to the next deadline.
    Virtual,
}

/// Configuration for an [`crate::EventLoop`].
///
/// # Examples
///
/// ```
/// use async_runtime::{ClockMode, RuntimeConfig};
///
/// let config = RuntimeConfig::from_json(r#"{ "clock": "virtual" }"#).unwrap();
/// assert_eq!(config.clock, ClockMode::Virtual);
/// assert!(config.capture_stack_traces);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Clock used for timers
    pub clock: ClockMode,
    /// Whether errors record the location they were raised at
    pub capture_stack_traces: bool,
    /// Whether the root zone logs uncaught errors before surfacing them
    pub log_uncaught_errors: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Real,
            capture_stack_traces: true,
            log_uncaught_errors: true,
        }
    }
}

impl RuntimeConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Sets the clock mode.
    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    /// Enables or disables stack trace capture.
    pub fn with_capture_stack_traces(mut self, enabled: bool) -> Self {
        self.capture_stack_traces = enabled;
        self
    }

    /// Enables or disables logging of uncaught errors.
    pub fn with_log_uncaught_errors(mut self, enabled: bool) -> Self {
        self.log_uncaught_errors = enabled;
        self
    }
}
