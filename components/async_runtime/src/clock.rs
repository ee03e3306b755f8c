//! Time sources for timers.

use crate::config::ClockMode;
use std::time::{Duration, Instant};

/// The time source of a thread's scheduler.
///
/// Time is measured as the duration elapsed since the clock was created.
#[derive(Debug, Clone)]
pub enum Clock {
    /// Wall-clock time
    Real {
        /// When the clock started
        origin: Instant,
    },
    /// Simulated time that only moves when the event loop advances it
    Virtual {
        /// Current simulated time
        now: Duration,
    },
}

impl Clock {
    /// Creates a clock of the given mode starting at zero.
    pub fn new(mode: ClockMode) -> Self {
        match mode {
            ClockMode::Real => Clock::Real {
                origin: Instant::now(),
            },
            ClockMode::Virtual => Clock::Virtual {
                now: Duration::ZERO,
            },
        }
    }

    /// Time elapsed since the clock started.
    pub fn now(&self) -> Duration {
        match self {
            Clock::Real { origin } => origin.elapsed(),
            Clock::Virtual { now } => *now,
        }
    }

    /// Returns true for a simulated clock.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Clock::Virtual { .. })
    }

    /// Blocks (real) or jumps (virtual) until `deadline` has been reached.
    pub fn wait_until(&mut self, deadline: Duration) {
        match self {
            Clock::Real { origin } => {
                let now = origin.elapsed();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
            Clock::Virtual { now } => {
                if deadline > *now {
                    *now = deadline;
                }
            }
        }
    }
}
