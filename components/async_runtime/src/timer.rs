//! One-shot and periodic timers.
//!
//! Timers are created through the current zone (so zones may intercept
//! them) and kept in the scheduler's [`TimerQueue`], ordered by deadline and
//! then by creation order.

use crate::scheduler;
use crate::zone::Zone;
use core_types::AsyncError;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

struct TimerState {
    active: Cell<bool>,
    tick: Cell<u64>,
    periodic: bool,
}

/// A handle to a scheduled timer.
///
/// # Examples
///
/// ```
/// use async_runtime::{ClockMode, EventLoop, RuntimeConfig, Timer};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let mut event_loop = EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual));
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// let timer = Timer::new(Duration::from_millis(10), move || {
///     flag.set(true);
///     Ok(())
/// });
/// assert!(timer.is_active());
/// event_loop.run_until_done().unwrap();
/// assert!(fired.get());
/// assert!(!timer.is_active());
/// ```
#[derive(Clone)]
pub struct Timer {
    state: Rc<TimerState>,
}

impl Timer {
    /// Schedules `callback` to run once after `duration` in the current zone.
    pub fn new<F>(duration: Duration, callback: F) -> Timer
    where
        F: FnOnce() -> Result<(), AsyncError> + 'static,
    {
        Zone::current().create_timer(duration, callback)
    }

    /// Schedules `callback` to run every `period` in the current zone until
    /// the timer is canceled.
    pub fn periodic<F>(period: Duration, callback: F) -> Timer
    where
        F: Fn(&Timer) -> Result<(), AsyncError> + 'static,
    {
        Zone::current().create_periodic_timer(period, callback)
    }

    /// Schedules `callback` to run as soon as possible, after pending
    /// microtasks.
    pub fn run<F>(callback: F) -> Timer
    where
        F: FnOnce() -> Result<(), AsyncError> + 'static,
    {
        Timer::new(Duration::ZERO, callback)
    }

    fn with_state(periodic: bool) -> Timer {
        Timer {
            state: Rc::new(TimerState {
                active: Cell::new(true),
                tick: Cell::new(0),
                periodic,
            }),
        }
    }

    /// Queues a one-shot timer on the scheduler. `callback` must already be
    /// bound to its zone.
    pub(crate) fn schedule_once(duration: Duration, callback: Box<dyn FnOnce()>) -> Timer {
        let timer = Timer::with_state(false);
        scheduler::add_timer(TimerEntry {
            deadline: scheduler::now().saturating_add(duration),
            sequence: 0,
            timer: timer.clone(),
            callback: TimerCallback::Once(callback),
        });
        timer
    }

    /// Queues a periodic timer on the scheduler. `callback` must already be
    /// bound to its zone.
    pub(crate) fn schedule_periodic(period: Duration, callback: Rc<dyn Fn(&Timer)>) -> Timer {
        let timer = Timer::with_state(true);
        scheduler::add_timer(TimerEntry {
            deadline: scheduler::now().saturating_add(period),
            sequence: 0,
            timer: timer.clone(),
            callback: TimerCallback::Periodic { period, callback },
        });
        timer
    }

    /// Cancels the timer. Canceling an inactive timer does nothing.
    pub fn cancel(&self) {
        self.state.active.set(false);
    }

    /// Returns true until the timer has fired (one-shot) or been canceled.
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Number of times a periodic timer has fired.
    pub fn tick(&self) -> u64 {
        self.state.tick.get()
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("active", &self.is_active())
            .field("periodic", &self.state.periodic)
            .field("tick", &self.tick())
            .finish()
    }
}

pub(crate) enum TimerCallback {
    Once(Box<dyn FnOnce()>),
    Periodic {
        period: Duration,
        callback: Rc<dyn Fn(&Timer)>,
    },
}

pub(crate) struct TimerEntry {
    deadline: Duration,
    sequence: u64,
    timer: Timer,
    callback: TimerCallback,
}

impl TimerEntry {
    pub(crate) fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs the callback. A periodic timer is re-armed before its callback
    /// runs so that the callback may cancel it.
    pub(crate) fn fire(self) {
        let TimerEntry {
            deadline,
            timer,
            callback,
            ..
        } = self;
        match callback {
            TimerCallback::Once(callback) => {
                timer.state.active.set(false);
                callback();
            }
            TimerCallback::Periodic { period, callback } => {
                timer.state.tick.set(timer.state.tick.get() + 1);
                scheduler::add_timer(TimerEntry {
                    deadline: deadline.saturating_add(period),
                    sequence: 0,
                    timer: timer.clone(),
                    callback: TimerCallback::Periodic {
                        period,
                        callback: callback.clone(),
                    },
                });
                callback(&timer);
            }
        }
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the max-heap yields the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Timers ordered by deadline, then creation order.
///
/// Canceled timers are discarded lazily when they reach the front.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_sequence: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, mut entry: TimerEntry) {
        entry.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(entry);
    }

    fn discard_inactive(&mut self) {
        while self
            .heap
            .peek()
            .is_some_and(|entry| !entry.timer.is_active())
        {
            self.heap.pop();
        }
    }

    pub(crate) fn next_deadline(&mut self) -> Option<Duration> {
        self.discard_inactive();
        self.heap.peek().map(|entry| entry.deadline)
    }

    pub(crate) fn pop(&mut self) -> Option<TimerEntry> {
        self.discard_inactive();
        self.heap.pop()
    }

    pub(crate) fn active_len(&self) -> usize {
        self.heap
            .iter()
            .filter(|entry| entry.timer.is_active())
            .count()
    }
}
