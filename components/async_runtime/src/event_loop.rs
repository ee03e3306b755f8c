//! Event loop implementation.
//!
//! This module provides the host driver for the current thread's scheduler.
//! Each turn of the loop:
//! 1. Drains the microtask queue
//! 2. Takes the oldest host task and executes it
//! 3. When no task is waiting, fires the earliest due timer
//! 4. Repeats
//!
//! Errors that reach the root zone unhandled are surfaced as
//! [`UncaughtError`]; draining stops at the first one and the remaining
//! work stays queued so the host can decide whether to continue.

use crate::config::RuntimeConfig;
use crate::scheduler;
use crate::task_queue::{MicroTask, Task};
use crate::zone;
use core_types::{set_stack_trace_capture, UncaughtError};
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

/// The driver of the current thread's scheduler.
///
/// Creating an event loop resets the thread's queues, timers and clock, and
/// makes the root zone current.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Task};
///
/// let mut event_loop = EventLoop::new();
///
/// event_loop.enqueue_task(Task::new(|| Ok(())));
/// event_loop.run_until_done().unwrap();
/// ```
#[derive(Debug)]
pub struct EventLoop {
    config: RuntimeConfig,
    // Scheduler state is per thread.
    _thread_bound: PhantomData<Rc<()>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates an event loop with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        set_stack_trace_capture(config.capture_stack_traces);
        scheduler::reset(config.clone());
        zone::reset_current();
        log::debug!("event loop started with {:?}", config);
        Self {
            config,
            _thread_bound: PhantomData,
        }
    }

    /// The configuration the loop was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Adds a task to the task queue.
    ///
    /// The task will be executed in the next available iteration of the event loop.
    pub fn enqueue_task(&mut self, task: Task) {
        scheduler::enqueue_task(task);
    }

    /// Adds a microtask to the microtask queue without going through a zone.
    ///
    /// Use [`crate::schedule_microtask`] to schedule through the current zone.
    pub fn enqueue_microtask(&mut self, microtask: MicroTask) {
        scheduler::enqueue_microtask(microtask);
    }

    /// Returns true if the task queue is empty.
    pub fn is_task_queue_empty(&self) -> bool {
        scheduler::task_count() == 0
    }

    /// Returns true if the microtask queue is empty.
    pub fn is_microtask_queue_empty(&self) -> bool {
        scheduler::microtask_count() == 0
    }

    /// Number of timers that have neither fired nor been canceled.
    pub fn pending_timers(&self) -> usize {
        scheduler::active_timer_count()
    }

    /// Current time of the scheduler's clock.
    pub fn now(&self) -> Duration {
        scheduler::now()
    }

    /// Runs all microtasks in the queue until empty.
    ///
    /// New microtasks added during execution will also be processed before
    /// this method returns.
    pub fn run_all_microtasks(&mut self) -> Result<(), UncaughtError> {
        scheduler::drain_microtasks()
    }

    /// Runs all tasks in the queue (without processing microtasks between them).
    ///
    /// This is primarily for testing purposes.
    pub fn run_all_tasks(&mut self) -> Result<(), UncaughtError> {
        while let Some(task) = scheduler::next_task() {
            run_task(task)?;
        }
        Ok(())
    }

    /// Processes one complete cycle: pending microtasks, then one task (or
    /// one timer that is already due), then all microtasks.
    pub fn process_one_cycle(&mut self) -> Result<(), UncaughtError> {
        self.run_all_microtasks()?;
        match scheduler::next_task() {
            Some(task) => run_task(task)?,
            None => {
                scheduler::fire_next_timer(Some(scheduler::now()));
            }
        }
        self.run_all_microtasks()
    }

    /// Runs the event loop until no microtask, task or active timer is left.
    ///
    /// With a real clock the loop sleeps until the next timer is due; with a
    /// virtual clock time jumps to it. A periodic timer keeps the loop alive
    /// until it is canceled.
    pub fn run_until_done(&mut self) -> Result<(), UncaughtError> {
        loop {
            self.run_all_microtasks()?;
            if let Some(task) = scheduler::next_task() {
                run_task(task)?;
                continue;
            }
            if !scheduler::fire_next_timer(None) {
                return Ok(());
            }
        }
    }

    /// Runs all work that becomes due within `duration` from now, then moves
    /// the clock to the end of that window.
    pub fn advance(&mut self, duration: Duration) -> Result<(), UncaughtError> {
        let target = scheduler::now().saturating_add(duration);
        loop {
            self.run_all_microtasks()?;
            if let Some(task) = scheduler::next_task() {
                run_task(task)?;
                continue;
            }
            if !scheduler::fire_next_timer(Some(target)) {
                break;
            }
        }
        scheduler::wait_until(target);
        self.run_all_microtasks()
    }
}

fn run_task(task: Task) -> Result<(), UncaughtError> {
    task.run().map_err(|error| {
        log::error!("task failed: {}", error);
        UncaughtError::from(error)
    })
}
