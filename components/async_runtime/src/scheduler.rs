//! Per-thread scheduler state.
//!
//! Every thread owns exactly one scheduler: the microtask queue, the host
//! task queue, the timer queue, the clock and the active configuration. All
//! runtime components reach it through the functions in this module; borrows
//! are never held while user callbacks run.

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::task_queue::{MicroTask, MicrotaskQueue, Task, TaskQueue};
use crate::timer::{TimerEntry, TimerQueue};
use core_types::UncaughtError;
use std::cell::RefCell;
use std::time::Duration;

pub(crate) struct Scheduler {
    microtasks: RefCell<MicrotaskQueue>,
    tasks: RefCell<TaskQueue>,
    timers: RefCell<TimerQueue>,
    clock: RefCell<Clock>,
    config: RefCell<RuntimeConfig>,
}

impl Scheduler {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            microtasks: RefCell::new(MicrotaskQueue::new()),
            tasks: RefCell::new(TaskQueue::new()),
            timers: RefCell::new(TimerQueue::new()),
            clock: RefCell::new(Clock::new(config.clock)),
            config: RefCell::new(config),
        }
    }
}

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new(RuntimeConfig::default());
}

fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(f)
}

/// Drops all queued work and installs `config`.
pub(crate) fn reset(config: RuntimeConfig) {
    let (microtasks, tasks, timers) = with_scheduler(|scheduler| {
        *scheduler.clock.borrow_mut() = Clock::new(config.clock);
        *scheduler.config.borrow_mut() = config;
        (
            std::mem::take(&mut *scheduler.microtasks.borrow_mut()),
            std::mem::take(&mut *scheduler.tasks.borrow_mut()),
            std::mem::take(&mut *scheduler.timers.borrow_mut()),
        )
    });
    // Queued closures may own futures whose drop touches the scheduler.
    drop((microtasks, tasks, timers));
}

pub(crate) fn config() -> RuntimeConfig {
    with_scheduler(|scheduler| scheduler.config.borrow().clone())
}

pub(crate) fn enqueue_microtask(microtask: MicroTask) {
    with_scheduler(|scheduler| scheduler.microtasks.borrow_mut().enqueue(microtask));
}

pub(crate) fn enqueue_priority_microtask(microtask: MicroTask) {
    with_scheduler(|scheduler| {
        scheduler
            .microtasks
            .borrow_mut()
            .enqueue_priority(microtask)
    });
}

pub(crate) fn enqueue_task(task: Task) {
    with_scheduler(|scheduler| scheduler.tasks.borrow_mut().enqueue(task));
}

pub(crate) fn microtask_count() -> usize {
    with_scheduler(|scheduler| scheduler.microtasks.borrow().len())
}

pub(crate) fn task_count() -> usize {
    with_scheduler(|scheduler| scheduler.tasks.borrow().len())
}

pub(crate) fn active_timer_count() -> usize {
    with_scheduler(|scheduler| scheduler.timers.borrow().active_len())
}

pub(crate) fn now() -> Duration {
    with_scheduler(|scheduler| scheduler.clock.borrow().now())
}

pub(crate) fn add_timer(entry: TimerEntry) {
    with_scheduler(|scheduler| scheduler.timers.borrow_mut().push(entry));
}

/// Runs microtasks until the queue is empty.
///
/// Stops at the first uncaught error; the remaining microtasks stay queued.
pub(crate) fn drain_microtasks() -> Result<(), UncaughtError> {
    let mut ran = 0usize;
    loop {
        let next = with_scheduler(|scheduler| scheduler.microtasks.borrow_mut().dequeue());
        match next {
            Some(microtask) => {
                ran += 1;
                microtask.run()?;
            }
            None => {
                if ran > 0 {
                    log::trace!("drained {} microtasks", ran);
                }
                return Ok(());
            }
        }
    }
}

pub(crate) fn next_task() -> Option<Task> {
    with_scheduler(|scheduler| scheduler.tasks.borrow_mut().dequeue())
}

/// Fires the earliest active timer whose deadline is not after `limit`,
/// moving the clock to its deadline first. Returns false when no timer
/// qualified.
pub(crate) fn fire_next_timer(limit: Option<Duration>) -> bool {
    let entry = with_scheduler(|scheduler| {
        let mut timers = scheduler.timers.borrow_mut();
        let deadline = timers.next_deadline()?;
        if limit.is_some_and(|limit| deadline > limit) {
            return None;
        }
        scheduler.clock.borrow_mut().wait_until(deadline);
        timers.pop()
    });
    match entry {
        Some(entry) => {
            log::trace!("firing timer at {:?}", entry.deadline());
            entry.fire();
            true
        }
        None => false,
    }
}

/// Moves the clock to `target` without firing anything.
pub(crate) fn wait_until(target: Duration) {
    with_scheduler(|scheduler| scheduler.clock.borrow_mut().wait_until(target));
}
