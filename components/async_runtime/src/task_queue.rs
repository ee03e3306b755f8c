//! Task and microtask queue management.
//!
//! This module provides the queues drained by the event loop. Host tasks are
//! executed one at a time, with all microtasks draining after each task.
//! The microtask queue carries a priority segment at its front which is used
//! to surface uncaught errors ahead of ordinary work.

use core_types::{AsyncError, UncaughtError};
use std::collections::VecDeque;

/// A host task to be executed by the event loop.
///
/// Tasks represent macro-level work such as I/O completions. Timers are kept
/// in their own queue (see [`crate::Timer`]).
pub struct Task {
    callback: Box<dyn FnOnce() -> Result<(), AsyncError>>,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), AsyncError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the task.
    pub fn run(self) -> Result<(), AsyncError> {
        (self.callback)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task {{ ... }}")
    }
}

/// A microtask to be executed by the event loop.
///
/// Microtasks are executed after each task and before any timer fires.
/// Future completions and stream event drains are microtasks. A microtask
/// only fails when it reports an uncaught error to the host.
pub struct MicroTask {
    callback: Box<dyn FnOnce() -> Result<(), UncaughtError>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the microtask runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), UncaughtError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the microtask.
    pub fn run(self) -> Result<(), UncaughtError> {
        (self.callback)()
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MicroTask {{ ... }}")
    }
}

/// A queue for tasks.
///
/// Tasks are processed in FIFO order, one at a time.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<Task>,
}

impl TaskQueue {
    /// Creates a new empty TaskQueue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Adds a task to the end of the queue.
    pub fn enqueue(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Removes and returns the next task from the queue.
    pub fn dequeue(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of tasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued task.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// A queue for microtasks.
///
/// Ordinary microtasks run in FIFO order. Priority microtasks are kept as a
/// prefix of the queue: each one is inserted after the last priority entry
/// still waiting, which places it ahead of every ordinary entry queued so
/// far while keeping priority entries FIFO among themselves.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<MicroTask>,
    priority_len: usize,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            priority_len: 0,
        }
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&mut self, microtask: MicroTask) {
        self.queue.push_back(microtask);
    }

    /// Adds a microtask ahead of all ordinary microtasks.
    pub fn enqueue_priority(&mut self, microtask: MicroTask) {
        self.queue.insert(self.priority_len, microtask);
        self.priority_len += 1;
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        let microtask = self.queue.pop_front()?;
        self.priority_len = self.priority_len.saturating_sub(1);
        Some(microtask)
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued microtask.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.priority_len = 0;
    }
}
