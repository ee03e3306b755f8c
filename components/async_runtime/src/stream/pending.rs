//! Events waiting for a subscription to be able to fire.

use core_types::AsyncError;
use std::collections::VecDeque;
use std::fmt;

/// One stream event.
pub(crate) enum StreamEvent<T> {
    Data(T),
    Error(AsyncError),
    Done,
}

impl<T> fmt::Debug for StreamEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::Data(_) => f.write_str("Data"),
            StreamEvent::Error(error) => write!(f, "Error({})", error),
            StreamEvent::Done => f.write_str("Done"),
        }
    }
}

/// Whether a drain microtask is queued.
///
/// `Canceled` means a microtask is still queued but should do nothing when
/// it runs; scheduling again revives it instead of queueing another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleState {
    Unscheduled,
    Scheduled,
    Canceled,
}

/// A FIFO of delayed events, optionally followed by events pulled lazily
/// from an iterator.
pub(crate) struct PendingEvents<T> {
    queue: VecDeque<StreamEvent<T>>,
    source: Option<Box<dyn Iterator<Item = Result<T, AsyncError>>>>,
    schedule: ScheduleState,
}

impl<T> PendingEvents<T> {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            source: None,
            schedule: ScheduleState::Unscheduled,
        }
    }

    /// Events produced on demand by `source`, then done.
    pub(crate) fn from_iter(source: impl Iterator<Item = Result<T, AsyncError>> + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new()
        }
    }

    pub(crate) fn push(&mut self, event: StreamEvent<T>) {
        self.queue.push_back(event);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.source.is_none()
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self) -> bool {
        self.schedule == ScheduleState::Scheduled
    }

    /// Marks the queue scheduled. Returns true if the caller must queue a
    /// drain microtask.
    pub(crate) fn schedule(&mut self) -> bool {
        match self.schedule {
            ScheduleState::Scheduled => false,
            _ if self.is_empty() => false,
            ScheduleState::Canceled => {
                self.schedule = ScheduleState::Scheduled;
                false
            }
            ScheduleState::Unscheduled => {
                self.schedule = ScheduleState::Scheduled;
                true
            }
        }
    }

    pub(crate) fn cancel_schedule(&mut self) {
        if self.schedule == ScheduleState::Scheduled {
            self.schedule = ScheduleState::Canceled;
        }
    }

    /// Called by the drain microtask. Returns false if the drain was
    /// canceled after it was queued.
    pub(crate) fn take_schedule(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.schedule, ScheduleState::Unscheduled);
        previous != ScheduleState::Canceled
    }

    pub(crate) fn next_event(&mut self) -> Option<StreamEvent<T>> {
        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }
        let source = self.source.as_mut()?;
        match source.next() {
            Some(Ok(value)) => Some(StreamEvent::Data(value)),
            Some(Err(error)) => Some(StreamEvent::Error(error)),
            None => {
                self.source = None;
                Some(StreamEvent::Done)
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.source = None;
    }
}

impl<T> Default for PendingEvents<T> {
    fn default() -> Self {
        Self::new()
    }
}
