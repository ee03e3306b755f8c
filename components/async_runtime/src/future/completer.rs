//! Completers: the producer side of a future.

use super::listener::InternalListener;
use super::{propagate, Future, Propagation};
use crate::zone::Zone;
use core_types::{AsyncError, RuntimeError};

/// Creates a [`Future`] and completes it later.
///
/// An asynchronous completer (the default) never runs the future's
/// listeners inside `complete`; they run in a later microtask. A
/// synchronous completer runs them immediately and should only be used
/// when completion already happens as the last step of an asynchronous
/// event.
///
/// # Examples
///
/// ```
/// use async_runtime::{Completer, EventLoop};
///
/// let mut event_loop = EventLoop::new();
/// let completer = Completer::new();
/// let doubled = completer.future().then(|x: i32| x * 2);
///
/// completer.complete(21).unwrap();
/// assert!(completer.complete(0).is_err());
///
/// event_loop.run_until_done().unwrap();
/// assert_eq!(doubled.outcome().unwrap().unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct Completer<T> {
    future: Future<T>,
    sync: bool,
}

impl<T: Clone + 'static> Completer<T> {
    /// A completer that notifies listeners in a later microtask.
    pub fn new() -> Self {
        Self {
            future: Future::pending(),
            sync: false,
        }
    }

    /// A completer that notifies listeners during `complete`.
    pub fn sync() -> Self {
        Self {
            future: Future::pending(),
            sync: true,
        }
    }

    /// The future this completer completes.
    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }

    /// Returns true once any of the `complete` methods succeeded.
    pub fn is_completed(&self) -> bool {
        !self.future.may_complete()
    }

    fn claim(&self) -> Result<(), RuntimeError> {
        if self.is_completed() {
            return Err(RuntimeError::state("Future already completed"));
        }
        Ok(())
    }

    /// Completes the future with `value`.
    pub fn complete(&self, value: T) -> Result<(), RuntimeError> {
        self.claim()?;
        if self.sync {
            self.future.complete_now(Ok(value));
        } else {
            self.future.complete_async(Ok(value));
        }
        Ok(())
    }

    /// Completes the future with whatever `source` completes with.
    pub fn complete_future(&self, source: Future<T>) -> Result<(), RuntimeError> {
        self.claim()?;
        let target = self.future.clone();
        if self.sync {
            propagate(move |work| target.chain_from(source, work));
        } else {
            target.set_pending_complete();
            source.add_listener(Box::new(InternalListener::new(
                move |outcome, work: &mut Propagation| target.settle(outcome, work),
            )));
        }
        Ok(())
    }

    /// Completes the future with `error`. The current zone may replace the
    /// error first.
    pub fn complete_error(&self, error: AsyncError) -> Result<(), RuntimeError> {
        self.claim()?;
        let error = Zone::current().replace_error(error);
        if self.sync {
            self.future.complete_now(Err(error));
        } else {
            self.future.complete_async(Err(error));
        }
        Ok(())
    }
}

impl<T: Clone + 'static> Default for Completer<T> {
    fn default() -> Self {
        Self::new()
    }
}
