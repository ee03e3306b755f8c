//! Future state transitions and listener propagation.
//!
//! Completing a future pushes one delivery per listener onto an explicit
//! work stack. A delivery runs the listener's handler and completes the
//! listener's result future, which pushes deliveries for *its* listeners.
//! Handler results that are futures are chained by moving listeners rather
//! than by recursion, so the native stack stays flat however long a chain
//! of futures grows.

use super::listener::Listener;
use super::{Future, FutureOr, FutureState, Thenable};
use core_types::{AsyncError, RuntimeError};
use std::mem;
use std::rc::Rc;

type Job = Box<dyn FnOnce(&mut Propagation)>;

/// The work stack of one propagation run.
pub(crate) struct Propagation {
    jobs: Vec<Job>,
}

impl Propagation {
    fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub(crate) fn push(&mut self, job: impl FnOnce(&mut Propagation) + 'static) {
        self.jobs.push(Box::new(job));
    }

    fn run(mut self) {
        while let Some(job) = self.jobs.pop() {
            job(&mut self);
        }
    }
}

/// Runs `start` and everything it pushes until the work stack is empty.
pub(crate) fn propagate(start: impl FnOnce(&mut Propagation) + 'static) {
    let mut work = Propagation::new();
    work.push(start);
    work.run();
}

impl<T: Clone + 'static> Future<T> {
    /// Returns true while nothing has claimed the right to complete.
    pub(crate) fn may_complete(&self) -> bool {
        matches!(*self.inner.state.borrow(), FutureState::Incomplete(_))
    }

    pub(crate) fn set_pending_complete(&self) {
        let mut state = self.inner.state.borrow_mut();
        if let FutureState::Incomplete(listeners) = &mut *state {
            let listeners = mem::take(listeners);
            *state = FutureState::PendingComplete(listeners);
        }
    }

    /// Stores the outcome and queues delivery to every listener, in
    /// registration order.
    pub(crate) fn settle(&self, outcome: Result<T, AsyncError>, work: &mut Propagation) {
        let listeners = {
            let mut state = self.inner.state.borrow_mut();
            let completed = match &outcome {
                Ok(value) => FutureState::Value(value.clone()),
                Err(error) => FutureState::Error(error.clone()),
            };
            match mem::replace(&mut *state, completed) {
                FutureState::Incomplete(listeners) | FutureState::PendingComplete(listeners) => {
                    listeners
                }
                previous => {
                    *state = previous;
                    log::warn!("ignoring a second completion of {:?}", self);
                    return;
                }
            }
        };

        if let Err(error) = &outcome {
            if listeners.is_empty() {
                self.inner.zone.handle_uncaught_error(error.clone());
                return;
            }
        }

        for listener in listeners.into_iter().rev() {
            let outcome = outcome.clone();
            let source_zone = self.inner.zone.clone();
            work.push(move |work| listener.deliver(outcome, &source_zone, work));
        }
    }

    /// Completes synchronously, running all resulting propagation now.
    pub(crate) fn complete_now(&self, outcome: Result<T, AsyncError>) {
        let future = self.clone();
        propagate(move |work| future.settle(outcome, work));
    }

    /// Completes with a handler result synchronously.
    pub(crate) fn complete_now_with(&self, produced: Result<FutureOr<T>, AsyncError>) {
        let future = self.clone();
        propagate(move |work| future.resolve(produced, work));
    }

    /// Claims the future and completes it in a later microtask.
    pub(crate) fn complete_async(&self, outcome: Result<T, AsyncError>) {
        self.set_pending_complete();
        let future = self.clone();
        self.inner.zone.schedule_microtask(move || {
            future.complete_now(outcome);
            Ok(())
        });
    }

    /// Completes with a handler result: a value or error settles the
    /// future, a future chains it.
    pub(crate) fn resolve(&self, produced: Result<FutureOr<T>, AsyncError>, work: &mut Propagation) {
        match produced {
            Ok(FutureOr::Value(value)) => self.settle(Ok(value), work),
            Ok(FutureOr::Future(source)) => self.chain_from(source, work),
            Ok(FutureOr::Foreign(thenable)) => self.chain_foreign(thenable),
            Err(error) => self.settle(Err(error), work),
        }
    }

    /// Makes this future complete with `source`'s outcome.
    ///
    /// A complete source settles this future now. Otherwise this future
    /// becomes chained and its listeners move to the end of the chain.
    pub(crate) fn chain_from(&self, source: Future<T>, work: &mut Propagation) {
        let source = source.chain_end();
        if Rc::ptr_eq(&source.inner, &self.inner) {
            let error = AsyncError::from(RuntimeError::argument(
                "A future cannot be completed with itself",
            ));
            self.settle(Err(error), work);
            return;
        }

        let outcome = match &*source.inner.state.borrow() {
            FutureState::Value(value) => Some(Ok(value.clone())),
            FutureState::Error(error) => Some(Err(error.clone())),
            _ => None,
        };
        if let Some(outcome) = outcome {
            self.settle(outcome, work);
            return;
        }

        let moved = {
            let mut state = self.inner.state.borrow_mut();
            match mem::replace(&mut *state, FutureState::Chained(source.clone())) {
                FutureState::Incomplete(listeners) | FutureState::PendingComplete(listeners) => {
                    listeners
                }
                previous => {
                    *state = previous;
                    log::warn!("ignoring a chain onto completed {:?}", self);
                    return;
                }
            }
        };
        let mut source_state = source.inner.state.borrow_mut();
        if let FutureState::Incomplete(listeners) | FutureState::PendingComplete(listeners) =
            &mut *source_state
        {
            listeners.extend(moved);
        }
    }

    /// Completes with the outcome a foreign future-like value reports.
    pub(crate) fn chain_foreign(&self, thenable: Box<dyn Thenable<T>>) {
        self.set_pending_complete();
        let on_value = self.clone();
        let on_error = self.clone();
        thenable.then_forward(
            Box::new(move |value| on_value.complete_now(Ok(value))),
            Box::new(move |error| on_error.complete_now(Err(error))),
        );
    }

    /// The last future in this future's chain.
    fn chain_end(&self) -> Future<T> {
        let mut current = self.clone();
        loop {
            let next = match &*current.inner.state.borrow() {
                FutureState::Chained(next) => next.clone(),
                _ => break,
            };
            current = next;
        }
        current
    }

    /// Attaches a listener. A listener on a complete future is delivered in
    /// a later microtask, never synchronously.
    pub(crate) fn add_listener(&self, listener: Box<dyn Listener<T>>) {
        let target = self.chain_end();
        let outcome = {
            let mut state = target.inner.state.borrow_mut();
            match &mut *state {
                FutureState::Incomplete(listeners) | FutureState::PendingComplete(listeners) => {
                    listeners.push(listener);
                    return;
                }
                FutureState::Value(value) => Ok(value.clone()),
                FutureState::Error(error) => Err(error.clone()),
                FutureState::Chained(_) => unreachable!("chain_end returned a chained future"),
            }
        };
        let source_zone = target.inner.zone.clone();
        target.inner.zone.schedule_microtask(move || {
            propagate(move |work| listener.deliver(outcome, &source_zone, work));
            Ok(())
        });
    }

    /// The outcome, if the future (or the end of its chain) is complete.
    pub fn outcome(&self) -> Option<Result<T, AsyncError>> {
        match &*self.chain_end().inner.state.borrow() {
            FutureState::Value(value) => Some(Ok(value.clone())),
            FutureState::Error(error) => Some(Err(error.clone())),
            _ => None,
        }
    }
}
