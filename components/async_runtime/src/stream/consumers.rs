//! Stream consumers: operations that listen to a whole stream and report a
//! single result as a future.
//!
//! Every consumer listens with `cancel_on_error`, so the first error event
//! ends the subscription and fails the result. Consumers that can decide
//! early (`first`, `is_empty`, `contains`) cancel the subscription and
//! complete only once the cancel has finished.

use super::subscription::SubscriptionCore;
use super::{Stream, StreamHandlers, StreamSubscription};
use crate::future::Future;
use crate::zone::{OnError, Zone};
use core_types::{AsyncError, RuntimeError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn complete<V: Clone + 'static>(result: &Future<V>, outcome: Result<V, AsyncError>) {
    if result.may_complete() {
        result.complete_now(outcome);
    }
}

fn no_element() -> AsyncError {
    Zone::current().replace_error(AsyncError::new(RuntimeError::state("No element")))
}

fn cancel_and_value<T: Clone + 'static, V: Clone + 'static>(core: &SubscriptionCore<T>, result: &Future<V>, value: V) {
    match core.cancel() {
        Some(cleanup) => {
            let result = result.clone();
            cleanup.when_complete(move || complete(&result, Ok(value.clone())));
        }
        None => complete(result, Ok(value)),
    }
}

fn cancel_and_error<T: Clone + 'static, V: Clone + 'static>(
    core: &SubscriptionCore<T>,
    result: &Future<V>,
    error: AsyncError,
) {
    let error = Zone::current().replace_error(error);
    match core.cancel() {
        Some(cleanup) => {
            let result = result.clone();
            cleanup.when_complete(move || complete(&result, Err(error.clone())));
        }
        None => complete(result, Err(error)),
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Listens with `cancel_on_error`, failing `result` on the first error
    /// and calling `on_done` at the end. The caller installs the data
    /// handler.
    fn consume<V: Clone + 'static>(
        &self,
        result: &Future<V>,
        on_done: impl Fn() + 'static,
    ) -> Result<StreamSubscription<T>, RuntimeError> {
        let failed = result.clone();
        self.listen_with(
            StreamHandlers::new()
                .with_error(OnError::unary(move |error: AsyncError| {
                    complete(&failed, Err(error));
                    Ok(())
                }))
                .with_done(on_done)
                .with_cancel_on_error(true),
        )
    }

    /// The first data event. Fails with `Bad state: No element` if the
    /// stream is empty.
    pub fn first(&self) -> Result<Future<T>, RuntimeError> {
        let result = Future::pending();
        let empty = result.clone();
        let subscription = self.consume(&result, move || complete(&empty, Err(no_element())))?;
        let (core, target) = (subscription.core().clone(), result.clone());
        subscription.on_data(move |value| cancel_and_value(&core, &target, value));
        Ok(result)
    }

    /// The last data event. Fails with `Bad state: No element` if the
    /// stream is empty.
    pub fn last(&self) -> Result<Future<T>, RuntimeError> {
        let result = Future::pending();
        let latest: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let (seen, target) = (latest.clone(), result.clone());
        let subscription = self.consume(&result, move || {
            let outcome = seen.borrow_mut().take().ok_or_else(no_element);
            complete(&target, outcome);
        })?;
        subscription.on_data(move |value| *latest.borrow_mut() = Some(value));
        Ok(result)
    }

    /// The number of data events.
    pub fn length(&self) -> Result<Future<usize>, RuntimeError> {
        let result = Future::pending();
        let count = Rc::new(Cell::new(0usize));
        let (counted, target) = (count.clone(), result.clone());
        let subscription = self.consume(&result, move || complete(&target, Ok(counted.get())))?;
        subscription.on_data(move |_| count.set(count.get() + 1));
        Ok(result)
    }

    /// Whether the stream ends without a data event. Stops listening at the
    /// first data event.
    pub fn is_empty(&self) -> Result<Future<bool>, RuntimeError> {
        let result = Future::pending();
        let target = result.clone();
        let subscription = self.consume(&result, move || complete(&target, Ok(true)))?;
        let (core, target) = (subscription.core().clone(), result.clone());
        subscription.on_data(move |_| cancel_and_value(&core, &target, false));
        Ok(result)
    }

    /// Whether some data event equals `needle`. Stops listening at the first
    /// match.
    pub fn contains(&self, needle: T) -> Result<Future<bool>, RuntimeError>
    where
        T: PartialEq,
    {
        let result = Future::pending();
        let target = result.clone();
        let subscription = self.consume(&result, move || complete(&target, Ok(false)))?;
        let (core, target) = (subscription.core().clone(), result.clone());
        subscription.on_data(move |value| {
            if value == needle {
                cancel_and_value(&core, &target, true);
            }
        });
        Ok(result)
    }

    /// All data events, in order.
    pub fn to_list(&self) -> Result<Future<Vec<T>>, RuntimeError> {
        let result = Future::pending();
        let items: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
        let (collected, target) = (items.clone(), result.clone());
        let subscription = self.consume(&result, move || {
            let items = std::mem::take(&mut *collected.borrow_mut());
            complete(&target, Ok(items));
        })?;
        subscription.on_data(move |value| items.borrow_mut().push(value));
        Ok(result)
    }

    /// Combines the data events into one value, starting from `initial`.
    /// A failing `combine` cancels the subscription and fails the result.
    pub fn fold<A: Clone + 'static>(
        &self,
        initial: A,
        combine: impl Fn(A, T) -> Result<A, AsyncError> + 'static,
    ) -> Result<Future<A>, RuntimeError> {
        let result = Future::pending();
        let accumulator = Rc::new(RefCell::new(Some(initial)));
        let (folded, target) = (accumulator.clone(), result.clone());
        let subscription = self.consume(&result, move || {
            if let Some(value) = folded.borrow_mut().take() {
                complete(&target, Ok(value));
            }
        })?;
        let (core, target) = (subscription.core().clone(), result.clone());
        subscription.on_data(move |value| {
            let Some(current) = accumulator.borrow_mut().take() else {
                return;
            };
            match combine(current, value) {
                Ok(next) => *accumulator.borrow_mut() = Some(next),
                Err(error) => cancel_and_error(&core, &target, error),
            }
        });
        Ok(result)
    }

    /// Runs `action` on every data event. A failing `action` cancels the
    /// subscription and fails the result.
    pub fn for_each(
        &self,
        action: impl Fn(T) -> Result<(), AsyncError> + 'static,
    ) -> Result<Future<()>, RuntimeError> {
        let result = Future::pending();
        let target = result.clone();
        let subscription = self.consume(&result, move || complete(&target, Ok(())))?;
        let (core, target) = (subscription.core().clone(), result.clone());
        subscription.on_data(move |value| {
            if let Err(error) = action(value) {
                cancel_and_error(&core, &target, error);
            }
        });
        Ok(result)
    }

    /// Discards all data events; completes with `value` at done, or with
    /// the first error.
    pub fn drain<V: Clone + 'static>(&self, value: V) -> Result<Future<V>, RuntimeError> {
        let subscription = self.listen_with(StreamHandlers::new().with_cancel_on_error(true))?;
        Ok(subscription.as_future(value))
    }
}
