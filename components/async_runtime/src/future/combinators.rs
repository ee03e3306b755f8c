//! Combinators over several futures, and timeouts.

use super::{Future, FutureOr};
use crate::timer::Timer;
use crate::zone::{OnError, Zone};
use core_types::{AsyncError, RuntimeError, StackTrace};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

struct WaitState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
    error: Option<AsyncError>,
}

impl<T: Clone + 'static> Future<T> {
    /// Waits for every future and completes with their values in order.
    ///
    /// If any future fails, the result fails with the first error: as soon
    /// as it happens when `eager_error` is set, otherwise once every future
    /// has completed. An empty list yields an empty vector.
    pub fn wait(futures: Vec<Future<T>>, eager_error: bool) -> Future<Vec<T>> {
        if futures.is_empty() {
            return Future::value(Vec::new());
        }

        let result = Future::<Vec<T>>::pending();
        let state = Rc::new(RefCell::new(WaitState {
            values: vec![None; futures.len()],
            remaining: futures.len(),
            error: None,
        }));

        for (index, future) in futures.iter().enumerate() {
            let (on_value_state, on_value_result) = (state.clone(), result.clone());
            let (on_error_state, on_error_result) = (state.clone(), result.clone());
            future.then_with(
                move |value: T| {
                    let mut guard = on_value_state.borrow_mut();
                    let state = &mut *guard;
                    state.values[index] = Some(value);
                    state.remaining -= 1;
                    if state.remaining == 0 {
                        let outcome = match &state.error {
                            Some(error) if !eager_error => Some(Err(error.clone())),
                            Some(_) => None,
                            None => Some(Ok(state.values.drain(..).flatten().collect())),
                        };
                        drop(guard);
                        if let Some(outcome) = outcome {
                            on_value_result.complete_now(outcome);
                        }
                    }
                    Ok(FutureOr::Value(()))
                },
                Some(OnError::unary(move |error: AsyncError| {
                    let mut state = on_error_state.borrow_mut();
                    state.remaining -= 1;
                    let outcome = if state.error.is_none() {
                        state.error = Some(error.clone());
                        (eager_error || state.remaining == 0).then_some(error)
                    } else if state.remaining == 0 && !eager_error {
                        state.error.clone()
                    } else {
                        None
                    };
                    drop(state);
                    if let Some(error) = outcome {
                        on_error_result.complete_now(Err(error));
                    }
                    Ok(FutureOr::Value(()))
                })),
            );
        }
        result
    }

    /// Completes with the outcome of whichever future completes first.
    ///
    /// An empty list yields a future that never completes.
    pub fn any(futures: Vec<Future<T>>) -> Future<T> {
        let result = Future::<T>::pending();
        for future in &futures {
            let (on_value, on_error) = (result.clone(), result.clone());
            future.then_with(
                move |value: T| {
                    if on_value.may_complete() {
                        on_value.complete_now(Ok(value));
                    }
                    Ok(FutureOr::Value(()))
                },
                Some(OnError::unary(move |error: AsyncError| {
                    if on_error.may_complete() {
                        on_error.complete_now(Err(error));
                    }
                    Ok(FutureOr::Value(()))
                })),
            );
        }
        result
    }

    /// Fails with a timeout error if this future has not completed within
    /// `limit`.
    pub fn timeout(&self, limit: Duration) -> Future<T> {
        let result = Future::<T>::pending();
        let expired = result.clone();
        let timer = Timer::new(limit, move || {
            let error = AsyncError::with_stack_trace(
                RuntimeError::timeout("Future not completed", limit),
                StackTrace::empty(),
            );
            expired.complete_now(Err(error));
            Ok(())
        });
        self.race_against(timer, &result);
        result
    }

    /// Completes with the result of `on_timeout` if this future has not
    /// completed within `limit`. `on_timeout` runs in the current zone.
    pub fn timeout_with(
        &self,
        limit: Duration,
        on_timeout: impl Fn() -> Result<FutureOr<T>, AsyncError> + 'static,
    ) -> Future<T> {
        let zone = Zone::current();
        let on_timeout = zone.register_callback(on_timeout);
        let result = Future::<T>::pending();
        let expired = result.clone();
        let timer = Timer::new(limit, move || {
            let produced = zone.run(|| on_timeout());
            expired.complete_now_with(produced);
            Ok(())
        });
        self.race_against(timer, &result);
        result
    }

    fn race_against(&self, timer: Timer, result: &Future<T>) {
        let (value_timer, error_timer) = (timer.clone(), timer);
        let (on_value, on_error) = (result.clone(), result.clone());
        self.then_with(
            move |value: T| {
                if value_timer.is_active() {
                    value_timer.cancel();
                    on_value.complete_now(Ok(value));
                }
                Ok(FutureOr::Value(()))
            },
            Some(OnError::unary(move |error: AsyncError| {
                if error_timer.is_active() {
                    error_timer.cancel();
                    on_error.complete_now(Err(error));
                }
                Ok(FutureOr::Value(()))
            })),
        );
    }
}
