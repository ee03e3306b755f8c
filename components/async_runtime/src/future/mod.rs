//! Futures: single deferred results.
//!
//! A [`Future`] starts incomplete and completes exactly once, with a value
//! or an [`AsyncError`]. Continuations registered with [`Future::then`] and
//! friends run in the zone they were registered in, never synchronously
//! inside the registering call, and each returns a new future for the
//! continuation's own result.
//!
//! # Examples
//!
//! ```
//! use async_runtime::{EventLoop, Future};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut event_loop = EventLoop::new();
//! let seen = Rc::new(RefCell::new(None));
//! let sink = seen.clone();
//!
//! Future::value(1).then(|x| x + 1).then(move |x| *sink.borrow_mut() = Some(x));
//! assert_eq!(*seen.borrow(), None);
//!
//! event_loop.run_until_done().unwrap();
//! assert_eq!(*seen.borrow(), Some(2));
//! ```

mod combinators;
mod completer;
mod listener;
mod propagate;
mod release;

pub use completer::Completer;

use crate::stream::Stream;
use crate::timer::Timer;
use crate::zone::{OnError, Zone};
use core_types::AsyncError;
use listener::{InternalListener, ListenerKind, ListenerRecord};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

pub(crate) use listener::Listener;
pub(crate) use propagate::{propagate, Propagation};

/// A result that is either available now or still to come.
pub enum FutureOr<T> {
    /// An immediate value
    Value(T),
    /// A future of this runtime
    Future(Future<T>),
    /// A future-like value from elsewhere
    Foreign(Box<dyn Thenable<T>>),
}

impl<T> FutureOr<T> {
    /// Wraps an immediate value.
    pub fn value(value: T) -> Self {
        FutureOr::Value(value)
    }
}

impl<T> From<Future<T>> for FutureOr<T> {
    fn from(future: Future<T>) -> Self {
        FutureOr::Future(future)
    }
}

/// A future-like value that is not a [`Future`] of this runtime.
///
/// Returning one from a continuation makes the continuation's future wait
/// for it, just like returning a [`Future`].
pub trait Thenable<T> {
    /// Registers the two callbacks. Exactly one of them must be called, at
    /// most once.
    fn then_forward(self: Box<Self>, on_value: Box<dyn FnOnce(T)>, on_error: Box<dyn FnOnce(AsyncError)>);
}

pub(crate) enum FutureState<T> {
    Incomplete(Vec<Box<dyn Listener<T>>>),
    PendingComplete(Vec<Box<dyn Listener<T>>>),
    Chained(Future<T>),
    Value(T),
    Error(AsyncError),
}

impl<T> FutureState<T> {
    fn name(&self) -> &'static str {
        match self {
            FutureState::Incomplete(_) => "incomplete",
            FutureState::PendingComplete(_) => "pending-complete",
            FutureState::Chained(_) => "chained",
            FutureState::Value(_) => "value",
            FutureState::Error(_) => "error",
        }
    }
}

pub(crate) struct FutureInner<T> {
    state: RefCell<FutureState<T>>,
    zone: Zone,
    release: fn(FutureState<T>),
}

impl<T> Drop for FutureInner<T> {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), FutureState::Incomplete(Vec::new()));
        (self.release)(state);
    }
}

/// The eventual result of an asynchronous computation.
///
/// Cloning is cheap: clones observe the same completion.
pub struct Future<T> {
    inner: Rc<FutureInner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.try_borrow() {
            Ok(state) => state.name(),
            Err(_) => "busy",
        };
        f.debug_struct("Future")
            .field("state", &state)
            .field("zone", &self.inner.zone)
            .finish()
    }
}

impl<T: Clone + 'static> Future<T> {
    /// An incomplete future owned by the current zone.
    pub(crate) fn pending() -> Self {
        Self {
            inner: Rc::new(FutureInner {
                state: RefCell::new(FutureState::Incomplete(Vec::new())),
                zone: Zone::current(),
                release: release::release_state::<T>,
            }),
        }
    }

    /// A future completed with `value` in a later microtask.
    pub fn value(value: T) -> Self {
        let future = Self::pending();
        future.complete_async(Ok(value));
        future
    }

    /// A future completed with `error` in a later microtask. The current
    /// zone may replace the error first.
    pub fn error(error: AsyncError) -> Self {
        let error = Zone::current().replace_error(error);
        let future = Self::pending();
        future.complete_async(Err(error));
        future
    }

    /// Runs `computation` now and returns a future for its result.
    pub fn sync(computation: impl FnOnce() -> Result<FutureOr<T>, AsyncError>) -> Self {
        match computation() {
            Ok(FutureOr::Value(value)) => Future::value(value),
            Ok(FutureOr::Future(future)) => future,
            Ok(FutureOr::Foreign(thenable)) => {
                let future = Self::pending();
                future.chain_foreign(thenable);
                future
            }
            Err(error) => Future::error(error),
        }
    }

    /// Runs `computation` in a microtask.
    pub fn microtask(computation: impl FnOnce() -> Result<FutureOr<T>, AsyncError> + 'static) -> Self {
        let future = Self::pending();
        let target = future.clone();
        Zone::current().schedule_microtask(move || {
            target.complete_now_with(computation());
            Ok(())
        });
        future
    }

    /// Runs `computation` in a zero-delay timer, after pending microtasks.
    pub fn run(computation: impl FnOnce() -> Result<FutureOr<T>, AsyncError> + 'static) -> Self {
        Self::delayed(Duration::ZERO, computation)
    }

    /// Runs `computation` after `duration`.
    pub fn delayed(
        duration: Duration,
        computation: impl FnOnce() -> Result<FutureOr<T>, AsyncError> + 'static,
    ) -> Self {
        let future = Self::pending();
        let target = future.clone();
        Timer::new(duration, move || {
            target.complete_now_with(computation());
            Ok(())
        });
        future
    }

    /// Registers a value handler and an optional error handler.
    ///
    /// The returned future completes with the handler's result. Without an
    /// error handler an error passes through unchanged.
    pub fn then_with<U: Clone + 'static>(
        &self,
        on_value: impl Fn(T) -> Result<FutureOr<U>, AsyncError> + 'static,
        on_error: Option<OnError<Result<FutureOr<U>, AsyncError>>>,
    ) -> Future<U> {
        let zone = Zone::current();
        let on_value = zone.register_unary_callback(on_value);
        let on_error = on_error.map(|handler| handler.register_in(&zone));
        self.listen_with(ListenerKind::Then { on_value, on_error }, zone)
    }

    /// Maps the value.
    pub fn then<U: Clone + 'static>(&self, on_value: impl Fn(T) -> U + 'static) -> Future<U> {
        self.then_with(move |value| Ok(FutureOr::Value(on_value(value))), None)
    }

    /// Maps the value with a handler that may fail.
    pub fn try_then<U: Clone + 'static>(
        &self,
        on_value: impl Fn(T) -> Result<U, AsyncError> + 'static,
    ) -> Future<U> {
        self.then_with(move |value| on_value(value).map(FutureOr::Value), None)
    }

    /// Continues with another future.
    pub fn and_then<U: Clone + 'static>(&self, on_value: impl Fn(T) -> Future<U> + 'static) -> Future<U> {
        self.then_with(move |value| Ok(FutureOr::Future(on_value(value))), None)
    }

    /// Recovers from any error.
    pub fn catch_error(&self, on_error: impl Fn(AsyncError) -> Result<T, AsyncError> + 'static) -> Future<T> {
        self.catch_error_with(
            OnError::unary(move |error| on_error(error).map(FutureOr::Value)),
            None::<fn(&AsyncError) -> bool>,
        )
    }

    /// Recovers from errors for which `test` returns true; other errors pass
    /// through.
    pub fn catch_error_where(
        &self,
        test: impl Fn(&AsyncError) -> bool + 'static,
        on_error: impl Fn(AsyncError) -> Result<T, AsyncError> + 'static,
    ) -> Future<T> {
        self.catch_error_with(
            OnError::unary(move |error| on_error(error).map(FutureOr::Value)),
            Some(test),
        )
    }

    /// General form of [`Future::catch_error`].
    pub fn catch_error_with<P>(
        &self,
        on_error: OnError<Result<FutureOr<T>, AsyncError>>,
        test: Option<P>,
    ) -> Future<T>
    where
        P: Fn(&AsyncError) -> bool + 'static,
    {
        let zone = Zone::current();
        let on_error = on_error.register_in(&zone);
        let test = test.map(|test| {
            zone.register_unary_callback(move |error: AsyncError| test(&error))
        });
        self.listen_with(
            ListenerKind::CatchError {
                on_error,
                test,
                forward: |value| value,
            },
            zone,
        )
    }

    /// Runs `action` on completion either way; the result future keeps the
    /// original outcome.
    pub fn when_complete(&self, action: impl Fn() + 'static) -> Future<T> {
        self.when_complete_with(move || {
            action();
            Ok(FutureOr::Value(()))
        })
    }

    /// Like [`Future::when_complete`]. If `action` returns a future the
    /// result waits for it; if `action` fails, so does the result.
    pub fn when_complete_with(
        &self,
        action: impl Fn() -> Result<FutureOr<()>, AsyncError> + 'static,
    ) -> Future<T> {
        let zone = Zone::current();
        let action = zone.register_callback(action);
        self.listen_with(
            ListenerKind::WhenComplete {
                action,
                forward: |value| value,
            },
            zone,
        )
    }

    fn listen_with<U: Clone + 'static>(&self, kind: ListenerKind<T, U>, zone: Zone) -> Future<U> {
        let result = Future::<U>::pending();
        self.add_listener(Box::new(ListenerRecord {
            kind,
            result: result.clone(),
            zone,
        }));
        result
    }

    /// Marks an error of this future as handled.
    pub fn ignore(&self) {
        self.add_listener(Box::new(InternalListener::new(|_, _| {})));
    }

    /// Returns true once the future holds its value or error.
    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    /// A single-subscription stream with this future's outcome followed by
    /// done.
    pub fn as_stream(&self) -> Stream<T> {
        Stream::from_future(self.clone())
    }
}
