//! Buffering stream subscriptions.
//!
//! Every stream delivers its events through a [`SubscriptionCore`]. An
//! event fires synchronously when the subscription can fire: not paused,
//! nothing queued ahead of it, and not already inside one of its own
//! callbacks. Otherwise the event is queued and a microtask drains the
//! queue one event at a time.

use super::pending::{PendingEvents, StreamEvent};
use super::StreamHandlers;
use crate::future::Future;
use crate::zone::{OnError, Zone};
use core_types::AsyncError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type DataHandler<T> = Rc<dyn Fn(T) -> Result<(), AsyncError>>;
type DoneHandler = Rc<dyn Fn() -> Result<(), AsyncError>>;

/// Lifecycle phase of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Phase {
    #[default]
    Open,
    /// The done event has been queued or delivered.
    Closed,
    Canceled,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SubscriptionState {
    phase: Phase,
    pause_count: u32,
    cancel_on_error: bool,
    input_paused: bool,
    wait_for_cancel: bool,
    in_callback: bool,
    has_pending: bool,
}

impl SubscriptionState {
    fn is_canceled(&self) -> bool {
        self.phase == Phase::Canceled
    }

    fn is_paused(&self) -> bool {
        self.pause_count > 0
    }

    fn can_fire(&self) -> bool {
        !self.in_callback && !self.has_pending && !self.is_paused()
    }
}

/// Callbacks into whatever produces a subscription's events.
pub(crate) trait SubscriptionHooks {
    /// Input became paused.
    fn on_pause(&self) {}

    /// Input resumed.
    fn on_resume(&self) {}

    /// The subscription was canceled. A returned future makes pending
    /// done and cancel-on-error deliveries wait for it.
    fn on_cancel(&self) -> Option<Future<()>> {
        None
    }
}

struct Handlers<T> {
    on_data: DataHandler<T>,
    on_error: OnError<Result<(), AsyncError>>,
    on_done: DoneHandler,
}

/// The state machine behind [`StreamSubscription`].
pub(crate) struct SubscriptionCore<T> {
    this: Weak<SubscriptionCore<T>>,
    zone: Zone,
    state: Cell<SubscriptionState>,
    handlers: RefCell<Option<Handlers<T>>>,
    pending: RefCell<PendingEvents<T>>,
    hooks: RefCell<Option<Rc<dyn SubscriptionHooks>>>,
    cancel_future: RefCell<Option<Future<()>>>,
}

impl<T: Clone + 'static> SubscriptionCore<T> {
    /// A subscription in the current zone with its handlers registered
    /// there.
    pub(crate) fn new(handlers: StreamHandlers<T>) -> Rc<Self> {
        let zone = Zone::current();
        let StreamHandlers {
            on_data,
            on_error,
            on_done,
            cancel_on_error,
        } = handlers;
        let handlers = Handlers {
            on_data: match on_data {
                Some(on_data) => zone.register_unary_callback(move |data: T| on_data(data)),
                None => Rc::new(|_| Ok(())),
            },
            on_error: on_error.unwrap_or_else(|| OnError::unary(Err)).register_in(&zone),
            on_done: match on_done {
                Some(on_done) => zone.register_callback(move || on_done()),
                None => Rc::new(|| Ok(())),
            },
        };
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            zone,
            state: Cell::new(SubscriptionState {
                cancel_on_error,
                ..SubscriptionState::default()
            }),
            handlers: RefCell::new(Some(handlers)),
            pending: RefCell::new(PendingEvents::new()),
            hooks: RefCell::new(None),
            cancel_future: RefCell::new(None),
        })
    }

    pub(crate) fn set_hooks(&self, hooks: Rc<dyn SubscriptionHooks>) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    fn hooks(&self) -> Option<Rc<dyn SubscriptionHooks>> {
        self.hooks.borrow().clone()
    }

    fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    fn update(&self, change: impl FnOnce(&mut SubscriptionState)) {
        let mut state = self.state.get();
        change(&mut state);
        self.state.set(state);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    pub(crate) fn is_input_paused(&self) -> bool {
        self.state().input_paused
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.state().is_canceled()
    }

    fn may_resume_input(&self) -> bool {
        !self.state().is_paused() && self.pending.borrow().is_empty()
    }

    /// Installs events that arrived before the subscription existed.
    pub(crate) fn set_pending_events(&self, pending: PendingEvents<T>) {
        let empty = pending.is_empty();
        *self.pending.borrow_mut() = pending;
        if !empty {
            self.update(|state| state.has_pending = true);
            self.schedule_pending();
        }
    }

    fn schedule_pending(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let needs_microtask = self.pending.borrow_mut().schedule();
        if needs_microtask {
            log::trace!("scheduling a stream event drain");
            Zone::current().schedule_microtask(move || {
                let proceed = this.pending.borrow_mut().take_schedule();
                if proceed {
                    this.handle_next();
                }
                Ok(())
            });
        }
    }

    fn handle_next(&self) {
        let event = self.pending.borrow_mut().next_event();
        match event {
            Some(StreamEvent::Data(data)) => self.send_data(data),
            Some(StreamEvent::Error(error)) => self.send_error(error),
            Some(StreamEvent::Done) => self.send_done(),
            None => {}
        }
    }

    // Event input.

    pub(crate) fn add(&self, data: T) {
        let state = self.state();
        if state.is_canceled() {
            return;
        }
        if state.can_fire() {
            self.send_data(data);
        } else {
            self.add_pending(StreamEvent::Data(data));
        }
    }

    pub(crate) fn add_error(&self, error: AsyncError) {
        let state = self.state();
        if state.is_canceled() {
            return;
        }
        if state.can_fire() {
            self.send_error(error);
        } else {
            self.add_pending(StreamEvent::Error(error));
        }
    }

    pub(crate) fn close(&self) {
        let state = self.state();
        if state.is_canceled() {
            return;
        }
        self.update(|state| state.phase = Phase::Closed);
        if state.can_fire() {
            self.send_done();
        } else {
            self.add_pending(StreamEvent::Done);
        }
    }

    /// Queues an event behind any already pending, never firing it
    /// synchronously.
    pub(crate) fn add_pending(&self, event: StreamEvent<T>) {
        if self.state().is_canceled() {
            return;
        }
        if matches!(event, StreamEvent::Done) {
            self.update(|state| state.phase = Phase::Closed);
        }
        self.pending.borrow_mut().push(event);
        let state = self.state();
        if !state.has_pending {
            self.update(|state| state.has_pending = true);
            if !state.is_paused() {
                self.schedule_pending();
            }
        }
    }

    // Flow control.

    pub(crate) fn pause(&self) {
        let state = self.state();
        if state.is_canceled() {
            return;
        }
        self.update(|state| {
            state.pause_count = state.pause_count.saturating_add(1);
            state.input_paused = true;
        });
        if !state.is_paused() {
            self.pending.borrow_mut().cancel_schedule();
        }
        if !state.input_paused && !state.in_callback {
            self.guard_callback(|| {
                if let Some(hooks) = self.hooks() {
                    hooks.on_pause();
                }
            });
        }
    }

    pub(crate) fn resume(&self) {
        let state = self.state();
        if state.is_canceled() {
            return;
        }
        if !state.is_paused() {
            log::debug!("ignoring resume of a subscription that is not paused");
            return;
        }
        self.update(|state| state.pause_count -= 1);
        let state = self.state();
        if state.is_paused() {
            return;
        }
        let has_events = state.has_pending && !self.pending.borrow().is_empty();
        if has_events {
            self.schedule_pending();
        } else {
            self.update(|state| state.input_paused = false);
            if !state.in_callback {
                self.guard_callback(|| {
                    if let Some(hooks) = self.hooks() {
                        hooks.on_resume();
                    }
                });
            }
        }
    }

    /// Cancels the subscription. Returns the producer's cleanup future, if
    /// it has one.
    pub(crate) fn cancel(&self) -> Option<Future<()>> {
        self.update(|state| state.wait_for_cancel = false);
        if !self.is_canceled() {
            self.cancel_internal();
        }
        self.handlers.borrow_mut().take();
        self.cancel_future.borrow().clone()
    }

    fn cancel_internal(&self) {
        self.update(|state| state.phase = Phase::Canceled);
        let state = self.state();
        {
            let mut pending = self.pending.borrow_mut();
            if state.has_pending {
                pending.cancel_schedule();
            }
            if !state.in_callback {
                pending.clear();
            }
        }
        log::debug!("stream subscription canceled");
        let hooks = self.hooks.borrow_mut().take();
        let cancel_future = hooks.and_then(|hooks| hooks.on_cancel());
        *self.cancel_future.borrow_mut() = cancel_future;
    }

    // Delivery.

    fn data_handler(&self) -> Option<DataHandler<T>> {
        self.handlers.borrow().as_ref().map(|handlers| handlers.on_data.clone())
    }

    fn send_data(&self, data: T) {
        let was_input_paused = self.state().input_paused;
        self.update(|state| state.in_callback = true);
        if let Some(on_data) = self.data_handler() {
            self.zone.run_unary_guarded(|data| on_data(data), data);
        }
        self.update(|state| state.in_callback = false);
        self.check_state(was_input_paused);
    }

    fn send_error(&self, error: AsyncError) {
        let was_input_paused = self.state().input_paused;
        if !self.state().cancel_on_error {
            self.deliver_error(error);
            self.check_state(was_input_paused);
            return;
        }

        self.update(|state| state.wait_for_cancel = true);
        self.cancel_internal();
        let cancel_future = self.cancel_future.borrow().clone();
        match (cancel_future, self.this.upgrade()) {
            (Some(cancel_future), Some(this)) => {
                cancel_future.when_complete(move || this.deliver_error(error.clone()));
            }
            _ => self.deliver_error(error),
        }
    }

    fn deliver_error(&self, error: AsyncError) {
        let state = self.state();
        if state.is_canceled() && !state.wait_for_cancel {
            return;
        }
        let on_error = self
            .handlers
            .borrow()
            .as_ref()
            .map(|handlers| handlers.on_error.clone());
        self.update(|state| state.in_callback = true);
        if let Some(on_error) = on_error {
            if let Err(uncaught) = on_error.run_in(&self.zone, error) {
                self.zone.handle_uncaught_error(uncaught);
            }
        }
        self.update(|state| state.in_callback = false);
    }

    fn send_done(&self) {
        self.cancel_internal();
        self.update(|state| state.wait_for_cancel = true);
        let cancel_future = self.cancel_future.borrow().clone();
        match (cancel_future, self.this.upgrade()) {
            (Some(cancel_future), Some(this)) => {
                cancel_future.when_complete(move || this.deliver_done());
            }
            _ => self.deliver_done(),
        }
    }

    fn deliver_done(&self) {
        if !self.state().wait_for_cancel {
            return;
        }
        let on_done = self
            .handlers
            .borrow()
            .as_ref()
            .map(|handlers| handlers.on_done.clone());
        self.update(|state| {
            state.phase = Phase::Canceled;
            state.in_callback = true;
        });
        if let Some(on_done) = on_done {
            self.zone.run_guarded(|| on_done());
        }
        self.update(|state| state.in_callback = false);
        self.handlers.borrow_mut().take();
    }

    /// Runs a producer callback with re-entrant delivery deferred.
    pub(crate) fn guard_callback(&self, callback: impl FnOnce()) {
        let was_input_paused = self.state().input_paused;
        self.update(|state| state.in_callback = true);
        callback();
        self.update(|state| state.in_callback = false);
        self.check_state(was_input_paused);
    }

    /// Settles flags after a callback and tells the producer about any
    /// change in input pausing.
    fn check_state(&self, mut was_input_paused: bool) {
        let state = self.state();
        if state.has_pending && self.pending.borrow().is_empty() {
            self.update(|state| state.has_pending = false);
            if state.input_paused && self.may_resume_input() {
                self.update(|state| state.input_paused = false);
            }
        }
        loop {
            let state = self.state();
            if state.is_canceled() {
                self.pending.borrow_mut().clear();
                return;
            }
            let is_input_paused = state.input_paused;
            if was_input_paused == is_input_paused {
                break;
            }
            self.update(|state| state.in_callback = true);
            if let Some(hooks) = self.hooks() {
                if is_input_paused {
                    hooks.on_pause();
                } else {
                    hooks.on_resume();
                }
            }
            self.update(|state| state.in_callback = false);
            was_input_paused = is_input_paused;
        }
        let state = self.state();
        if state.has_pending && !state.is_paused() {
            self.schedule_pending();
        }
    }
}

/// A listener's handle on a stream.
///
/// Dropping the handle does not cancel the subscription; call
/// [`StreamSubscription::cancel`].
pub struct StreamSubscription<T> {
    core: Rc<SubscriptionCore<T>>,
}

impl<T> Clone for StreamSubscription<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> fmt::Debug for StreamSubscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.get();
        f.debug_struct("StreamSubscription")
            .field("phase", &state.phase)
            .field("pause_count", &state.pause_count)
            .finish()
    }
}

impl<T: Clone + 'static> StreamSubscription<T> {
    pub(crate) fn from_core(core: Rc<SubscriptionCore<T>>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Rc<SubscriptionCore<T>> {
        &self.core
    }

    /// Replaces the data handler.
    pub fn on_data(&self, handler: impl Fn(T) + 'static) {
        self.on_data_result(move |data| {
            handler(data);
            Ok(())
        });
    }

    /// Replaces the data handler with one that may fail; a failure is an
    /// uncaught error in the subscription's zone.
    pub fn on_data_result(&self, handler: impl Fn(T) -> Result<(), AsyncError> + 'static) {
        let handler = self.core.zone.register_unary_callback(handler);
        if let Some(handlers) = self.core.handlers.borrow_mut().as_mut() {
            handlers.on_data = handler;
        }
    }

    /// Replaces the error handler.
    pub fn on_error(&self, handler: OnError<Result<(), AsyncError>>) {
        let handler = handler.register_in(&self.core.zone);
        if let Some(handlers) = self.core.handlers.borrow_mut().as_mut() {
            handlers.on_error = handler;
        }
    }

    /// Replaces the done handler.
    pub fn on_done(&self, handler: impl Fn() + 'static) {
        let handler = self.core.zone.register_callback(move || {
            handler();
            Ok(())
        });
        if let Some(handlers) = self.core.handlers.borrow_mut().as_mut() {
            handlers.on_done = handler;
        }
    }

    /// Pauses delivery. Each call needs its own [`StreamSubscription::resume`].
    pub fn pause(&self) {
        self.core.pause();
    }

    /// Pauses until `signal` completes, either way.
    pub fn pause_until<S: Clone + 'static>(&self, signal: &Future<S>) {
        self.core.pause();
        let core = self.core.clone();
        signal.when_complete(move || core.resume()).ignore();
    }

    /// Undoes one pause. Resuming a subscription that is not paused does
    /// nothing.
    pub fn resume(&self) {
        self.core.resume();
    }

    /// Returns true while at least one pause is outstanding.
    pub fn is_paused(&self) -> bool {
        self.core.is_paused()
    }

    /// Stops delivery immediately. The returned future completes when the
    /// producer has finished cleaning up. Canceling twice is harmless.
    pub fn cancel(&self) -> Future<()> {
        match self.core.cancel() {
            Some(cleanup) => cleanup,
            None => Future::value(()),
        }
    }

    /// Replaces the done and error handlers with ones completing the
    /// returned future: with `value` on done, or with the first error
    /// (after canceling the subscription).
    pub fn as_future<V: Clone + 'static>(&self, value: V) -> Future<V> {
        let result = Future::<V>::pending();
        let on_done = result.clone();
        self.on_done(move || {
            if on_done.may_complete() {
                on_done.complete_now(Ok(value.clone()));
            }
        });
        let on_error = result.clone();
        let core = self.core.clone();
        self.on_error(OnError::unary(move |error: AsyncError| {
            let failed = on_error.clone();
            match core.cancel() {
                Some(cleanup) => {
                    cleanup.when_complete(move || failed.complete_now(Err(error.clone())));
                }
                None => failed.complete_now(Err(error)),
            }
            Ok(())
        }));
        result
    }

    /// Reports whether the subscription has been canceled or has finished.
    pub fn is_canceled(&self) -> bool {
        self.core.is_canceled()
    }
}

impl<T> fmt::Debug for SubscriptionCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCore")
            .field("phase", &self.state.get().phase)
            .field("zone", &self.zone)
            .finish()
    }
}
