//! Per-event timeouts on streams.

use super::broadcast::BroadcastInner;
use super::controller::ControllerInner;
use super::{BroadcastStreamController, EventSink, Stream, StreamController, StreamHandlers, StreamSubscription};
use crate::timer::Timer;
use crate::zone::{OnError, Zone};
use core_types::{AsyncError, RuntimeError, StackTrace};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

type TimeoutAction<T> = Rc<dyn Fn(Rc<dyn EventSink<T>>)>;

enum ControllerRef<T> {
    Single(Weak<ControllerInner<T>>),
    Broadcast(Weak<BroadcastInner<T>>),
}

impl<T: Clone + 'static> ControllerRef<T> {
    fn sink(&self) -> Option<Rc<dyn EventSink<T>>> {
        match self {
            ControllerRef::Single(inner) => inner
                .upgrade()
                .map(|inner| Rc::new(StreamController::from_inner(inner)) as Rc<dyn EventSink<T>>),
            ControllerRef::Broadcast(inner) => inner
                .upgrade()
                .map(|inner| Rc::new(BroadcastStreamController::from_inner(inner)) as Rc<dyn EventSink<T>>),
        }
    }
}

struct TimeoutState<T> {
    this: Weak<TimeoutState<T>>,
    zone: Zone,
    limit: Duration,
    controller: ControllerRef<T>,
    on_timeout: Option<TimeoutAction<T>>,
    timer: RefCell<Option<Timer>>,
    subscription: RefCell<Option<StreamSubscription<T>>>,
}

impl<T: Clone + 'static> TimeoutState<T> {
    fn start(&self, source: &Stream<T>) {
        self.restart_timer();
        let (on_data, on_error, on_done) = (self.this.clone(), self.this.clone(), self.this.clone());
        let listened = source.listen_with(
            StreamHandlers::new()
                .with_data(move |value: T| {
                    if let Some(state) = on_data.upgrade() {
                        state.restart_timer();
                        state.forward(|sink| sink.add(value));
                    }
                })
                .with_error(OnError::unary(move |error: AsyncError| {
                    if let Some(state) = on_error.upgrade() {
                        state.restart_timer();
                        state.forward(|sink| sink.add_error(error));
                    }
                    Ok(())
                }))
                .with_done(move || {
                    if let Some(state) = on_done.upgrade() {
                        state.cancel_timer();
                        state.forward(|sink| sink.close().map(|_| ()));
                    }
                }),
        );
        match listened {
            Ok(subscription) => *self.subscription.borrow_mut() = Some(subscription),
            Err(error) => {
                self.cancel_timer();
                self.forward(|sink| sink.add_error(AsyncError::new(error)));
            }
        }
    }

    fn forward(&self, event: impl FnOnce(&dyn EventSink<T>) -> Result<(), RuntimeError>) {
        if let Some(sink) = self.controller.sink() {
            if let Err(error) = event(&*sink) {
                log::warn!("timeout stream dropped an event: {}", error);
            }
        }
    }

    fn restart_timer(&self) {
        self.cancel_timer();
        let state = self.this.clone();
        let timer = self.zone.create_timer(self.limit, move || {
            if let Some(state) = state.upgrade() {
                state.expire();
            }
            Ok(())
        });
        *self.timer.borrow_mut() = Some(timer);
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.cancel();
        }
    }

    fn expire(&self) {
        log::debug!("no stream event within {:?}", self.limit);
        match &self.on_timeout {
            None => {
                let error = AsyncError::with_stack_trace(
                    RuntimeError::timeout("No stream event", self.limit),
                    StackTrace::empty(),
                );
                self.forward(|sink| sink.add_error(error));
            }
            Some(on_timeout) => {
                if let Some(sink) = self.controller.sink() {
                    self.zone.run_unary(|sink| on_timeout(sink), sink);
                }
            }
        }
    }

    fn pause(&self) {
        if let Some(subscription) = self.subscription.borrow().as_ref() {
            subscription.pause();
        }
        self.cancel_timer();
    }

    fn resume(&self) {
        if let Some(subscription) = self.subscription.borrow().as_ref() {
            subscription.resume();
        }
        self.restart_timer();
    }

    fn cancel(&self) -> Option<crate::future::Future<()>> {
        self.cancel_timer();
        let subscription = self.subscription.borrow_mut().take();
        subscription.map(|subscription| subscription.cancel())
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// Adds a `TimeoutException` error event whenever `limit` passes without
    /// an event from this stream.
    ///
    /// The window restarts after every data or error event. While the
    /// listener is paused no time is counted; resuming starts a fresh
    /// window.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_runtime::{ClockMode, EventLoop, RuntimeConfig, StreamController, StreamHandlers};
    /// use async_runtime::zone::OnError;
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use std::time::Duration;
    ///
    /// let mut event_loop = EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual));
    /// let silent = StreamController::<i32>::new();
    /// let errors = Rc::new(RefCell::new(Vec::new()));
    /// let sink = errors.clone();
    /// let subscription = silent
    ///     .stream()
    ///     .timeout(Duration::from_millis(50))
    ///     .listen_with(StreamHandlers::new().with_error(OnError::unary(move |e| {
    ///         sink.borrow_mut().push(e.to_string());
    ///         Ok(())
    ///     })))
    ///     .unwrap();
    ///
    /// event_loop.advance(Duration::from_millis(50)).unwrap();
    /// assert_eq!(errors.borrow().len(), 1);
    /// subscription.cancel();
    /// ```
    pub fn timeout(&self, limit: Duration) -> Stream<T> {
        self.timeout_stream(limit, None)
    }

    /// Like [`Stream::timeout`], but calls `on_timeout` with the output sink
    /// instead of adding an error. `on_timeout` runs in the current zone.
    pub fn timeout_with(&self, limit: Duration, on_timeout: impl Fn(&dyn EventSink<T>) + 'static) -> Stream<T> {
        let zone = Zone::current();
        let on_timeout: TimeoutAction<T> =
            zone.register_unary_callback(move |sink: Rc<dyn EventSink<T>>| on_timeout(&*sink));
        self.timeout_stream(limit, Some(on_timeout))
    }

    fn timeout_stream(&self, limit: Duration, on_timeout: Option<TimeoutAction<T>>) -> Stream<T> {
        let zone = Zone::current();
        let source = self.clone();
        if self.is_broadcast() {
            let controller = BroadcastStreamController::sync();
            let state = timeout_state(zone, limit, ControllerRef::Broadcast(controller.downgrade()), on_timeout);
            let (listen_state, cancel_state) = (state.clone(), state);
            controller.set_on_listen(move || listen_state.start(&source));
            controller.set_on_cancel(move || {
                if let Some(done) = cancel_state.cancel() {
                    done.ignore();
                }
            });
            controller.stream()
        } else {
            let controller = StreamController::sync();
            let state = timeout_state(zone, limit, ControllerRef::Single(controller.downgrade()), on_timeout);
            let (listen_state, pause_state, resume_state) = (state.clone(), state.clone(), state.clone());
            controller.set_on_listen(move || listen_state.start(&source));
            controller.set_on_pause(move || pause_state.pause());
            controller.set_on_resume(move || resume_state.resume());
            controller.set_on_cancel_async(move || state.cancel());
            controller.stream()
        }
    }
}

fn timeout_state<T>(
    zone: Zone,
    limit: Duration,
    controller: ControllerRef<T>,
    on_timeout: Option<TimeoutAction<T>>,
) -> Rc<TimeoutState<T>> {
    Rc::new_cyclic(|this| TimeoutState {
        this: this.clone(),
        zone,
        limit,
        controller,
        on_timeout,
        timer: RefCell::new(None),
        subscription: RefCell::new(None),
    })
}
