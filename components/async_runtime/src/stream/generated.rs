//! Streams built from iterators, futures and timers.

use super::controller::ControllerInner;
use super::pending::PendingEvents;
use super::subscription::SubscriptionCore;
use super::{done_subscription, Stream, StreamController, StreamHandlers, StreamSource, StreamSubscription};
use crate::future::{Future, FutureOr};
use crate::scheduler;
use crate::timer::Timer;
use crate::zone::OnError;
use core_types::{AsyncError, RuntimeError};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

type EventIter<T> = Box<dyn Iterator<Item = Result<T, AsyncError>>>;

/// Replays a fresh iterator for every listener.
struct IterStream<T> {
    events: Rc<dyn Fn() -> EventIter<T>>,
}

impl<T: Clone + 'static> StreamSource<T> for IterStream<T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        let core = SubscriptionCore::new(handlers);
        core.set_pending_events(PendingEvents::from_iter((self.events)()));
        Ok(StreamSubscription::from_core(core))
    }
}

struct EmptyStream;

impl<T: Clone + 'static> StreamSource<T> for EmptyStream {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        Ok(done_subscription(handlers))
    }

    fn is_broadcast(&self) -> bool {
        true
    }
}

/// Elapsed time on the scheduler clock, excluding stopped intervals.
#[derive(Debug, Default)]
struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Duration>,
}

impl Stopwatch {
    fn elapsed(&self) -> Duration {
        let running = self
            .running_since
            .map_or(Duration::ZERO, |since| scheduler::now().saturating_sub(since));
        self.accumulated + running
    }

    fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(scheduler::now());
    }

    fn stop(&mut self) {
        self.accumulated = self.elapsed();
        self.running_since = None;
    }

    fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(scheduler::now());
        }
    }
}

struct PeriodicState<T> {
    this: Weak<PeriodicState<T>>,
    period: Duration,
    compute: Rc<dyn Fn(u64) -> T>,
    controller: Weak<ControllerInner<T>>,
    count: Cell<u64>,
    watch: RefCell<Stopwatch>,
    timer: RefCell<Option<Timer>>,
}

impl<T: Clone + 'static> PeriodicState<T> {
    fn send_event(&self) {
        self.watch.borrow_mut().restart();
        let Some(controller) = self.controller.upgrade().map(StreamController::from_inner) else {
            return;
        };
        let tick = self.count.get();
        self.count.set(tick + 1);
        if let Err(error) = controller.add((self.compute)(tick)) {
            log::warn!("periodic stream dropped tick {}: {}", tick, error);
        }
    }

    fn start_periodic(&self) {
        let state = self.this.clone();
        let timer = Timer::periodic(self.period, move |_| {
            if let Some(state) = state.upgrade() {
                state.send_event();
            }
            Ok(())
        });
        self.replace_timer(Some(timer));
    }

    fn replace_timer(&self, timer: Option<Timer>) {
        if let Some(previous) = std::mem::replace(&mut *self.timer.borrow_mut(), timer) {
            previous.cancel();
        }
    }

    fn listen(&self) {
        self.watch.borrow_mut().restart();
        self.start_periodic();
    }

    fn pause(&self) {
        self.watch.borrow_mut().stop();
        self.replace_timer(None);
    }

    /// Finishes the interrupted period before returning to the regular
    /// schedule.
    fn resume(&self) {
        let elapsed = {
            let mut watch = self.watch.borrow_mut();
            let elapsed = watch.elapsed();
            watch.start();
            elapsed
        };
        let state = self.this.clone();
        let timer = Timer::new(self.period.saturating_sub(elapsed), move || {
            if let Some(state) = state.upgrade() {
                state.start_periodic();
                state.send_event();
            }
            Ok(())
        });
        self.replace_timer(Some(timer));
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// A stream of the items of `iterable`, then done.
    ///
    /// Every listener gets its own pass over a clone of `iterable`, one
    /// item per microtask.
    pub fn from_iter<I>(iterable: I) -> Stream<T>
    where
        I: IntoIterator<Item = T> + Clone + 'static,
        I::IntoIter: 'static,
    {
        Stream::from_source(IterStream {
            events: Rc::new(move || Box::new(iterable.clone().into_iter().map(Ok)) as EventIter<T>),
        })
    }

    /// Like [`Stream::from_iter`], with `Err` items sent as error events.
    pub fn from_results<I>(iterable: I) -> Stream<T>
    where
        I: IntoIterator<Item = Result<T, AsyncError>> + Clone + 'static,
        I::IntoIter: 'static,
    {
        Stream::from_source(IterStream {
            events: Rc::new(move || Box::new(iterable.clone().into_iter()) as EventIter<T>),
        })
    }

    /// A single-subscription stream with the outcome of `future`, then
    /// done.
    pub fn from_future(future: Future<T>) -> Stream<T> {
        let controller = StreamController::sync();
        let (on_value, on_error) = (controller.clone(), controller.clone());
        future.then_with(
            move |value: T| {
                if let Err(error) = on_value.add(value).and_then(|_| on_value.close().map(|_| ())) {
                    log::warn!("future stream dropped its value: {}", error);
                }
                Ok(FutureOr::Value(()))
            },
            Some(OnError::unary(move |error: AsyncError| {
                if let Err(error) = on_error.add_error(error).and_then(|_| on_error.close().map(|_| ())) {
                    log::warn!("future stream dropped its error: {}", error);
                }
                Ok(FutureOr::Value(()))
            })),
        );
        controller.stream()
    }

    /// Emits `compute(n)` every `period`, for n = 0, 1, 2, ...
    ///
    /// Timing starts when the stream is listened to. A paused listener
    /// stops the timer; resuming completes the interrupted period first.
    pub fn periodic(period: Duration, compute: impl Fn(u64) -> T + 'static) -> Stream<T> {
        let controller = StreamController::sync();
        let state = Rc::new_cyclic(|this| PeriodicState {
            this: this.clone(),
            period,
            compute: Rc::new(compute),
            controller: controller.downgrade(),
            count: Cell::new(0),
            watch: RefCell::new(Stopwatch::default()),
            timer: RefCell::new(None),
        });
        let (on_listen, on_pause, on_resume, on_cancel) = (state.clone(), state.clone(), state.clone(), state);
        controller.set_on_listen(move || on_listen.listen());
        controller.set_on_pause(move || on_pause.pause());
        controller.set_on_resume(move || on_resume.resume());
        controller.set_on_cancel(move || on_cancel.replace_timer(None));
        controller.stream()
    }

    /// A broadcast stream that only sends done.
    pub fn empty() -> Stream<T> {
        Stream::from_source(EmptyStream)
    }
}
