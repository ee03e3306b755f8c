//! Single-subscription stream controllers.

use super::add_stream::{AddStreamState, AddStreamTarget};
use super::pending::{PendingEvents, StreamEvent};
use super::subscription::{SubscriptionCore, SubscriptionHooks};
use super::{EventSink, Stream, StreamHandlers, StreamSource, StreamSubscription};
use crate::future::{Future, FutureOr};
use crate::zone::Zone;
use core_types::{AsyncError, RuntimeError};
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

type Hook = Rc<dyn Fn()>;
type CancelHook = Rc<dyn Fn() -> Option<Future<()>>>;

enum Target<T> {
    /// No listener yet; events are buffered.
    Initial(PendingEvents<T>),
    Subscribed(Rc<SubscriptionCore<T>>),
    Canceled,
}

struct ControllerState<T> {
    target: Target<T>,
    closed: bool,
    add_stream: Option<Rc<AddStreamState<T>>>,
}

#[derive(Default)]
struct ControllerHooks {
    on_listen: Option<Hook>,
    on_pause: Option<Hook>,
    on_resume: Option<Hook>,
    on_cancel: Option<CancelHook>,
}

pub(crate) struct ControllerInner<T> {
    sync: bool,
    state: RefCell<ControllerState<T>>,
    hooks: RefCell<ControllerHooks>,
    done: RefCell<Option<Future<()>>>,
}

/// The producer side of a single-subscription [`Stream`].
///
/// Events added before anyone listens are buffered, close included, and
/// delivered to the first listener. An asynchronous controller (the
/// default) delivers every event in a later microtask; a synchronous one
/// delivers during `add` whenever the subscription can fire.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, StreamController};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let mut event_loop = EventLoop::new();
/// let controller = StreamController::new();
/// controller.add("buffered").unwrap();
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// controller.stream().listen(move |s| sink.borrow_mut().push(s)).unwrap();
/// assert!(controller.stream().listen(|_| {}).is_err());
///
/// event_loop.run_until_done().unwrap();
/// assert_eq!(*seen.borrow(), vec!["buffered"]);
/// ```
pub struct StreamController<T> {
    inner: Rc<ControllerInner<T>>,
}

impl<T> Clone for StreamController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for StreamController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        let target = match state.target {
            Target::Initial(_) => "initial",
            Target::Subscribed(_) => "subscribed",
            Target::Canceled => "canceled",
        };
        f.debug_struct("StreamController")
            .field("sync", &self.inner.sync)
            .field("target", &target)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: Clone + 'static> StreamController<T> {
    /// A controller that delivers events asynchronously.
    pub fn new() -> Self {
        Self::with_sync(false)
    }

    /// A controller that delivers events synchronously when it can.
    pub fn sync() -> Self {
        Self::with_sync(true)
    }

    fn with_sync(sync: bool) -> Self {
        Self {
            inner: Rc::new(ControllerInner {
                sync,
                state: RefCell::new(ControllerState {
                    target: Target::Initial(PendingEvents::new()),
                    closed: false,
                    add_stream: None,
                }),
                hooks: RefCell::new(ControllerHooks::default()),
                done: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ControllerInner<T>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ControllerInner<T>>) -> Self {
        Self { inner }
    }

    /// The controlled stream. Every call returns a handle to the same
    /// stream.
    pub fn stream(&self) -> Stream<T> {
        Stream::from_source(ControllerStream {
            controller: self.inner.clone(),
        })
    }

    /// Called when the stream gets its listener.
    pub fn set_on_listen(&self, hook: impl Fn() + 'static) {
        self.inner.hooks.borrow_mut().on_listen = Some(Rc::new(hook));
    }

    /// Called when the listener pauses.
    pub fn set_on_pause(&self, hook: impl Fn() + 'static) {
        self.inner.hooks.borrow_mut().on_pause = Some(Rc::new(hook));
    }

    /// Called when the listener resumes.
    pub fn set_on_resume(&self, hook: impl Fn() + 'static) {
        self.inner.hooks.borrow_mut().on_resume = Some(Rc::new(hook));
    }

    /// Called when the listener cancels or the stream finishes.
    pub fn set_on_cancel(&self, hook: impl Fn() + 'static) {
        self.set_on_cancel_async(move || {
            hook();
            None
        });
    }

    /// Like [`StreamController::set_on_cancel`]; a returned future is what
    /// the listener's `cancel` waits for.
    pub fn set_on_cancel_async(&self, hook: impl Fn() -> Option<Future<()>> + 'static) {
        self.inner.hooks.borrow_mut().on_cancel = Some(Rc::new(hook));
    }

    /// Returns true while a listener is subscribed.
    pub fn has_listener(&self) -> bool {
        matches!(self.inner.state.borrow().target, Target::Subscribed(_))
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }

    /// Returns true if the listener wants no events right now. Before a
    /// listener arrives the controller counts as paused.
    pub fn is_paused(&self) -> bool {
        match &self.inner.state.borrow().target {
            Target::Initial(_) => true,
            Target::Subscribed(core) => core.is_input_paused(),
            Target::Canceled => false,
        }
    }

    /// Completes when the stream is done: after close once the listener has
    /// received done, or when the listener cancels.
    pub fn done(&self) -> Future<()> {
        self.inner.done_future()
    }

    /// Sends a data event.
    pub fn add(&self, value: T) -> Result<(), RuntimeError> {
        self.inner.check_may_add()?;
        self.inner.add_unchecked(value);
        Ok(())
    }

    /// Sends an error event. The current zone may replace the error.
    pub fn add_error(&self, error: AsyncError) -> Result<(), RuntimeError> {
        self.inner.check_may_add()?;
        let error = Zone::current().replace_error(error);
        self.inner.add_error_unchecked(error);
        Ok(())
    }

    /// Sends done. Closing twice is allowed and returns the same future.
    pub fn close(&self) -> Result<Future<()>, RuntimeError> {
        if self.is_closed() {
            return Ok(self.done());
        }
        self.inner.check_may_add()?;
        self.inner.close_unchecked();
        Ok(self.done())
    }

    /// Forwards all events of `source` until it is done (or, with
    /// `cancel_on_error`, until its first error). Direct `add`, `add_error`
    /// and `close` calls fail meanwhile. The returned future completes when
    /// forwarding ends.
    pub fn add_stream(&self, source: &Stream<T>, cancel_on_error: bool) -> Result<Future<()>, RuntimeError> {
        self.inner.check_may_add()?;
        if matches!(self.inner.state.borrow().target, Target::Canceled) {
            return Ok(Future::value(()));
        }
        let target: Rc<dyn AddStreamTarget<T>> = self.inner.clone();
        let add_stream = Rc::new(AddStreamState::start(target, source, cancel_on_error)?);
        if self.is_paused() {
            add_stream.pause();
        }
        let future = add_stream.future();
        self.inner.state.borrow_mut().add_stream = Some(add_stream);
        Ok(future)
    }
}

impl<T: Clone + 'static> Default for StreamController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> EventSink<T> for StreamController<T> {
    fn add(&self, value: T) -> Result<(), RuntimeError> {
        StreamController::add(self, value)
    }

    fn add_error(&self, error: AsyncError) -> Result<(), RuntimeError> {
        StreamController::add_error(self, error)
    }

    fn close(&self) -> Result<Future<()>, RuntimeError> {
        StreamController::close(self)
    }
}

impl<T: Clone + 'static> ControllerInner<T> {
    fn check_may_add(&self) -> Result<(), RuntimeError> {
        let state = self.state.borrow();
        if state.closed {
            Err(RuntimeError::state("Cannot add event after closing"))
        } else if state.add_stream.is_some() {
            Err(RuntimeError::state("Cannot add event while adding a stream"))
        } else {
            Ok(())
        }
    }

    fn done_future(&self) -> Future<()> {
        let mut done = self.done.borrow_mut();
        if let Some(future) = done.as_ref() {
            return future.clone();
        }
        let canceled = matches!(self.state.borrow().target, Target::Canceled);
        let future = if canceled {
            Future::value(())
        } else {
            Future::pending()
        };
        *done = Some(future.clone());
        future
    }

    /// The subscription to deliver to, or `None` after buffering or
    /// dropping the event.
    fn route(&self, event: StreamEvent<T>) -> Option<(Rc<SubscriptionCore<T>>, StreamEvent<T>)> {
        let mut state = self.state.borrow_mut();
        match &mut state.target {
            Target::Initial(pending) => {
                pending.push(event);
                None
            }
            Target::Subscribed(core) => Some((core.clone(), event)),
            Target::Canceled => {
                log::warn!("dropping {:?} added to a canceled stream controller", event);
                None
            }
        }
    }

    fn deliver(&self, event: StreamEvent<T>) {
        let Some((core, event)) = self.route(event) else {
            return;
        };
        if !self.sync {
            core.add_pending(event);
            return;
        }
        match event {
            StreamEvent::Data(value) => core.add(value),
            StreamEvent::Error(error) => core.add_error(error),
            StreamEvent::Done => core.close(),
        }
    }

    fn close_unchecked(&self) {
        self.state.borrow_mut().closed = true;
        self.deliver(StreamEvent::Done);
    }

    fn subscribe(self: &Rc<Self>, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        let pending = {
            let mut state = self.state.borrow_mut();
            match &mut state.target {
                Target::Initial(pending) => mem::take(pending),
                _ => return Err(RuntimeError::state("Stream has already been listened to.")),
            }
        };

        let core = SubscriptionCore::new(handlers);
        core.set_hooks(Rc::new(ControllerSubscriptionHooks {
            controller: self.clone(),
        }));
        let add_stream = {
            let mut state = self.state.borrow_mut();
            state.target = Target::Subscribed(core.clone());
            state.add_stream.clone()
        };
        if let Some(add_stream) = add_stream {
            add_stream.resume();
        }
        core.set_pending_events(pending);

        let on_listen = self.hooks.borrow().on_listen.clone();
        core.guard_callback(|| {
            if let Some(on_listen) = on_listen {
                on_listen();
            }
        });
        log::debug!("stream controller subscribed");
        Ok(StreamSubscription::from_core(core))
    }

    fn record_pause(&self) {
        let add_stream = self.state.borrow().add_stream.clone();
        if let Some(add_stream) = add_stream {
            add_stream.pause();
        }
        let on_pause = self.hooks.borrow().on_pause.clone();
        if let Some(on_pause) = on_pause {
            on_pause();
        }
    }

    fn record_resume(&self) {
        let add_stream = self.state.borrow().add_stream.clone();
        if let Some(add_stream) = add_stream {
            add_stream.resume();
        }
        let on_resume = self.hooks.borrow().on_resume.clone();
        if let Some(on_resume) = on_resume {
            on_resume();
        }
    }

    fn record_cancel(&self) -> Option<Future<()>> {
        let add_stream = {
            let mut state = self.state.borrow_mut();
            state.target = Target::Canceled;
            state.add_stream.take()
        };
        let mut result = add_stream.and_then(|add_stream| add_stream.cancel());

        let on_cancel = self.hooks.borrow().on_cancel.clone();
        if let Some(on_cancel) = on_cancel {
            result = match result {
                None => on_cancel(),
                Some(cleanup) => Some(cleanup.when_complete_with(move || {
                    Ok(match on_cancel() {
                        Some(future) => FutureOr::Future(future),
                        None => FutureOr::Value(()),
                    })
                })),
            };
        }

        let done = self.done.borrow().clone();
        let complete_done = move || {
            if let Some(done) = &done {
                if done.may_complete() {
                    done.complete_async(Ok(()));
                }
            }
        };
        match result {
            Some(cleanup) => Some(cleanup.when_complete(complete_done)),
            None => {
                complete_done();
                None
            }
        }
    }
}

impl<T: Clone + 'static> AddStreamTarget<T> for ControllerInner<T> {
    fn add_unchecked(&self, value: T) {
        self.deliver(StreamEvent::Data(value));
    }

    fn add_error_unchecked(&self, error: AsyncError) {
        self.deliver(StreamEvent::Error(error));
    }

    fn finish_add_stream(&self) {
        let add_stream = self.state.borrow_mut().add_stream.take();
        if let Some(add_stream) = add_stream {
            add_stream.complete();
        }
    }
}

struct ControllerSubscriptionHooks<T> {
    controller: Rc<ControllerInner<T>>,
}

impl<T: Clone + 'static> SubscriptionHooks for ControllerSubscriptionHooks<T> {
    fn on_pause(&self) {
        self.controller.record_pause();
    }

    fn on_resume(&self) {
        self.controller.record_resume();
    }

    fn on_cancel(&self) -> Option<Future<()>> {
        self.controller.record_cancel()
    }
}

struct ControllerStream<T> {
    controller: Rc<ControllerInner<T>>,
}

impl<T: Clone + 'static> StreamSource<T> for ControllerStream<T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        self.controller.subscribe(handlers)
    }
}
