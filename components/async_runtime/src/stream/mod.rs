//! Streams: push-based sequences of data and error events ending in done.
//!
//! A [`Stream`] does nothing until it is listened to. Listening returns a
//! [`StreamSubscription`] through which the listener pauses, resumes or
//! cancels delivery. Single-subscription streams accept one listener;
//! broadcast streams accept any number and never replay past events.
//!
//! Producers push events through a [`StreamController`] or a
//! [`BroadcastStreamController`].
//!
//! # Examples
//!
//! ```
//! use async_runtime::{EventLoop, StreamController};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut event_loop = EventLoop::new();
//! let controller = StreamController::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//!
//! controller
//!     .stream()
//!     .map(|x: i32| x * 10)
//!     .listen(move |x| sink.borrow_mut().push(x))
//!     .unwrap();
//! controller.add(1).unwrap();
//! controller.add(2).unwrap();
//! controller.close().unwrap();
//!
//! event_loop.run_until_done().unwrap();
//! assert_eq!(*seen.borrow(), vec![10, 20]);
//! ```

mod add_stream;
mod broadcast;
mod consumers;
mod controller;
mod forwarding;
mod generated;
mod pending;
mod subscription;
mod timeout;

pub use broadcast::BroadcastStreamController;
pub use controller::StreamController;
pub use subscription::StreamSubscription;

use crate::future::Future;
use crate::zone::OnError;
use core_types::{AsyncError, RuntimeError};
use pending::StreamEvent;
use std::fmt;
use std::rc::Rc;
use subscription::SubscriptionCore;

/// Something a [`Stream`] can be listened to through.
pub(crate) trait StreamSource<T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError>;

    fn is_broadcast(&self) -> bool {
        false
    }
}

/// The receiving side of a producer: where `add`, `add_error` and `close`
/// go.
pub trait EventSink<T> {
    /// Sends a data event.
    fn add(&self, value: T) -> Result<(), RuntimeError>;

    /// Sends an error event.
    fn add_error(&self, error: AsyncError) -> Result<(), RuntimeError>;

    /// Sends done. The returned future completes once the stream is
    /// finished with.
    fn close(&self) -> Result<Future<()>, RuntimeError>;
}

/// The callbacks a listener passes to [`Stream::listen_with`].
///
/// Missing handlers default to ignoring data and done, and to reporting
/// errors as uncaught in the listener's zone.
pub struct StreamHandlers<T> {
    on_data: Option<Rc<dyn Fn(T) -> Result<(), AsyncError>>>,
    on_error: Option<OnError<Result<(), AsyncError>>>,
    on_done: Option<Rc<dyn Fn() -> Result<(), AsyncError>>>,
    cancel_on_error: bool,
}

impl<T> StreamHandlers<T> {
    /// No handlers.
    pub fn new() -> Self {
        Self {
            on_data: None,
            on_error: None,
            on_done: None,
            cancel_on_error: false,
        }
    }

    /// Handles data events.
    pub fn with_data(self, on_data: impl Fn(T) + 'static) -> Self {
        self.with_data_result(move |data| {
            on_data(data);
            Ok(())
        })
    }

    /// Handles data events with a handler that may fail. A failure is an
    /// uncaught error in the listener's zone.
    pub fn with_data_result(mut self, on_data: impl Fn(T) -> Result<(), AsyncError> + 'static) -> Self {
        self.on_data = Some(Rc::new(on_data));
        self
    }

    /// Handles error events.
    pub fn with_error(mut self, on_error: OnError<Result<(), AsyncError>>) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Handles the done event.
    pub fn with_done(mut self, on_done: impl Fn() + 'static) -> Self {
        self.on_done = Some(Rc::new(move || {
            on_done();
            Ok(())
        }));
        self
    }

    /// Cancels the subscription at the first error event.
    pub fn with_cancel_on_error(mut self, cancel_on_error: bool) -> Self {
        self.cancel_on_error = cancel_on_error;
        self
    }
}

impl<T> Default for StreamHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for StreamHandlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error)
            .field("on_done", &self.on_done.is_some())
            .field("cancel_on_error", &self.cancel_on_error)
            .finish()
    }
}

/// A source of asynchronous events.
pub struct Stream<T> {
    source: Rc<dyn StreamSource<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("broadcast", &self.source.is_broadcast())
            .finish()
    }
}

impl<T: Clone + 'static> Stream<T> {
    pub(crate) fn from_source(source: impl StreamSource<T> + 'static) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    /// Listens with only a data handler.
    ///
    /// Fails with a `StateError` if this is a single-subscription stream
    /// that already has a listener.
    pub fn listen(&self, on_data: impl Fn(T) + 'static) -> Result<StreamSubscription<T>, RuntimeError> {
        self.listen_with(StreamHandlers::new().with_data(on_data))
    }

    /// Listens with the given handlers.
    pub fn listen_with(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        self.source.listen(handlers)
    }

    /// Returns true if the stream accepts more than one listener.
    pub fn is_broadcast(&self) -> bool {
        self.source.is_broadcast()
    }
}

/// A subscription that only delivers done, in a later microtask.
pub(crate) fn done_subscription<T: Clone + 'static>(handlers: StreamHandlers<T>) -> StreamSubscription<T> {
    let core = SubscriptionCore::new(handlers);
    core.add_pending(StreamEvent::Done);
    StreamSubscription::from_core(core)
}
