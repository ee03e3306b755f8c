//! Transformations that forward a source stream's events.
//!
//! Each listen on a transformed stream listens to the source once and
//! routes the source's events through a fresh [`Transform`] into the
//! listener's own subscription. Pausing, resuming and canceling the
//! listener's subscription does the same to the source subscription.
//!
//! The source subscription never cancels on error. `cancel_on_error`
//! applies to the listener's subscription only, after the transform has
//! seen the error, so a transform that swallows errors keeps the source
//! alive.

use super::subscription::{SubscriptionCore, SubscriptionHooks};
use super::{done_subscription, Stream, StreamHandlers, StreamSource, StreamSubscription};
use crate::future::Future;
use crate::zone::{OnError, Zone};
use core_types::{AsyncError, RuntimeError};
use std::cell::RefCell;
use std::rc::Rc;

/// Per-subscription event handling between a source and a listener.
pub(crate) trait Transform<S, T: Clone + 'static> {
    fn handle_data(&mut self, value: S, sink: &SubscriptionCore<T>);

    fn handle_error(&mut self, error: AsyncError, sink: &SubscriptionCore<T>) {
        sink.add_error(error);
    }

    fn handle_done(&mut self, sink: &SubscriptionCore<T>) {
        sink.close();
    }
}

type TransformFactory<S, T> = Rc<dyn Fn() -> Box<dyn Transform<S, T>>>;

struct ForwardingStream<S, T: Clone + 'static> {
    source: Stream<S>,
    transform: TransformFactory<S, T>,
}

impl<S: Clone + 'static, T: Clone + 'static> StreamSource<T> for ForwardingStream<S, T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        let downstream = SubscriptionCore::new(handlers);
        let transform = Rc::new(RefCell::new((self.transform)()));

        let (data_sink, data_transform) = (downstream.clone(), transform.clone());
        let (error_sink, error_transform) = (downstream.clone(), transform.clone());
        let done_sink = downstream.clone();
        let upstream = self.source.listen_with(
            StreamHandlers::new()
                .with_data(move |value: S| data_transform.borrow_mut().handle_data(value, &data_sink))
                .with_error(OnError::unary(move |error: AsyncError| {
                    error_transform.borrow_mut().handle_error(error, &error_sink);
                    Ok(())
                }))
                .with_done(move || transform.borrow_mut().handle_done(&done_sink)),
        )?;

        downstream.set_hooks(Rc::new(ForwardingHooks {
            upstream: upstream.core().clone(),
        }));
        Ok(StreamSubscription::from_core(downstream))
    }

    fn is_broadcast(&self) -> bool {
        self.source.is_broadcast()
    }
}

struct ForwardingHooks<S> {
    upstream: Rc<SubscriptionCore<S>>,
}

impl<S: Clone + 'static> SubscriptionHooks for ForwardingHooks<S> {
    fn on_pause(&self) {
        self.upstream.pause();
    }

    fn on_resume(&self) {
        self.upstream.resume();
    }

    fn on_cancel(&self) -> Option<Future<()>> {
        self.upstream.cancel()
    }
}

fn add_failure<T: Clone + 'static>(sink: &SubscriptionCore<T>, error: AsyncError) {
    sink.add_error(Zone::current().replace_error(error));
}

struct Map<S, T>(Rc<dyn Fn(S) -> Result<T, AsyncError>>);

impl<S, T: Clone + 'static> Transform<S, T> for Map<S, T> {
    fn handle_data(&mut self, value: S, sink: &SubscriptionCore<T>) {
        match (self.0)(value) {
            Ok(mapped) => sink.add(mapped),
            Err(error) => add_failure(sink, error),
        }
    }
}

struct Filter<T>(Rc<dyn Fn(&T) -> bool>);

impl<T: Clone + 'static> Transform<T, T> for Filter<T> {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if (self.0)(&value) {
            sink.add(value);
        }
    }
}

struct Expand<S, T>(Rc<dyn Fn(S) -> Vec<T>>);

impl<S, T: Clone + 'static> Transform<S, T> for Expand<S, T> {
    fn handle_data(&mut self, value: S, sink: &SubscriptionCore<T>) {
        for item in (self.0)(value) {
            sink.add(item);
        }
    }
}

struct HandleError<T> {
    test: Option<Rc<dyn Fn(&AsyncError) -> bool>>,
    handler: Rc<dyn Fn(AsyncError) -> Result<(), AsyncError>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + 'static> Transform<T, T> for HandleError<T> {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        sink.add(value);
    }

    fn handle_error(&mut self, error: AsyncError, sink: &SubscriptionCore<T>) {
        let matches = self.test.as_ref().map_or(true, |test| test(&error));
        if !matches {
            sink.add_error(error);
            return;
        }
        if let Err(replacement) = (self.handler)(error.clone()) {
            if replacement.is_same(&error) {
                sink.add_error(error);
            } else {
                add_failure(sink, replacement);
            }
        }
    }
}

struct Take {
    remaining: usize,
}

impl<T: Clone + 'static> Transform<T, T> for Take {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        sink.add(value);
        if self.remaining == 0 {
            sink.close();
        }
    }
}

struct Skip {
    remaining: usize,
}

impl<T: Clone + 'static> Transform<T, T> for Skip {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if self.remaining > 0 {
            self.remaining -= 1;
        } else {
            sink.add(value);
        }
    }
}

struct TakeWhile<T>(Rc<dyn Fn(&T) -> bool>);

impl<T: Clone + 'static> Transform<T, T> for TakeWhile<T> {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if (self.0)(&value) {
            sink.add(value);
        } else {
            sink.close();
        }
    }
}

struct SkipWhile<T> {
    test: Rc<dyn Fn(&T) -> bool>,
    skipping: bool,
}

impl<T: Clone + 'static> Transform<T, T> for SkipWhile<T> {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if self.skipping && (self.test)(&value) {
            return;
        }
        self.skipping = false;
        sink.add(value);
    }
}

struct Distinct<T> {
    previous: Option<T>,
}

impl<T: Clone + PartialEq + 'static> Transform<T, T> for Distinct<T> {
    fn handle_data(&mut self, value: T, sink: &SubscriptionCore<T>) {
        if self.previous.as_ref() == Some(&value) {
            return;
        }
        self.previous = Some(value.clone());
        sink.add(value);
    }
}

struct TakeNone<T> {
    source: Stream<T>,
}

impl<T: Clone + 'static> StreamSource<T> for TakeNone<T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        self.source.listen_with(StreamHandlers::new())?.cancel().ignore();
        Ok(done_subscription(handlers))
    }

    fn is_broadcast(&self) -> bool {
        self.source.is_broadcast()
    }
}

impl<T: Clone + 'static> Stream<T> {
    fn forward<U: Clone + 'static>(&self, transform: impl Fn() -> Box<dyn Transform<T, U>> + 'static) -> Stream<U> {
        Stream::from_source(ForwardingStream {
            source: self.clone(),
            transform: Rc::new(transform),
        })
    }

    /// Converts each data event with `convert`.
    pub fn map<U: Clone + 'static>(&self, convert: impl Fn(T) -> U + 'static) -> Stream<U> {
        self.try_map(move |value| Ok(convert(value)))
    }

    /// Converts each data event; a failed conversion becomes an error event.
    pub fn try_map<U: Clone + 'static>(
        &self,
        convert: impl Fn(T) -> Result<U, AsyncError> + 'static,
    ) -> Stream<U> {
        let convert: Rc<dyn Fn(T) -> Result<U, AsyncError>> = Rc::new(convert);
        self.forward(move || Box::new(Map(convert.clone())))
    }

    /// Keeps the data events `test` accepts.
    pub fn filter(&self, test: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let test: Rc<dyn Fn(&T) -> bool> = Rc::new(test);
        self.forward(move || Box::new(Filter(test.clone())))
    }

    /// Replaces each data event with the items `convert` returns, in order.
    pub fn expand<U, I>(&self, convert: impl Fn(T) -> I + 'static) -> Stream<U>
    where
        U: Clone + 'static,
        I: IntoIterator<Item = U>,
    {
        let convert: Rc<dyn Fn(T) -> Vec<U>> = Rc::new(move |value| convert(value).into_iter().collect());
        self.forward(move || Box::new(Expand(convert.clone())))
    }

    /// Intercepts error events. `handler` returning `Ok` swallows the
    /// error; returning an error sends that error on instead.
    pub fn handle_error(&self, handler: impl Fn(AsyncError) -> Result<(), AsyncError> + 'static) -> Stream<T> {
        self.handle_error_with(handler, None::<fn(&AsyncError) -> bool>)
    }

    /// Like [`Stream::handle_error`], limited to errors `test` accepts.
    pub fn handle_error_where(
        &self,
        test: impl Fn(&AsyncError) -> bool + 'static,
        handler: impl Fn(AsyncError) -> Result<(), AsyncError> + 'static,
    ) -> Stream<T> {
        self.handle_error_with(handler, Some(test))
    }

    fn handle_error_with<P>(
        &self,
        handler: impl Fn(AsyncError) -> Result<(), AsyncError> + 'static,
        test: Option<P>,
    ) -> Stream<T>
    where
        P: Fn(&AsyncError) -> bool + 'static,
    {
        let handler: Rc<dyn Fn(AsyncError) -> Result<(), AsyncError>> = Rc::new(handler);
        let test = test.map(|test| Rc::new(test) as Rc<dyn Fn(&AsyncError) -> bool>);
        self.forward(move || {
            Box::new(HandleError {
                test: test.clone(),
                handler: handler.clone(),
                _marker: std::marker::PhantomData,
            })
        })
    }

    /// The first `count` data events, then done.
    ///
    /// With a count of zero the source is listened to and canceled at once.
    pub fn take(&self, count: usize) -> Stream<T> {
        if count == 0 {
            return Stream::from_source(TakeNone { source: self.clone() });
        }
        self.forward(move || Box::new(Take { remaining: count }))
    }

    /// All but the first `count` data events.
    pub fn skip(&self, count: usize) -> Stream<T> {
        self.forward(move || Box::new(Skip { remaining: count }))
    }

    /// Data events up to the first one `test` rejects; that one ends the
    /// stream.
    pub fn take_while(&self, test: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let test: Rc<dyn Fn(&T) -> bool> = Rc::new(test);
        self.forward(move || Box::new(TakeWhile(test.clone())))
    }

    /// Drops data events while `test` accepts them, then passes the rest.
    pub fn skip_while(&self, test: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let test: Rc<dyn Fn(&T) -> bool> = Rc::new(test);
        self.forward(move || {
            Box::new(SkipWhile {
                test: test.clone(),
                skipping: true,
            })
        })
    }

    /// Drops data events equal to the previous one.
    pub fn distinct(&self) -> Stream<T>
    where
        T: PartialEq,
    {
        self.forward(|| Box::new(Distinct { previous: None }))
    }
}
