//! Listener records attached to pending futures.

use super::propagate::Propagation;
use super::{Future, FutureOr};
use crate::zone::{OnError, Zone};
use core_types::AsyncError;
use std::rc::Rc;

/// What a continuation handler produces.
pub(crate) type Handled<U> = Result<FutureOr<U>, AsyncError>;

/// Something waiting for a future's outcome.
pub(crate) trait Listener<T> {
    /// Delivers the outcome of a future owned by `source_zone`.
    fn deliver(
        self: Box<Self>,
        outcome: Result<T, AsyncError>,
        source_zone: &Zone,
        work: &mut Propagation,
    );
}

/// The continuation a listener record runs.
///
/// `forward` carries a value through unchanged for the kinds whose result
/// type equals the source type.
pub(crate) enum ListenerKind<T, U> {
    Then {
        on_value: Rc<dyn Fn(T) -> Handled<U>>,
        on_error: Option<OnError<Handled<U>>>,
    },
    CatchError {
        on_error: OnError<Handled<U>>,
        test: Option<Rc<dyn Fn(AsyncError) -> bool>>,
        forward: fn(T) -> U,
    },
    WhenComplete {
        action: Rc<dyn Fn() -> Handled<()>>,
        forward: fn(T) -> U,
    },
}

impl<T, U> ListenerKind<T, U> {
    fn handles_value(&self) -> bool {
        matches!(self, ListenerKind::Then { .. })
    }

    fn handles_error(&self) -> bool {
        matches!(
            self,
            ListenerKind::Then {
                on_error: Some(_),
                ..
            } | ListenerKind::CatchError { .. }
        )
    }

    fn handles_complete(&self) -> bool {
        matches!(self, ListenerKind::WhenComplete { .. })
    }
}

/// A user continuation: the handler, the future it completes, and the zone
/// it was registered in.
pub(crate) struct ListenerRecord<T, U> {
    pub(crate) kind: ListenerKind<T, U>,
    pub(crate) result: Future<U>,
    pub(crate) zone: Zone,
}

impl<T, U> Listener<T> for ListenerRecord<T, U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    fn deliver(
        self: Box<Self>,
        outcome: Result<T, AsyncError>,
        source_zone: &Zone,
        work: &mut Propagation,
    ) {
        let ListenerRecord { kind, result, zone } = *self;

        if let Err(error) = &outcome {
            if !source_zone.in_same_error_zone(&zone) {
                // Errors never cross error zone boundaries.
                source_zone.handle_uncaught_error(error.clone());
                return;
            }
        }

        if kind.handles_complete() {
            if let ListenerKind::WhenComplete { action, forward } = kind {
                run_when_complete(&zone, action, forward, outcome, result, work);
            }
            return;
        }

        match outcome {
            Ok(value) if kind.handles_value() => {
                if let ListenerKind::Then { on_value, .. } = kind {
                    let produced = zone.run_unary(|value| on_value(value), value);
                    result.resolve(produced, work);
                }
            }
            Ok(value) => match kind {
                ListenerKind::CatchError { forward, .. }
                | ListenerKind::WhenComplete { forward, .. } => result.settle(Ok(forward(value)), work),
                ListenerKind::Then { .. } => {}
            },
            Err(error) if kind.handles_error() => match kind {
                ListenerKind::Then {
                    on_error: Some(on_error),
                    ..
                } => {
                    let produced = on_error.run_in(&zone, error);
                    result.resolve(produced, work);
                }
                ListenerKind::CatchError { on_error, test, .. } => {
                    let matches = match &test {
                        Some(test) => zone.run_unary(|error| test(error), error.clone()),
                        None => true,
                    };
                    if matches {
                        let produced = on_error.run_in(&zone, error);
                        result.resolve(produced, work);
                    } else {
                        result.settle(Err(error), work);
                    }
                }
                _ => result.settle(Err(error), work),
            },
            Err(error) => result.settle(Err(error), work),
        }
    }
}

fn run_when_complete<T, U>(
    zone: &Zone,
    action: Rc<dyn Fn() -> Handled<()>>,
    forward: fn(T) -> U,
    outcome: Result<T, AsyncError>,
    result: Future<U>,
    work: &mut Propagation,
) where
    T: Clone + 'static,
    U: Clone + 'static,
{
    match zone.run(|| action()) {
        Err(error) => result.settle(Err(error), work),
        Ok(FutureOr::Value(())) => result.settle(outcome.map(forward), work),
        Ok(FutureOr::Future(awaited)) => {
            awaited.add_listener(Box::new(InternalListener::new(
                move |awaited: Result<(), AsyncError>, work: &mut Propagation| match awaited {
                    Err(error) => result.settle(Err(error), work),
                    Ok(()) => result.settle(outcome.map(forward), work),
                },
            )));
        }
        Ok(FutureOr::Foreign(thenable)) => {
            let failed = result.clone();
            thenable.then_forward(
                Box::new(move |()| result.complete_now(outcome.map(forward))),
                Box::new(move |error| failed.complete_now(Err(error))),
            );
        }
    }
}

/// A runtime-internal continuation that receives the outcome directly,
/// without zone registration or error zone checks.
pub(crate) struct InternalListener<T> {
    callback: Box<dyn FnOnce(Result<T, AsyncError>, &mut Propagation)>,
}

impl<T> InternalListener<T> {
    pub(crate) fn new(callback: impl FnOnce(Result<T, AsyncError>, &mut Propagation) + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl<T> Listener<T> for InternalListener<T> {
    fn deliver(
        self: Box<Self>,
        outcome: Result<T, AsyncError>,
        _source_zone: &Zone,
        work: &mut Propagation,
    ) {
        (self.callback)(outcome, work);
    }
}
