//! Piping another stream into a controller.

use super::{Stream, StreamHandlers, StreamSubscription};
use crate::future::Future;
use crate::zone::OnError;
use core_types::{AsyncError, RuntimeError};
use std::rc::Rc;

/// A controller that accepts events from an added stream while direct
/// `add`/`add_error`/`close` calls are refused.
pub(crate) trait AddStreamTarget<T> {
    fn add_unchecked(&self, value: T);

    fn add_error_unchecked(&self, error: AsyncError);

    /// The added stream is finished; direct production may continue.
    fn finish_add_stream(&self);
}

/// An `add_stream` in progress.
pub(crate) struct AddStreamState<T> {
    subscription: StreamSubscription<T>,
    done: Future<()>,
}

impl<T: Clone + 'static> AddStreamState<T> {
    /// Listens to `source`, forwarding its events to `target`.
    ///
    /// With `cancel_on_error` the first error also ends the added stream.
    pub(crate) fn start(
        target: Rc<dyn AddStreamTarget<T>>,
        source: &Stream<T>,
        cancel_on_error: bool,
    ) -> Result<Self, RuntimeError> {
        let data_target = target.clone();
        let error_target = target.clone();
        let on_error = OnError::unary(move |error: AsyncError| {
            error_target.add_error_unchecked(error);
            if cancel_on_error {
                error_target.finish_add_stream();
            }
            Ok(())
        });
        let subscription = source.listen_with(
            StreamHandlers::new()
                .with_data(move |value| data_target.add_unchecked(value))
                .with_error(on_error)
                .with_done(move || target.finish_add_stream())
                .with_cancel_on_error(cancel_on_error),
        )?;
        Ok(Self {
            subscription,
            done: Future::pending(),
        })
    }

    /// Completes when the added stream is finished or canceled.
    pub(crate) fn future(&self) -> Future<()> {
        self.done.clone()
    }

    pub(crate) fn pause(&self) {
        self.subscription.pause();
    }

    pub(crate) fn resume(&self) {
        self.subscription.resume();
    }

    /// Cancels the added stream's subscription. The returned future, if
    /// any, completes after the source has cleaned up.
    pub(crate) fn cancel(&self) -> Option<Future<()>> {
        let done = self.done.clone();
        match self.subscription.core().cancel() {
            Some(cleanup) => Some(cleanup.when_complete(move || complete(&done))),
            None => {
                complete(&self.done);
                None
            }
        }
    }

    pub(crate) fn complete(&self) {
        complete(&self.done);
    }
}

fn complete(done: &Future<()>) {
    if done.may_complete() {
        done.complete_async(Ok(()));
    }
}
