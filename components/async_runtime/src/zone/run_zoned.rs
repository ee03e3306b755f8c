//! Running code in a freshly forked zone.

use super::callback::OnError;
use super::{Zone, ZoneDelegate, ZoneSpecification, ZoneValues};
use core_types::AsyncError;

/// Options for [`run_zoned`].
#[derive(Debug, Default, Clone)]
pub struct ZoneOptions {
    specification: ZoneSpecification,
    values: ZoneValues,
    on_error: Option<OnError<Result<(), AsyncError>>>,
}

impl ZoneOptions {
    /// Options that fork a plain child of the current zone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handlers of the new zone.
    pub fn with_specification(mut self, specification: ZoneSpecification) -> Self {
        self.specification = specification;
        self
    }

    /// Sets the values of the new zone.
    pub fn with_values(mut self, values: ZoneValues) -> Self {
        self.values = values;
        self
    }

    /// Makes the new zone an error zone whose uncaught errors go to
    /// `handler`. Returning an error from the handler passes it on to the
    /// parent zone.
    pub fn with_on_error(mut self, handler: OnError<Result<(), AsyncError>>) -> Self {
        self.on_error = Some(handler);
        self
    }
}

/// Installs `on_error` as the uncaught-error handler of `spec`.
///
/// The handler runs in the parent zone. If it fails with the error it was
/// given, that error continues to the parent unchanged; any other failure
/// is reported to the parent instead.
fn guarded_specification(
    spec: ZoneSpecification,
    on_error: OnError<Result<(), AsyncError>>,
) -> ZoneSpecification {
    spec.with_handle_uncaught_error(
        move |self_zone: &Zone, parent: &ZoneDelegate, zone: &Zone, error: AsyncError| {
            let run_zone = self_zone.parent().unwrap_or_else(|| self_zone.clone());
            match on_error.run_in(&run_zone, error.clone()) {
                Ok(()) => {}
                Err(rethrown) if rethrown.is_same(&error) => {
                    parent.handle_uncaught_error(zone, error);
                }
                Err(other) => parent.handle_uncaught_error(zone, other),
            }
        },
    )
}

/// Runs `body` in a new child of the current zone.
///
/// # Examples
///
/// ```
/// use async_runtime::{run_zoned, EventLoop, Zone, ZoneKey, ZoneOptions, ZoneValues};
///
/// let _event_loop = EventLoop::new();
/// let request_id = ZoneKey::new("request_id");
/// let seen = run_zoned(
///     || Zone::current().get::<u64>(&request_id).map(|id| *id),
///     ZoneOptions::new().with_values(ZoneValues::new().with(request_id, 42u64)),
/// );
/// assert_eq!(seen, Some(42));
/// ```
pub fn run_zoned<R>(body: impl FnOnce() -> R, options: ZoneOptions) -> R {
    let ZoneOptions {
        specification,
        values,
        on_error,
    } = options;
    let specification = match on_error {
        Some(on_error) => guarded_specification(specification, on_error),
        None => specification,
    };
    Zone::current().fork(specification, values).run(body)
}

/// Runs `body` in a new error zone whose uncaught errors, including an
/// error returned by `body` itself, go to `on_error`.
///
/// Returns `None` when `body` failed.
///
/// # Examples
///
/// ```
/// use async_runtime::{run_zoned_guarded, schedule_microtask, EventLoop, OnError};
/// use core_types::AsyncError;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let mut event_loop = EventLoop::new();
/// let caught = Rc::new(RefCell::new(Vec::new()));
/// let sink = caught.clone();
/// run_zoned_guarded(
///     || {
///         schedule_microtask(|| Err(AsyncError::msg("late")));
///         Ok(())
///     },
///     OnError::unary(move |error: AsyncError| {
///         sink.borrow_mut().push(error.to_string());
///         Ok(())
///     }),
/// );
///
/// event_loop.run_until_done().unwrap();
/// assert_eq!(*caught.borrow(), vec!["Exception: late"]);
/// ```
pub fn run_zoned_guarded<R>(
    body: impl FnOnce() -> Result<R, AsyncError>,
    on_error: OnError<Result<(), AsyncError>>,
) -> Option<R> {
    let specification = guarded_specification(ZoneSpecification::new(), on_error);
    Zone::current()
        .fork(specification, ZoneValues::new())
        .run_guarded(body)
}
