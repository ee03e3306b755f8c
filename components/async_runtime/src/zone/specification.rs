//! Handler signatures and the specification used to fork a zone.
//!
//! Every handler receives the zone that defined it (`self_zone`), a delegate
//! to the parent's implementation (`parent`), and the zone the operation was
//! originally invoked on (`zone`), followed by the operation's arguments.

use super::callback::ErasedCallback;
use super::{Zone, ZoneDelegate, ZoneValues};
use crate::timer::Timer;
use core_types::AsyncError;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A callback scheduled as a microtask or one-shot timer.
pub type ZoneCallback = Box<dyn FnOnce() -> Result<(), AsyncError>>;

/// A callback invoked on every tick of a periodic timer.
pub type PeriodicCallback = Rc<dyn Fn(&Timer) -> Result<(), AsyncError>>;

/// Intercepts `run`, `run_unary` and `run_binary`.
///
/// The thunk runs the user callback; a handler forwards it to
/// `parent.run(zone, thunk)` to actually enter the zone.
pub type RunHandler = Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, &mut dyn FnMut())>;

/// Intercepts callback registration.
pub type RegisterCallbackHandler =
    Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, ErasedCallback) -> ErasedCallback>;

/// Intercepts error creation; `None` leaves the error unchanged.
pub type ErrorCallbackHandler =
    Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, &AsyncError) -> Option<AsyncError>>;

/// Intercepts microtask scheduling.
pub type ScheduleMicrotaskHandler = Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, ZoneCallback)>;

/// Intercepts one-shot timer creation.
pub type CreateTimerHandler =
    Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, Duration, ZoneCallback) -> Timer>;

/// Intercepts periodic timer creation.
pub type CreatePeriodicTimerHandler =
    Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, Duration, PeriodicCallback) -> Timer>;

/// Receives errors that nothing else handled.
pub type HandleUncaughtErrorHandler = Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, AsyncError)>;

/// Intercepts `print`.
pub type PrintHandler = Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, &str)>;

/// Intercepts `fork`.
pub type ForkHandler =
    Rc<dyn Fn(&Zone, &ZoneDelegate, &Zone, ZoneSpecification, ZoneValues) -> Zone>;

/// The handlers a forked zone overrides. Unset handlers are inherited from
/// the parent.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Zone, ZoneSpecification, ZoneValues};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let _event_loop = EventLoop::new();
/// let printed = Rc::new(RefCell::new(Vec::new()));
/// let sink = printed.clone();
/// let spec = ZoneSpecification::new().with_print(move |_, _, _, line| {
///     sink.borrow_mut().push(line.to_string());
/// });
///
/// let zone = Zone::current().fork(spec, ZoneValues::new());
/// zone.run(|| Zone::current().print("hello"));
/// assert_eq!(*printed.borrow(), vec!["hello"]);
/// ```
#[derive(Clone, Default)]
pub struct ZoneSpecification {
    pub(crate) run: Option<RunHandler>,
    pub(crate) run_unary: Option<RunHandler>,
    pub(crate) run_binary: Option<RunHandler>,
    pub(crate) register_callback: Option<RegisterCallbackHandler>,
    pub(crate) register_unary_callback: Option<RegisterCallbackHandler>,
    pub(crate) register_binary_callback: Option<RegisterCallbackHandler>,
    pub(crate) error_callback: Option<ErrorCallbackHandler>,
    pub(crate) schedule_microtask: Option<ScheduleMicrotaskHandler>,
    pub(crate) create_timer: Option<CreateTimerHandler>,
    pub(crate) create_periodic_timer: Option<CreatePeriodicTimerHandler>,
    pub(crate) handle_uncaught_error: Option<HandleUncaughtErrorHandler>,
    pub(crate) print: Option<PrintHandler>,
    pub(crate) fork: Option<ForkHandler>,
}

impl ZoneSpecification {
    /// An empty specification: the forked zone behaves like its parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the handlers set in `overrides`, keeping the rest.
    pub fn merged_with(self, overrides: ZoneSpecification) -> Self {
        Self {
            run: overrides.run.or(self.run),
            run_unary: overrides.run_unary.or(self.run_unary),
            run_binary: overrides.run_binary.or(self.run_binary),
            register_callback: overrides.register_callback.or(self.register_callback),
            register_unary_callback: overrides
                .register_unary_callback
                .or(self.register_unary_callback),
            register_binary_callback: overrides
                .register_binary_callback
                .or(self.register_binary_callback),
            error_callback: overrides.error_callback.or(self.error_callback),
            schedule_microtask: overrides.schedule_microtask.or(self.schedule_microtask),
            create_timer: overrides.create_timer.or(self.create_timer),
            create_periodic_timer: overrides
                .create_periodic_timer
                .or(self.create_periodic_timer),
            handle_uncaught_error: overrides
                .handle_uncaught_error
                .or(self.handle_uncaught_error),
            print: overrides.print.or(self.print),
            fork: overrides.fork.or(self.fork),
        }
    }

    /// Sets the `run` handler.
    pub fn with_run<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, &mut dyn FnMut()) + 'static,
    {
        self.run = Some(Rc::new(handler));
        self
    }

    /// Sets the `run_unary` handler.
    pub fn with_run_unary<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, &mut dyn FnMut()) + 'static,
    {
        self.run_unary = Some(Rc::new(handler));
        self
    }

    /// Sets the `run_binary` handler.
    pub fn with_run_binary<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, &mut dyn FnMut()) + 'static,
    {
        self.run_binary = Some(Rc::new(handler));
        self
    }

    /// Sets the `register_callback` handler.
    pub fn with_register_callback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, ErasedCallback) -> ErasedCallback + 'static,
    {
        self.register_callback = Some(Rc::new(handler));
        self
    }

    /// Sets the `register_unary_callback` handler.
    pub fn with_register_unary_callback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, ErasedCallback) -> ErasedCallback + 'static,
    {
        self.register_unary_callback = Some(Rc::new(handler));
        self
    }

    /// Sets the `register_binary_callback` handler.
    pub fn with_register_binary_callback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, ErasedCallback) -> ErasedCallback + 'static,
    {
        self.register_binary_callback = Some(Rc::new(handler));
        self
    }

    /// Sets the `error_callback` handler.
    pub fn with_error_callback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, &AsyncError) -> Option<AsyncError> + 'static,
    {
        self.error_callback = Some(Rc::new(handler));
        self
    }

    /// Sets the `schedule_microtask` handler.
    pub fn with_schedule_microtask<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, ZoneCallback) + 'static,
    {
        self.schedule_microtask = Some(Rc::new(handler));
        self
    }

    /// Sets the `create_timer` handler.
    pub fn with_create_timer<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, Duration, ZoneCallback) -> Timer + 'static,
    {
        self.create_timer = Some(Rc::new(handler));
        self
    }

    /// Sets the `create_periodic_timer` handler.
    pub fn with_create_periodic_timer<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, Duration, PeriodicCallback) -> Timer + 'static,
    {
        self.create_periodic_timer = Some(Rc::new(handler));
        self
    }

    /// Sets the `handle_uncaught_error` handler.
    pub fn with_handle_uncaught_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, AsyncError) + 'static,
    {
        self.handle_uncaught_error = Some(Rc::new(handler));
        self
    }

    /// Sets the `print` handler.
    pub fn with_print<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, &str) + 'static,
    {
        self.print = Some(Rc::new(handler));
        self
    }

    /// Sets the `fork` handler.
    pub fn with_fork<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Zone, &ZoneDelegate, &Zone, ZoneSpecification, ZoneValues) -> Zone + 'static,
    {
        self.fork = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for ZoneSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = Vec::new();
        let entries = [
            ("run", self.run.is_some()),
            ("run_unary", self.run_unary.is_some()),
            ("run_binary", self.run_binary.is_some()),
            ("register_callback", self.register_callback.is_some()),
            ("register_unary_callback", self.register_unary_callback.is_some()),
            ("register_binary_callback", self.register_binary_callback.is_some()),
            ("error_callback", self.error_callback.is_some()),
            ("schedule_microtask", self.schedule_microtask.is_some()),
            ("create_timer", self.create_timer.is_some()),
            ("create_periodic_timer", self.create_periodic_timer.is_some()),
            ("handle_uncaught_error", self.handle_uncaught_error.is_some()),
            ("print", self.print.is_some()),
            ("fork", self.fork.is_some()),
        ];
        for (name, present) in entries {
            if present {
                set.push(name);
            }
        }
        f.debug_struct("ZoneSpecification")
            .field("handlers", &set)
            .finish()
    }
}
