//! Zones: dynamically scoped execution contexts.
//!
//! A zone intercepts how callbacks run, how they are registered, how
//! microtasks and timers are scheduled, and where uncaught errors go. Zones
//! form a tree rooted at the per-thread root zone; [`Zone::fork`] creates a
//! child whose unspecified handlers delegate to the parent.
//!
//! The current zone is thread-local. Running a callback in a zone makes that
//! zone current for the dynamic extent of the call and restores the previous
//! zone on every exit path, including unwinding.

mod callback;
mod delegate;
mod root;
mod run_zoned;
mod specification;

pub use callback::{ErasedCallback, OnError};
pub use delegate::ZoneDelegate;
pub use run_zoned::{run_zoned, run_zoned_guarded, ZoneOptions};
pub use specification::{
    CreatePeriodicTimerHandler, CreateTimerHandler, ErrorCallbackHandler, ForkHandler,
    HandleUncaughtErrorHandler, PeriodicCallback, PrintHandler, RegisterCallbackHandler,
    RunHandler, ScheduleMicrotaskHandler, ZoneCallback, ZoneSpecification,
};

use crate::timer::Timer;
use callback::{once_callback, register_with};
use core_types::AsyncError;
use delegate::HandlerTable;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_ZONE_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static ROOT: Zone = Zone::new_root();
    static CURRENT: RefCell<Option<Zone>> = const { RefCell::new(None) };
}

/// Makes the root zone current again.
pub(crate) fn reset_current() {
    CURRENT.with(|current| *current.borrow_mut() = None);
}

/// Keeps a zone current until dropped, then restores the previous one.
pub(crate) struct ZoneScope {
    previous: Option<Zone>,
}

impl ZoneScope {
    pub(crate) fn enter(zone: &Zone) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(zone.clone())));
        Self { previous }
    }
}

impl Drop for ZoneScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = previous);
    }
}

/// A key for values stored in a zone.
///
/// Keys compare by identity: two keys created with the same name are
/// different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    id: u64,
    name: &'static str,
}

impl ZoneKey {
    /// Creates a fresh key. `name` is only used for debugging.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
        }
    }

    /// The debugging name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Values attached to a zone when it is forked.
#[derive(Clone, Default)]
pub struct ZoneValues {
    entries: HashMap<ZoneKey, Rc<dyn Any>>,
}

impl ZoneValues {
    /// An empty value map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key`.
    pub fn with<V: 'static>(mut self, key: ZoneKey, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts `value` under `key`, replacing any previous value.
    pub fn insert<V: 'static>(&mut self, key: ZoneKey, value: V) {
        self.entries.insert(key, Rc::new(value));
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no value is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ZoneValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.keys().map(ZoneKey::name))
            .finish()
    }
}

pub(crate) struct ZoneInner {
    id: u64,
    parent: Option<Zone>,
    handlers: HandlerTable,
    // Own values plus values memoized from ancestors.
    values: RefCell<HashMap<ZoneKey, Rc<dyn Any>>>,
}

/// A handle to a zone. Cloning is cheap; clones refer to the same zone.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Zone, ZoneKey, ZoneSpecification, ZoneValues};
///
/// let _event_loop = EventLoop::new();
/// let user = ZoneKey::new("user");
/// let zone = Zone::current().fork(ZoneSpecification::new(), ZoneValues::new().with(user, "ada"));
///
/// zone.run(|| {
///     assert_eq!(Zone::current(), zone);
///     assert_eq!(Zone::current().get::<&str>(&user).as_deref(), Some(&"ada"));
/// });
/// assert!(Zone::current().is_root());
/// ```
#[derive(Clone)]
pub struct Zone {
    inner: Rc<ZoneInner>,
}

impl Zone {
    fn new_root() -> Zone {
        let inner = Rc::new_cyclic(|this| ZoneInner {
            id: NEXT_ZONE_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            handlers: root::handler_table(this),
            values: RefCell::new(HashMap::new()),
        });
        Zone { inner }
    }

    pub(crate) fn new_child(parent: &Zone, spec: ZoneSpecification, values: ZoneValues) -> Zone {
        let inner = Rc::new_cyclic(|this| ZoneInner {
            id: NEXT_ZONE_ID.fetch_add(1, Ordering::Relaxed),
            parent: Some(parent.clone()),
            handlers: HandlerTable::inherit(&parent.inner.handlers, spec, this),
            values: RefCell::new(values.entries),
        });
        Zone { inner }
    }

    pub(crate) fn from_inner(inner: Rc<ZoneInner>) -> Zone {
        Zone { inner }
    }

    pub(crate) fn handlers(&self) -> &HandlerTable {
        &self.inner.handlers
    }

    fn delegate(&self) -> ZoneDelegate {
        ZoneDelegate::new(self.clone())
    }

    pub(crate) fn parent_delegate(&self) -> ZoneDelegate {
        ZoneDelegate::new(self.parent().unwrap_or_else(|| self.clone()))
    }

    /// The root zone of this thread.
    pub fn root() -> Zone {
        ROOT.with(Zone::clone)
    }

    /// The zone the calling code runs in.
    pub fn current() -> Zone {
        CURRENT
            .with(|current| current.borrow().clone())
            .unwrap_or_else(Zone::root)
    }

    /// The parent zone, `None` for the root.
    pub fn parent(&self) -> Option<Zone> {
        self.inner.parent.clone()
    }

    /// Returns true for the root zone.
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// The closest zone, starting with this one, that defines an
    /// uncaught-error handler.
    pub fn error_zone(&self) -> Zone {
        self.inner.handlers.error_zone()
    }

    /// Returns true if errors may flow between this zone and `other`.
    pub fn in_same_error_zone(&self, other: &Zone) -> bool {
        self.error_zone() == other.error_zone()
    }

    /// Looks up a zone value, searching ancestors when this zone does not
    /// define it. Values found in an ancestor are memoized here.
    pub fn get<V: 'static>(&self, key: &ZoneKey) -> Option<Rc<V>> {
        self.lookup(key)?.downcast::<V>().ok()
    }

    fn lookup(&self, key: &ZoneKey) -> Option<Rc<dyn Any>> {
        if let Some(value) = self.inner.values.borrow().get(key) {
            return Some(value.clone());
        }
        let value = self.inner.parent.as_ref()?.lookup(key)?;
        self.inner
            .values
            .borrow_mut()
            .insert(*key, value.clone());
        Some(value)
    }

    /// Creates a child zone.
    pub fn fork(&self, spec: ZoneSpecification, values: ZoneValues) -> Zone {
        self.delegate().fork(self, spec, values)
    }

    fn run_through<R>(&self, f: impl FnOnce() -> R, dispatch: fn(&ZoneDelegate, &Zone, &mut dyn FnMut())) -> R {
        let mut f = Some(f);
        let mut result = None;
        {
            let mut thunk = || {
                if let Some(f) = f.take() {
                    result = Some(f());
                }
            };
            dispatch(&self.delegate(), self, &mut thunk);
        }
        match (result, f) {
            (Some(result), _) => result,
            // A handler that never ran the callback: run it here, in the zone.
            (None, Some(f)) => {
                let _scope = ZoneScope::enter(self);
                f()
            }
            (None, None) => unreachable!("zone callback ran without producing a result"),
        }
    }

    /// Runs `f` in this zone.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        self.run_through(f, ZoneDelegate::run)
    }

    /// Runs `f(arg)` in this zone.
    pub fn run_unary<A, R>(&self, f: impl FnOnce(A) -> R, arg: A) -> R {
        self.run_through(move || f(arg), ZoneDelegate::run_unary)
    }

    /// Runs `f(first, second)` in this zone.
    pub fn run_binary<A, B, R>(&self, f: impl FnOnce(A, B) -> R, first: A, second: B) -> R {
        self.run_through(move || f(first, second), ZoneDelegate::run_binary)
    }

    /// Runs `f` in this zone; an error is handed to
    /// [`Zone::handle_uncaught_error`].
    pub fn run_guarded<R>(&self, f: impl FnOnce() -> Result<R, AsyncError>) -> Option<R> {
        match self.run(f) {
            Ok(result) => Some(result),
            Err(error) => {
                self.handle_uncaught_error(error);
                None
            }
        }
    }

    /// Guarded form of [`Zone::run_unary`].
    pub fn run_unary_guarded<A, R>(
        &self,
        f: impl FnOnce(A) -> Result<R, AsyncError>,
        arg: A,
    ) -> Option<R> {
        match self.run_unary(f, arg) {
            Ok(result) => Some(result),
            Err(error) => {
                self.handle_uncaught_error(error);
                None
            }
        }
    }

    /// Guarded form of [`Zone::run_binary`].
    pub fn run_binary_guarded<A, B, R>(
        &self,
        f: impl FnOnce(A, B) -> Result<R, AsyncError>,
        first: A,
        second: B,
    ) -> Option<R> {
        match self.run_binary(f, first, second) {
            Ok(result) => Some(result),
            Err(error) => {
                self.handle_uncaught_error(error);
                None
            }
        }
    }

    /// Gives the zone a chance to wrap `f` before it is stored for later.
    pub fn register_callback<R: 'static>(&self, f: impl Fn() -> R + 'static) -> Rc<dyn Fn() -> R> {
        let original: Rc<dyn Fn(()) -> R> = Rc::new(move |()| f());
        let registered = register_with(original, |erased| {
            self.delegate().register_callback(self, erased)
        });
        Rc::new(move || registered(()))
    }

    /// Unary form of [`Zone::register_callback`].
    pub fn register_unary_callback<A: 'static, R: 'static>(
        &self,
        f: impl Fn(A) -> R + 'static,
    ) -> Rc<dyn Fn(A) -> R> {
        let original: Rc<dyn Fn(A) -> R> = Rc::new(f);
        register_with(original, |erased| {
            self.delegate().register_unary_callback(self, erased)
        })
    }

    /// Binary form of [`Zone::register_callback`].
    pub fn register_binary_callback<A: 'static, B: 'static, R: 'static>(
        &self,
        f: impl Fn(A, B) -> R + 'static,
    ) -> Rc<dyn Fn(A, B) -> R> {
        let original: Rc<dyn Fn((A, B)) -> R> = Rc::new(move |(a, b)| f(a, b));
        let registered = register_with(original, |erased| {
            self.delegate().register_binary_callback(self, erased)
        });
        Rc::new(move |a, b| registered((a, b)))
    }

    /// Registers `f` and returns a callback that runs it in this zone.
    pub fn bind_callback<R: 'static>(&self, f: impl Fn() -> R + 'static) -> impl Fn() -> R {
        let registered = self.register_callback(f);
        let zone = self.clone();
        move || zone.run(|| registered())
    }

    /// Registers `f` and returns a callback that runs it in this zone.
    pub fn bind_unary_callback<A: 'static, R: 'static>(
        &self,
        f: impl Fn(A) -> R + 'static,
    ) -> impl Fn(A) -> R {
        let registered = self.register_unary_callback(f);
        let zone = self.clone();
        move |arg| zone.run_unary(|arg| registered(arg), arg)
    }

    /// Like [`Zone::bind_callback`], routing errors to
    /// [`Zone::handle_uncaught_error`].
    pub fn bind_callback_guarded(
        &self,
        f: impl Fn() -> Result<(), AsyncError> + 'static,
    ) -> impl Fn() {
        let registered = self.register_callback(f);
        let zone = self.clone();
        move || {
            zone.run_guarded(|| registered());
        }
    }

    /// Like [`Zone::bind_unary_callback`], routing errors to
    /// [`Zone::handle_uncaught_error`].
    pub fn bind_unary_callback_guarded<A: 'static>(
        &self,
        f: impl Fn(A) -> Result<(), AsyncError> + 'static,
    ) -> impl Fn(A) {
        let registered = self.register_unary_callback(f);
        let zone = self.clone();
        move |arg| {
            zone.run_unary_guarded(|arg| registered(arg), arg);
        }
    }

    pub(crate) fn bind_once_guarded(&self, callback: ZoneCallback) -> Box<dyn FnOnce()> {
        let registered = self.register_callback(once_callback(callback));
        let zone = self.clone();
        Box::new(move || {
            zone.run_guarded(|| registered());
        })
    }

    /// Lets the zone replace an error before it is stored in a future or
    /// stream. `None` means keep the original.
    pub fn error_callback(&self, error: &AsyncError) -> Option<AsyncError> {
        self.delegate().error_callback(self, error)
    }

    /// Applies [`Zone::error_callback`], returning the error to use.
    pub(crate) fn replace_error(&self, error: AsyncError) -> AsyncError {
        self.error_callback(&error).unwrap_or(error)
    }

    /// Schedules `f` to run as a microtask in this zone.
    pub fn schedule_microtask(&self, f: impl FnOnce() -> Result<(), AsyncError> + 'static) {
        self.delegate().schedule_microtask(self, Box::new(f));
    }

    /// Creates a one-shot timer that runs `f` in this zone.
    pub fn create_timer(
        &self,
        duration: Duration,
        f: impl FnOnce() -> Result<(), AsyncError> + 'static,
    ) -> Timer {
        self.delegate().create_timer(self, duration, Box::new(f))
    }

    /// Creates a periodic timer that runs `f` in this zone.
    pub fn create_periodic_timer(
        &self,
        period: Duration,
        f: impl Fn(&Timer) -> Result<(), AsyncError> + 'static,
    ) -> Timer {
        self.delegate().create_periodic_timer(self, period, Rc::new(f))
    }

    /// Hands an error nothing else handled to the zone's error handler.
    pub fn handle_uncaught_error(&self, error: AsyncError) {
        self.delegate().handle_uncaught_error(self, error);
    }

    /// Prints a line through the zone.
    pub fn print(&self, line: &str) {
        self.delegate().print(self, line);
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Zone {}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "Zone(root)")
        } else {
            write!(f, "Zone({})", self.inner.id)
        }
    }
}
