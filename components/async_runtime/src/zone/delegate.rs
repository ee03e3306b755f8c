//! Handler tables and parent delegates.

use super::callback::ErasedCallback;
use super::specification::*;
use super::{Zone, ZoneInner, ZoneValues};
use crate::timer::Timer;
use core_types::AsyncError;
use std::rc::Weak;
use std::time::Duration;

/// A handler together with the zone that defined it.
pub(crate) struct HandlerEntry<H> {
    function: H,
    owner: Weak<ZoneInner>,
}

impl<H: Clone> Clone for HandlerEntry<H> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<H> HandlerEntry<H> {
    pub(crate) fn new(function: H, owner: Weak<ZoneInner>) -> Self {
        Self { function, owner }
    }

    /// The defining zone. Children keep their ancestors alive, so this only
    /// falls back to the root for an entry whose zone is being torn down.
    fn owner(&self) -> Zone {
        self.owner
            .upgrade()
            .map(Zone::from_inner)
            .unwrap_or_else(Zone::root)
    }
}

fn override_entry<H>(entry: &mut HandlerEntry<H>, handler: Option<H>, owner: &Weak<ZoneInner>) {
    if let Some(function) = handler {
        *entry = HandlerEntry::new(function, owner.clone());
    }
}

/// One entry per zone capability. Every zone's table is total.
#[derive(Clone)]
pub(crate) struct HandlerTable {
    pub(crate) run: HandlerEntry<RunHandler>,
    pub(crate) run_unary: HandlerEntry<RunHandler>,
    pub(crate) run_binary: HandlerEntry<RunHandler>,
    pub(crate) register_callback: HandlerEntry<RegisterCallbackHandler>,
    pub(crate) register_unary_callback: HandlerEntry<RegisterCallbackHandler>,
    pub(crate) register_binary_callback: HandlerEntry<RegisterCallbackHandler>,
    pub(crate) error_callback: HandlerEntry<ErrorCallbackHandler>,
    pub(crate) schedule_microtask: HandlerEntry<ScheduleMicrotaskHandler>,
    pub(crate) create_timer: HandlerEntry<CreateTimerHandler>,
    pub(crate) create_periodic_timer: HandlerEntry<CreatePeriodicTimerHandler>,
    pub(crate) handle_uncaught_error: HandlerEntry<HandleUncaughtErrorHandler>,
    pub(crate) print: HandlerEntry<PrintHandler>,
    pub(crate) fork: HandlerEntry<ForkHandler>,
}

impl HandlerTable {
    /// Copies `parent`'s table, replacing the entries `spec` defines with
    /// handlers owned by `owner`.
    pub(crate) fn inherit(parent: &HandlerTable, spec: ZoneSpecification, owner: &Weak<ZoneInner>) -> Self {
        let mut table = parent.clone();
        override_entry(&mut table.run, spec.run, owner);
        override_entry(&mut table.run_unary, spec.run_unary, owner);
        override_entry(&mut table.run_binary, spec.run_binary, owner);
        override_entry(&mut table.register_callback, spec.register_callback, owner);
        override_entry(
            &mut table.register_unary_callback,
            spec.register_unary_callback,
            owner,
        );
        override_entry(
            &mut table.register_binary_callback,
            spec.register_binary_callback,
            owner,
        );
        override_entry(&mut table.error_callback, spec.error_callback, owner);
        override_entry(&mut table.schedule_microtask, spec.schedule_microtask, owner);
        override_entry(&mut table.create_timer, spec.create_timer, owner);
        override_entry(
            &mut table.create_periodic_timer,
            spec.create_periodic_timer,
            owner,
        );
        override_entry(
            &mut table.handle_uncaught_error,
            spec.handle_uncaught_error,
            owner,
        );
        override_entry(&mut table.print, spec.print, owner);
        override_entry(&mut table.fork, spec.fork, owner);
        table
    }

    /// The zone whose uncaught-error handler this table uses.
    pub(crate) fn error_zone(&self) -> Zone {
        self.handle_uncaught_error.owner()
    }
}

/// Gives a handler access to the implementation of each capability in the
/// zones above the one that defined it.
///
/// Every method takes the zone the operation was originally invoked on,
/// which the parent implementation acts upon (for example, the root `run`
/// enters that zone, not the parent).
#[derive(Clone, Debug)]
pub struct ZoneDelegate {
    target: Zone,
}

impl ZoneDelegate {
    pub(crate) fn new(target: Zone) -> Self {
        Self { target }
    }

    /// Runs the thunk through the target's `run` handler.
    pub fn run(&self, zone: &Zone, thunk: &mut dyn FnMut()) {
        let entry = &self.target.handlers().run;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, thunk);
    }

    /// Runs the thunk through the target's `run_unary` handler.
    pub fn run_unary(&self, zone: &Zone, thunk: &mut dyn FnMut()) {
        let entry = &self.target.handlers().run_unary;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, thunk);
    }

    /// Runs the thunk through the target's `run_binary` handler.
    pub fn run_binary(&self, zone: &Zone, thunk: &mut dyn FnMut()) {
        let entry = &self.target.handlers().run_binary;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, thunk);
    }

    /// Registers a nullary callback with the target.
    pub fn register_callback(&self, zone: &Zone, callback: ErasedCallback) -> ErasedCallback {
        let entry = &self.target.handlers().register_callback;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, callback)
    }

    /// Registers a unary callback with the target.
    pub fn register_unary_callback(&self, zone: &Zone, callback: ErasedCallback) -> ErasedCallback {
        let entry = &self.target.handlers().register_unary_callback;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, callback)
    }

    /// Registers a binary callback with the target.
    pub fn register_binary_callback(&self, zone: &Zone, callback: ErasedCallback) -> ErasedCallback {
        let entry = &self.target.handlers().register_binary_callback;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, callback)
    }

    /// Asks the target for a replacement of `error`.
    pub fn error_callback(&self, zone: &Zone, error: &AsyncError) -> Option<AsyncError> {
        let entry = &self.target.handlers().error_callback;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, error)
    }

    /// Schedules a microtask through the target.
    pub fn schedule_microtask(&self, zone: &Zone, callback: ZoneCallback) {
        let entry = &self.target.handlers().schedule_microtask;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, callback);
    }

    /// Creates a one-shot timer through the target.
    pub fn create_timer(&self, zone: &Zone, duration: Duration, callback: ZoneCallback) -> Timer {
        let entry = &self.target.handlers().create_timer;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, duration, callback)
    }

    /// Creates a periodic timer through the target.
    pub fn create_periodic_timer(
        &self,
        zone: &Zone,
        period: Duration,
        callback: PeriodicCallback,
    ) -> Timer {
        let entry = &self.target.handlers().create_periodic_timer;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, period, callback)
    }

    /// Hands an uncaught error to the target.
    pub fn handle_uncaught_error(&self, zone: &Zone, error: AsyncError) {
        let entry = &self.target.handlers().handle_uncaught_error;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, error);
    }

    /// Prints through the target.
    pub fn print(&self, zone: &Zone, line: &str) {
        let entry = &self.target.handlers().print;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, line);
    }

    /// Forks through the target. `zone` becomes the new zone's parent.
    pub fn fork(&self, zone: &Zone, spec: ZoneSpecification, values: ZoneValues) -> Zone {
        let entry = &self.target.handlers().fork;
        let owner = entry.owner();
        (entry.function)(&owner, &owner.parent_delegate(), zone, spec, values)
    }
}
