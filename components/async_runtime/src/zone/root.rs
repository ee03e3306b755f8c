//! The root zone's handlers: the real implementations every other zone
//! eventually delegates to.

use super::callback::ErasedCallback;
use super::delegate::{HandlerEntry, HandlerTable};
use super::specification::{
    CreatePeriodicTimerHandler, CreateTimerHandler, ErrorCallbackHandler, ForkHandler,
    HandleUncaughtErrorHandler, PeriodicCallback, PrintHandler, RegisterCallbackHandler,
    RunHandler, ScheduleMicrotaskHandler, ZoneCallback, ZoneSpecification,
};
use super::{Zone, ZoneDelegate, ZoneInner, ZoneScope, ZoneValues};
use crate::scheduler;
use crate::task_queue::MicroTask;
use crate::timer::Timer;
use core_types::{AsyncError, UncaughtError};
use std::rc::{Rc, Weak};
use std::time::Duration;

fn run(_self_zone: &Zone, _parent: &ZoneDelegate, zone: &Zone, thunk: &mut dyn FnMut()) {
    if Zone::current() == *zone {
        thunk();
        return;
    }
    let _scope = ZoneScope::enter(zone);
    thunk();
}

fn register(
    _self_zone: &Zone,
    _parent: &ZoneDelegate,
    _zone: &Zone,
    callback: ErasedCallback,
) -> ErasedCallback {
    callback
}

fn error_callback(
    _self_zone: &Zone,
    _parent: &ZoneDelegate,
    _zone: &Zone,
    _error: &AsyncError,
) -> Option<AsyncError> {
    None
}

fn schedule_microtask(_self_zone: &Zone, _parent: &ZoneDelegate, zone: &Zone, callback: ZoneCallback) {
    let bound = zone.bind_once_guarded(callback);
    scheduler::enqueue_microtask(MicroTask::new(move || {
        bound();
        Ok(())
    }));
}

fn create_timer(
    _self_zone: &Zone,
    _parent: &ZoneDelegate,
    zone: &Zone,
    duration: Duration,
    callback: ZoneCallback,
) -> Timer {
    log::trace!("timer scheduled in {:?} after {:?}", zone, duration);
    Timer::schedule_once(duration, zone.bind_once_guarded(callback))
}

fn create_periodic_timer(
    _self_zone: &Zone,
    _parent: &ZoneDelegate,
    zone: &Zone,
    period: Duration,
    callback: PeriodicCallback,
) -> Timer {
    log::trace!("periodic timer scheduled in {:?} every {:?}", zone, period);
    let registered = zone.register_unary_callback(move |timer: Timer| callback(&timer));
    let zone = zone.clone();
    Timer::schedule_periodic(
        period,
        Rc::new(move |timer: &Timer| {
            zone.run_unary_guarded(|timer| registered(timer), timer.clone());
        }),
    )
}

fn handle_uncaught_error(_self_zone: &Zone, _parent: &ZoneDelegate, zone: &Zone, error: AsyncError) {
    if scheduler::config().log_uncaught_errors {
        log::error!(
            "uncaught error in {:?}: {}\n{}",
            zone,
            error,
            error.stack_trace()
        );
    }
    scheduler::enqueue_priority_microtask(MicroTask::new(move || {
        Err(UncaughtError::from(error))
    }));
}

fn print(_self_zone: &Zone, _parent: &ZoneDelegate, _zone: &Zone, line: &str) {
    println!("{}", line);
}

fn fork(
    _self_zone: &Zone,
    _parent: &ZoneDelegate,
    zone: &Zone,
    spec: ZoneSpecification,
    values: ZoneValues,
) -> Zone {
    let child = Zone::new_child(zone, spec, values);
    log::debug!("forked {:?} from {:?}", child, zone);
    child
}

/// The root zone's handler table, with every entry owned by `root`.
pub(crate) fn handler_table(root: &Weak<ZoneInner>) -> HandlerTable {
    let run: RunHandler = Rc::new(run);
    let register: RegisterCallbackHandler = Rc::new(register);
    let error_callback: ErrorCallbackHandler = Rc::new(error_callback);
    let schedule_microtask: ScheduleMicrotaskHandler = Rc::new(schedule_microtask);
    let create_timer: CreateTimerHandler = Rc::new(create_timer);
    let create_periodic_timer: CreatePeriodicTimerHandler = Rc::new(create_periodic_timer);
    let handle_uncaught_error: HandleUncaughtErrorHandler = Rc::new(handle_uncaught_error);
    let print: PrintHandler = Rc::new(print);
    let fork: ForkHandler = Rc::new(fork);

    HandlerTable {
        run: HandlerEntry::new(run.clone(), root.clone()),
        run_unary: HandlerEntry::new(run.clone(), root.clone()),
        run_binary: HandlerEntry::new(run, root.clone()),
        register_callback: HandlerEntry::new(register.clone(), root.clone()),
        register_unary_callback: HandlerEntry::new(register.clone(), root.clone()),
        register_binary_callback: HandlerEntry::new(register, root.clone()),
        error_callback: HandlerEntry::new(error_callback, root.clone()),
        schedule_microtask: HandlerEntry::new(schedule_microtask, root.clone()),
        create_timer: HandlerEntry::new(create_timer, root.clone()),
        create_periodic_timer: HandlerEntry::new(create_periodic_timer, root.clone()),
        handle_uncaught_error: HandlerEntry::new(handle_uncaught_error, root.clone()),
        print: HandlerEntry::new(print, root.clone()),
        fork: HandlerEntry::new(fork, root.clone()),
    }
}
