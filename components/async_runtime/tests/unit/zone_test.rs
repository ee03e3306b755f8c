//! Unit tests for zones and their interaction with futures and streams

use async_runtime::{
    run_zoned, run_zoned_guarded, schedule_microtask, Completer, EventLoop, Future, OnError,
    StreamController, StreamHandlers, Zone, ZoneKey, ZoneOptions, ZoneSpecification, ZoneValues,
};
use core_types::AsyncError;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn event_loop() -> EventLoop {
    crate::init_logging();
    EventLoop::new()
}

fn counting_zone(counter: &Rc<Cell<usize>>) -> Zone {
    let counter = counter.clone();
    Zone::current().fork(
        ZoneSpecification::new().with_schedule_microtask(move |_, parent, zone, callback| {
            counter.set(counter.get() + 1);
            parent.schedule_microtask(zone, callback);
        }),
        ZoneValues::new(),
    )
}

#[test]
fn schedule_microtask_is_intercepted() {
    let mut event_loop = event_loop();
    let scheduled = Rc::new(Cell::new(0));
    let zone = counting_zone(&scheduled);
    let ran_in = Rc::new(RefCell::new(None));
    let sink = ran_in.clone();
    zone.run(|| {
        schedule_microtask(move || {
            *sink.borrow_mut() = Some(Zone::current());
            Ok(())
        })
    });

    event_loop.run_until_done().unwrap();
    assert_eq!(scheduled.get(), 1);
    assert_eq!(ran_in.borrow().clone(), Some(zone));
}

#[test]
fn continuation_runs_in_registering_zone() {
    let mut event_loop = event_loop();
    let completer = Completer::<i32>::new();
    let key = ZoneKey::new("name");
    let observed = Rc::new(RefCell::new(None));
    let sink = observed.clone();
    run_zoned(
        || {
            completer.future().then(move |_| {
                *sink.borrow_mut() = Zone::current().get::<&str>(&key).map(|name| *name);
            });
        },
        ZoneOptions::new().with_values(ZoneValues::new().with(key, "listener")),
    );

    completer.complete(1).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*observed.borrow(), Some("listener"));
}

#[test]
fn error_callback_replaces_errors() {
    let mut event_loop = event_loop();
    let zone = Zone::current().fork(
        ZoneSpecification::new().with_error_callback(|_, _, _, error| {
            Some(AsyncError::msg(format!("wrapped {}", error)))
        }),
        ZoneValues::new(),
    );
    let failed = zone.run(|| Future::<i32>::error(AsyncError::msg("inner")));
    failed.ignore();

    event_loop.run_until_done().unwrap();
    assert_eq!(
        failed.outcome().unwrap().unwrap_err().to_string(),
        "Exception: wrapped Exception: inner"
    );
}

#[test]
fn uncaught_errors_stay_in_their_error_zone() {
    let mut event_loop = event_loop();
    let caught = Rc::new(RefCell::new(Vec::new()));
    let sink = caught.clone();
    let completer = Completer::<i32>::new();
    let source = completer.future();

    // The listener lives in a guarded zone; the future belongs to the root
    // zone, so the error crosses an error-zone boundary.
    run_zoned_guarded(
        || {
            source.then(|x| x + 1);
            Ok(())
        },
        OnError::unary(move |error: AsyncError| {
            sink.borrow_mut().push(error.to_string());
            Ok(())
        }),
    );

    completer.complete_error(AsyncError::msg("crossed")).unwrap();
    let uncaught = event_loop.run_until_done().unwrap_err();
    assert_eq!(uncaught.error.to_string(), "Exception: crossed");
    assert!(caught.borrow().is_empty());
}

#[test]
fn guarded_zone_catches_stream_handler_failures() {
    let mut event_loop = event_loop();
    let caught = Rc::new(RefCell::new(Vec::new()));
    let sink = caught.clone();
    let controller = StreamController::new();
    let stream = controller.stream();
    run_zoned_guarded(
        || {
            stream.listen_with(StreamHandlers::new().with_data_result(|x: i32| {
                if x < 0 {
                    Err(AsyncError::msg("negative"))
                } else {
                    Ok(())
                }
            }))?;
            Ok(())
        },
        OnError::unary(move |error: AsyncError| {
            sink.borrow_mut().push(error.to_string());
            Ok(())
        }),
    );

    controller.add(1).unwrap();
    controller.add(-1).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*caught.borrow(), vec!["Exception: negative"]);
}

#[test]
fn print_is_intercepted() {
    let _event_loop = event_loop();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    let zone = Zone::current().fork(
        ZoneSpecification::new().with_print(move |_, _, _, line| sink.borrow_mut().push(line.to_string())),
        ZoneValues::new(),
    );
    zone.print("hello");
    assert_eq!(*lines.borrow(), vec!["hello"]);
}

#[test]
fn rethrowing_handler_passes_error_to_parent() {
    let mut event_loop = event_loop();
    let outer_seen = Rc::new(RefCell::new(Vec::new()));
    let sink = outer_seen.clone();
    run_zoned_guarded(
        || {
            run_zoned_guarded(
                || Err::<(), _>(AsyncError::msg("twice")),
                OnError::unary(|error: AsyncError| Err(error)),
            );
            Ok(())
        },
        OnError::unary(move |error: AsyncError| {
            sink.borrow_mut().push(error.to_string());
            Ok(())
        }),
    );

    event_loop.run_until_done().unwrap();
    assert_eq!(*outer_seen.borrow(), vec!["Exception: twice"]);
}
