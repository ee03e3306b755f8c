//! Zoned Error Integration Tests
//!
//! Tests how errors from futures, streams, timers and microtasks reach the
//! zone that owns them, and how the root zone surfaces what nobody handles.

use async_runtime::{
    run_zoned, run_zoned_guarded, schedule_microtask, Completer, Future, OnError,
    StreamController, Timer, Zone, ZoneOptions, ZoneSpecification, ZoneValues,
};
use core_types::AsyncError;
use integration_tests::virtual_event_loop;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn collecting_handler(log: &Rc<RefCell<Vec<String>>>) -> OnError<Result<(), AsyncError>> {
    let sink = log.clone();
    OnError::unary(move |error: AsyncError| {
        sink.borrow_mut().push(error.to_string());
        Ok(())
    })
}

/// Test: one guarded zone catches failures from every kind of callback
#[test]
fn test_guarded_zone_catches_every_source() {
    let mut event_loop = virtual_event_loop();
    let caught = Rc::new(RefCell::new(Vec::new()));
    let controller = StreamController::<i32>::new();
    let stream = controller.stream();

    run_zoned_guarded(
        || {
            schedule_microtask(|| Err(AsyncError::msg("microtask")));
            Timer::new(Duration::from_millis(5), || Err(AsyncError::msg("timer")));
            Future::<i32>::error(AsyncError::msg("future"));
            stream.listen(|_| {})?;
            Ok(())
        },
        collecting_handler(&caught),
    );

    controller.add_error(AsyncError::msg("stream")).unwrap();
    event_loop.run_until_done().unwrap();

    let mut caught = caught.borrow().clone();
    caught.sort();
    assert_eq!(
        caught,
        vec![
            "Exception: future",
            "Exception: microtask",
            "Exception: stream",
            "Exception: timer"
        ]
    );
}

/// Test: a periodic timer keeps ticking after its callback fails
#[test]
fn test_periodic_failures_do_not_stop_timer() {
    let mut event_loop = virtual_event_loop();
    let caught = Rc::new(RefCell::new(Vec::new()));
    let timer = run_zoned_guarded(
        || {
            Ok(Timer::periodic(Duration::from_millis(10), |timer| {
                Err(AsyncError::msg(format!("tick {}", timer.tick())))
            }))
        },
        collecting_handler(&caught),
    )
    .expect("body succeeded");

    event_loop.advance(Duration::from_millis(30)).unwrap();
    timer.cancel();
    assert_eq!(
        *caught.borrow(),
        vec!["Exception: tick 1", "Exception: tick 2", "Exception: tick 3"]
    );
}

/// Test: an error_callback rewrites errors at every entry point
#[test]
fn test_error_callback_applies_to_all_producers() {
    let mut event_loop = virtual_event_loop();
    let replaced = Rc::new(Cell::new(0));
    let count = replaced.clone();
    let spec = ZoneSpecification::new().with_error_callback(move |_, _, _, error| {
        count.set(count.get() + 1);
        Some(AsyncError::msg(format!("[{}]", error)))
    });
    let zone = Zone::current().fork(spec, ZoneValues::new());

    let completer = Completer::<i32>::new();
    let controller = StreamController::<i32>::new();
    let (from_value, from_completer, from_stream) = zone.run(|| {
        let from_value = Future::<i32>::error(AsyncError::msg("a"));
        completer.complete_error(AsyncError::msg("b")).unwrap();
        controller.add_error(AsyncError::msg("c")).unwrap();
        (from_value, completer.future(), controller.stream().first().unwrap())
    });
    for future in [&from_value, &from_completer, &from_stream] {
        future.ignore();
    }

    event_loop.run_until_done().unwrap();
    assert_eq!(replaced.get(), 3);
    for (future, original) in [(from_value, "a"), (from_completer, "b"), (from_stream, "c")] {
        assert_eq!(
            future.outcome().unwrap().unwrap_err().to_string(),
            format!("Exception: [Exception: {}]", original)
        );
    }
}

/// Test: uncaught root errors jump ahead of microtasks already queued
#[test]
fn test_uncaught_error_surfaces_before_queued_microtasks() {
    let mut event_loop = virtual_event_loop();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    schedule_microtask(move || {
        flag.set(true);
        Ok(())
    });
    Zone::root().handle_uncaught_error(AsyncError::msg("escaped"));

    let uncaught = event_loop.run_all_microtasks().unwrap_err();
    assert_eq!(uncaught.error.to_string(), "Exception: escaped");
    assert_eq!(
        uncaught.to_string(),
        "Uncaught error: Exception: escaped"
    );
    assert!(!ran.get());

    event_loop.run_all_microtasks().unwrap();
    assert!(ran.get());
}

/// Test: a zone's on_error handler that rethrows hands the error upward
#[test]
fn test_rethrow_reaches_root() {
    let mut event_loop = virtual_event_loop();
    let seen = Rc::new(Cell::new(0));
    let count = seen.clone();
    run_zoned(
        || {
            Future::<()>::error(AsyncError::msg("bubbling"));
        },
        ZoneOptions::new().with_on_error(OnError::unary(move |error: AsyncError| {
            count.set(count.get() + 1);
            Err(error)
        })),
    );

    let uncaught = event_loop.run_until_done().unwrap_err();
    assert_eq!(seen.get(), 1);
    assert_eq!(uncaught.error.to_string(), "Exception: bubbling");
}
