//! Future Chain Integration Tests
//!
//! Tests futures together with completers, timers and the event loop:
//! deferred continuations, deep chains and timer races.

use async_runtime::{
    run_zoned, Completer, Future, FutureOr, OnError, Zone, ZoneOptions, ZoneSpecification,
};
use core_types::{AsyncError, ErrorKind};
use integration_tests::virtual_event_loop;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Test: `value(1).then(+1).then(print)` prints 2 after the caller returns
#[test]
fn test_then_chain_prints_after_stack_unwinds() {
    let mut event_loop = virtual_event_loop();
    let printed = Rc::new(RefCell::new(Vec::new()));
    let sink = printed.clone();
    let spec = ZoneSpecification::new().with_print(move |_, _, _, line| sink.borrow_mut().push(line.to_string()));

    run_zoned(
        || {
            Future::value(1)
                .then(|v| v + 1)
                .then(|v| Zone::current().print(&v.to_string()));
        },
        ZoneOptions::new().with_specification(spec),
    );
    assert!(printed.borrow().is_empty());

    event_loop.run_until_done().unwrap();
    assert_eq!(*printed.borrow(), vec!["2"]);
}

/// Test: a long chain of completers resolves to the innermost value
#[test]
fn test_deep_completer_chain_resolves() {
    let mut event_loop = virtual_event_loop();
    let innermost = Completer::new();
    let mut tail = innermost.future();
    for _ in 0..50_000 {
        let completer = Completer::new();
        completer.complete_future(tail).unwrap();
        tail = completer.future();
    }

    innermost.complete(7).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(tail.outcome().unwrap().unwrap(), 7);
}

/// Test: an error travels the same chain unchanged
#[test]
fn test_deep_chain_carries_error() {
    let mut event_loop = virtual_event_loop();
    let innermost = Completer::<i32>::new();
    let mut tail = innermost.future();
    for _ in 0..1_000 {
        tail = tail.and_then(Future::value);
    }
    let recovered = tail.catch_error(|error| {
        assert_eq!(error.to_string(), "Exception: deep");
        Ok(-1)
    });

    innermost.complete_error(AsyncError::msg("deep")).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(recovered.outcome().unwrap().unwrap(), -1);
}

/// Test: the earliest timer wins `any`, and `wait` keeps input order
#[test]
fn test_timer_races() {
    let mut event_loop = virtual_event_loop();
    let delayed = |ms: u64, value: i32| {
        Future::delayed(Duration::from_millis(ms), move || Ok(FutureOr::Value(value)))
    };

    let first = Future::any(vec![delayed(30, 3), delayed(10, 1), delayed(20, 2)]);
    let all = Future::wait(vec![delayed(30, 3), delayed(10, 1), delayed(20, 2)], false);
    event_loop.run_until_done().unwrap();

    assert_eq!(first.outcome().unwrap().unwrap(), 1);
    assert_eq!(all.outcome().unwrap().unwrap(), vec![3, 1, 2]);
    assert_eq!(event_loop.now(), Duration::from_millis(30));
}

/// Test: a timeout fails a slow future and leaves a fast one alone
#[test]
fn test_timeout_race() {
    let mut event_loop = virtual_event_loop();
    let slow = Future::delayed(Duration::from_millis(100), || Ok(FutureOr::Value("slow")));
    let fast = Future::delayed(Duration::from_millis(5), || Ok(FutureOr::Value("fast")));

    let timed_out = slow.timeout(Duration::from_millis(20));
    timed_out.ignore();
    let in_time = fast.timeout(Duration::from_millis(20));
    event_loop.run_until_done().unwrap();

    let error = timed_out.outcome().unwrap().unwrap_err();
    assert_eq!(error.kind(), Some(&ErrorKind::Timeout));
    assert_eq!(in_time.outcome().unwrap().unwrap(), "fast");
}

/// Test: a binary error handler receives the error and trace separately
#[test]
fn test_binary_handler_in_chain() {
    let mut event_loop = virtual_event_loop();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    let recovered = Future::<String>::error(AsyncError::msg("split")).then_with(
        |value| Ok(FutureOr::Value(value)),
        Some(OnError::binary(move |error, _trace| {
            *sink.borrow_mut() = Some(error.to_string());
            Ok(FutureOr::Value("recovered".to_string()))
        })),
    );

    event_loop.run_until_done().unwrap();
    assert_eq!(recovered.outcome().unwrap().unwrap(), "recovered");
    assert_eq!(seen.borrow().as_deref(), Some("Exception: split"));
}

/// Test: `when_complete` waits for the future it returns
#[test]
fn test_when_complete_waits_for_cleanup() {
    let mut event_loop = virtual_event_loop();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (cleanup_log, value_log) = (log.clone(), log.clone());
    let done = Future::value(5)
        .when_complete_with(move || {
            let cleanup_log = cleanup_log.clone();
            Ok(FutureOr::Future(Future::delayed(Duration::from_millis(10), move || {
                cleanup_log.borrow_mut().push("cleanup".to_string());
                Ok(FutureOr::Value(()))
            })))
        })
        .then(move |v| value_log.borrow_mut().push(format!("value {}", v)));

    event_loop.run_until_done().unwrap();
    assert!(done.is_complete());
    assert_eq!(*log.borrow(), vec!["cleanup", "value 5"]);
}
