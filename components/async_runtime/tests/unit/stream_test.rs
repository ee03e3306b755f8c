//! Unit tests for streams, subscriptions and controllers

use async_runtime::{
    BroadcastStreamController, ClockMode, Completer, EventLoop, Future, OnError, RuntimeConfig,
    Stream, StreamController, StreamHandlers, StreamSubscription,
};
use core_types::AsyncError;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

type Log = Rc<RefCell<Vec<String>>>;

fn event_loop() -> EventLoop {
    crate::init_logging();
    EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual))
}

fn logging_handlers(log: &Log, name: &'static str) -> StreamHandlers<i32> {
    let (data, error, done) = (log.clone(), log.clone(), log.clone());
    StreamHandlers::new()
        .with_data(move |x| data.borrow_mut().push(format!("{}:{}", name, x)))
        .with_error(OnError::unary(move |e: AsyncError| {
            error.borrow_mut().push(format!("{}:error {}", name, e));
            Ok(())
        }))
        .with_done(move || done.borrow_mut().push(format!("{}:done", name)))
}

#[test]
fn pause_needs_matching_resumes_and_keeps_order() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let subscription = controller.stream().listen_with(logging_handlers(&log, "s")).unwrap();

    for _ in 0..3 {
        subscription.pause();
    }
    for x in 1..=4 {
        controller.add(x).unwrap();
    }
    for _ in 0..2 {
        subscription.resume();
        event_loop.run_until_done().unwrap();
        assert!(log.borrow().is_empty());
    }
    subscription.resume();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["s:1", "s:2", "s:3", "s:4"]);
}

#[test]
fn extra_resume_is_harmless() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let subscription = controller.stream().listen_with(logging_handlers(&log, "s")).unwrap();
    subscription.resume();
    subscription.pause();
    controller.add(1).unwrap();
    event_loop.run_until_done().unwrap();
    assert!(log.borrow().is_empty());
    subscription.resume();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["s:1"]);
}

#[test]
fn cancel_suppresses_in_flight_events() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let subscription = controller.stream().listen_with(logging_handlers(&log, "s")).unwrap();
    controller.add(1).unwrap();
    controller.add(2).unwrap();
    controller.close().unwrap();
    let canceled = subscription.cancel();

    event_loop.run_until_done().unwrap();
    assert!(log.borrow().is_empty());
    assert!(canceled.is_complete());
    assert!(subscription.is_canceled());
}

#[test]
fn pause_until_resumes_when_future_completes() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let subscription = controller.stream().listen_with(logging_handlers(&log, "s")).unwrap();
    let gate = Completer::<()>::new();
    subscription.pause_until(&gate.future());
    controller.add(1).unwrap();

    event_loop.run_until_done().unwrap();
    assert!(log.borrow().is_empty());
    gate.complete(()).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["s:1"]);
}

#[test]
fn cancel_on_error_waits_for_async_cancel() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let cleanup = Completer::<()>::new();
    let cleanup_future = cleanup.future();
    let cleanup_log = log.clone();
    controller.set_on_cancel_async(move || {
        cleanup_log.borrow_mut().push("cleanup started".to_string());
        Some(cleanup_future.clone())
    });
    controller
        .stream()
        .listen_with(logging_handlers(&log, "s").with_cancel_on_error(true))
        .unwrap();

    controller.add_error(AsyncError::msg("fatal")).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["cleanup started"]);

    cleanup.complete(()).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["cleanup started", "s:error Exception: fatal"]);
}

#[test]
fn handled_errors_do_not_cancel_the_source() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let canceled = Rc::new(Cell::new(false));
    let flag = canceled.clone();
    controller.set_on_cancel(move || flag.set(true));
    controller
        .stream()
        .handle_error(|_| Ok(()))
        .listen_with(logging_handlers(&log, "x").with_cancel_on_error(true))
        .unwrap();

    controller.add(1).unwrap();
    controller.add_error(AsyncError::msg("swallowed")).unwrap();
    controller.add(2).unwrap();
    controller.close().unwrap();
    event_loop.run_until_done().unwrap();

    assert_eq!(*log.borrow(), vec!["x:1", "x:2", "x:done"]);
    assert!(!canceled.get(), "only done ends the source subscription");
}

#[test]
fn cancel_on_error_through_map_cancels_the_source() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let canceled = Rc::new(Cell::new(false));
    let flag = canceled.clone();
    controller.set_on_cancel(move || flag.set(true));
    controller
        .stream()
        .map(|x: i32| x * 10)
        .listen_with(logging_handlers(&log, "x").with_cancel_on_error(true))
        .unwrap();

    controller.add(1).unwrap();
    controller.add_error(AsyncError::msg("bad")).unwrap();
    controller.add(2).unwrap();
    event_loop.run_until_done().unwrap();

    assert_eq!(*log.borrow(), vec!["x:10", "x:error Exception: bad"]);
    assert!(canceled.get());
    assert!(!controller.has_listener());
}

#[test]
fn as_future_completes_at_done() {
    let mut event_loop = event_loop();
    let stream = Stream::from_iter(vec![1, 2, 3]);
    let subscription = stream.listen(|_| {}).unwrap();
    let finished = subscription.as_future("finished");

    event_loop.run_until_done().unwrap();
    assert_eq!(finished.outcome().unwrap().unwrap(), "finished");
}

#[test]
fn rebinding_handlers_after_listen() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = StreamController::new();
    let subscription = controller.stream().listen(|_| {}).unwrap();
    let sink = log.clone();
    subscription.on_data(move |x: i32| sink.borrow_mut().push(format!("rebound {}", x)));
    let sink = log.clone();
    subscription.on_done(move || sink.borrow_mut().push("rebound done".to_string()));

    controller.add(3).unwrap();
    controller.close().unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["rebound 3", "rebound done"]);
}

#[test]
fn broadcast_fan_out_in_subscription_order() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = BroadcastStreamController::new();
    controller.stream().listen_with(logging_handlers(&log, "a")).unwrap();
    controller.stream().listen_with(logging_handlers(&log, "b")).unwrap();
    controller.add(1).unwrap();
    controller.close().unwrap();

    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["a:1", "b:1", "a:done", "b:done"]);
    assert!(controller.done().is_complete());
}

#[test]
fn broadcast_listener_cancels_itself_while_firing() {
    let _event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = BroadcastStreamController::sync();
    let own: Rc<RefCell<Option<StreamSubscription<i32>>>> = Rc::default();

    let (sink, me) = (log.clone(), own.clone());
    let a = controller
        .stream()
        .listen(move |x| {
            sink.borrow_mut().push(format!("a:{}", x));
            if let Some(subscription) = me.borrow().as_ref() {
                subscription.cancel();
            }
        })
        .unwrap();
    *own.borrow_mut() = Some(a.clone());
    controller.stream().listen_with(logging_handlers(&log, "b")).unwrap();

    controller.add(1).unwrap();
    assert!(a.is_canceled());
    assert!(controller.has_listener());
    controller.add(2).unwrap();
    assert_eq!(*log.borrow(), vec!["a:1", "b:1", "b:2"]);
}

#[test]
fn broadcast_add_stream_forwards_to_all() {
    let mut event_loop = event_loop();
    let log: Log = Rc::default();
    let controller = BroadcastStreamController::new();
    controller.stream().listen_with(logging_handlers(&log, "a")).unwrap();
    controller.stream().listen_with(logging_handlers(&log, "b")).unwrap();

    let added = controller.add_stream(&Stream::from_iter(vec![7]), false).unwrap();
    assert!(controller.add(0).is_err());
    event_loop.run_until_done().unwrap();

    assert!(added.is_complete());
    assert_eq!(*log.borrow(), vec!["a:7", "b:7"]);
    controller.add(8).unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(log.borrow().len(), 4);
}

#[test]
fn transformed_broadcast_stays_broadcast() {
    let mut event_loop = event_loop();
    let controller = BroadcastStreamController::new();
    let doubled = controller.stream().map(|x: i32| x * 2);
    assert!(doubled.is_broadcast());
    let first = doubled.first().unwrap();
    let second = doubled.take(2).to_list().unwrap();

    for x in 1..=3 {
        controller.add(x).unwrap();
    }
    event_loop.run_until_done().unwrap();
    assert_eq!(first.outcome().unwrap().unwrap(), 2);
    assert_eq!(second.outcome().unwrap().unwrap(), vec![2, 4]);
}

#[test]
fn stream_timeout_on_silent_stream() {
    let mut event_loop = event_loop();
    let controller = StreamController::<i32>::new();
    let first = controller.stream().timeout(Duration::from_millis(50)).first().unwrap();
    first.ignore();

    event_loop.advance(Duration::from_millis(50)).unwrap();
    let error = first.outcome().unwrap().unwrap_err();
    assert!(error.to_string().starts_with("TimeoutException"));
    assert!(!controller.has_listener(), "the consumer canceled on the timeout error");
}

#[test]
fn periodic_stream_with_take() {
    let mut event_loop = event_loop();
    let ticks = Stream::periodic(Duration::from_millis(100), |n| n).take(3).to_list().unwrap();
    let finished = Rc::new(Cell::new(false));
    let flag = finished.clone();
    ticks.then(move |_| flag.set(true));

    event_loop.run_until_done().unwrap();
    assert!(finished.get());
    assert_eq!(ticks.outcome().unwrap().unwrap(), vec![0, 1, 2]);
    assert_eq!(event_loop.now(), Duration::from_millis(300));
}

#[test]
fn future_as_stream_round_trip() {
    let mut event_loop = event_loop();
    let last = Future::value(3).as_stream().last().unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(last.outcome().unwrap().unwrap(), 3);
}
