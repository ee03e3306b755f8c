//! Stream Pipeline Integration Tests
//!
//! Tests complete flows: Producer -> Transformations -> Broadcast -> Consumers,
//! driven by the event loop on the virtual clock.

use async_runtime::{
    BroadcastStreamController, EventSink, OnError, Stream, StreamController, StreamHandlers,
    StreamSubscription,
};
use core_types::{AsyncError, ErrorKind};
use integration_tests::virtual_event_loop;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

type Log = Rc<RefCell<Vec<String>>>;

fn record(stream: &Stream<i32>, name: &'static str, log: &Log) -> StreamSubscription<i32> {
    let (data, error, done) = (log.clone(), log.clone(), log.clone());
    stream
        .listen_with(
            StreamHandlers::new()
                .with_data(move |x| data.borrow_mut().push(format!("{} {}", name, x)))
                .with_error(OnError::unary(move |e: AsyncError| {
                    error.borrow_mut().push(format!("{} error {}", name, e));
                    Ok(())
                }))
                .with_done(move || done.borrow_mut().push(format!("{} done", name))),
        )
        .expect("listen failed")
}

/// Test: every early listener sees every event; a late one sees only later events
#[test]
fn test_broadcast_fan_out_and_late_listener() {
    let mut event_loop = virtual_event_loop();
    let controller = BroadcastStreamController::new();
    let stream = controller.stream();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    record(&stream, "a", &log);
    record(&stream, "b", &log);

    controller.add(1).unwrap();
    controller.add(2).unwrap();
    event_loop.run_until_done().unwrap();
    record(&stream, "late", &log);
    controller.add(3).unwrap();
    controller.close().unwrap();
    event_loop.run_until_done().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "a 1", "b 1", "a 2", "b 2", "a 3", "b 3", "late 3", "a done", "b done", "late done"
        ]
    );
}

/// Test: a transformed single-subscription source re-broadcast through add_stream
#[test]
fn test_transform_then_add_stream_into_broadcast() {
    let mut event_loop = virtual_event_loop();
    let source = StreamController::new();
    for x in 1..=6 {
        source.add(x).unwrap();
    }
    source.add_error(AsyncError::msg("odd one")).unwrap();
    source.close().unwrap();

    let hub = BroadcastStreamController::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    record(&hub.stream(), "x", &log);
    record(&hub.stream().map(|x| -x), "neg", &log);

    let transformed = source.stream().filter(|x| x % 2 == 0).map(|x| x * 10);
    let forwarded = hub.add_stream(&transformed, false).unwrap();
    assert!(hub.add(0).is_err());

    event_loop.run_until_done().unwrap();
    assert!(forwarded.is_complete());
    hub.close().unwrap();
    event_loop.run_until_done().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "x 20",
            "neg -20",
            "x 40",
            "neg -40",
            "x 60",
            "neg -60",
            "x error Exception: odd one",
            "neg error Exception: odd one",
            "x done",
            "neg done",
        ]
    );
}

/// Test: consumers over the same re-listenable source agree
#[test]
fn test_consumers_over_iterable_source() {
    let mut event_loop = virtual_event_loop();
    let stream = Stream::from_iter(vec![3, 1, 4, 1, 5, 9, 2, 6]);

    let sum = stream.fold(0, |a, b| Ok(a + b)).unwrap();
    let length = stream.length().unwrap();
    let first_big = stream.skip_while(|x| *x < 5).first().unwrap();
    let has_nine = stream.contains(9).unwrap();
    let distinct = Stream::from_iter(vec![1, 1, 2, 2, 2, 3]).distinct().to_list().unwrap();
    event_loop.run_until_done().unwrap();

    assert_eq!(sum.outcome().unwrap().unwrap(), 31);
    assert_eq!(length.outcome().unwrap().unwrap(), 8);
    assert_eq!(first_big.outcome().unwrap().unwrap(), 5);
    assert!(has_nine.outcome().unwrap().unwrap());
    assert_eq!(distinct.outcome().unwrap().unwrap(), vec![1, 2, 3]);
}

/// Test: a silent stream times out at 50ms; resuming restarts the window
#[test]
fn test_timeout_restarts_after_resume() {
    let mut event_loop = virtual_event_loop();
    let silent = StreamController::<i32>::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let subscription = silent
        .stream()
        .timeout(Duration::from_millis(50))
        .listen_with(StreamHandlers::new().with_error(OnError::unary(move |e: AsyncError| {
            sink.borrow_mut().push((e.kind().cloned(), e.to_string()));
            Ok(())
        })))
        .unwrap();

    event_loop.advance(Duration::from_millis(50)).unwrap();
    assert_eq!(
        *errors.borrow(),
        vec![(
            Some(ErrorKind::Timeout),
            "TimeoutException: after 50ms: No stream event".to_string()
        )]
    );

    subscription.pause();
    event_loop.advance(Duration::from_millis(30)).unwrap();
    subscription.resume();
    event_loop.advance(Duration::from_millis(49)).unwrap();
    assert_eq!(errors.borrow().len(), 1);
    event_loop.advance(Duration::from_millis(1)).unwrap();
    assert_eq!(errors.borrow().len(), 2);
    subscription.cancel();
}

/// Test: on_timeout may end the stream through the sink it is given
#[test]
fn test_periodic_source_with_timeout_fallback() {
    let mut event_loop = virtual_event_loop();
    let stream = Stream::periodic(Duration::from_millis(10), |n| n as i32)
        .take_while(|n| *n < 3)
        .timeout_with(Duration::from_millis(100), |sink: &dyn EventSink<i32>| {
            let _ = sink.close();
        });
    let collected = stream.to_list().unwrap();
    event_loop.run_until_done().unwrap();
    assert_eq!(collected.outcome().unwrap().unwrap(), vec![0, 1, 2]);
}

/// Test: pausing a pipeline buffers and replays events in order
#[test]
fn test_pause_buffers_through_pipeline() {
    let mut event_loop = virtual_event_loop();
    let source = StreamController::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let subscription = record(&source.stream().map(|x| x + 100), "p", &log);

    subscription.pause();
    subscription.pause();
    for x in 0..3 {
        source.add(x).unwrap();
    }
    event_loop.run_until_done().unwrap();
    subscription.resume();
    event_loop.run_until_done().unwrap();
    assert!(log.borrow().is_empty());
    assert!(subscription.is_paused());

    subscription.resume();
    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["p 100", "p 101", "p 102"]);
}
