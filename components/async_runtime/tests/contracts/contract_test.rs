//! Contract tests for async_runtime component
//!
//! These tests verify the signatures and observable guarantees of the
//! public API: producers report protocol errors as values, consumers get
//! futures, and every continuation is deferred.

use async_runtime::{
    BroadcastStreamController, ClockMode, Completer, EventLoop, EventSink, Future, MicroTask,
    MicrotaskQueue, OnError, RuntimeConfig, Stream, StreamController, StreamHandlers,
    StreamSubscription, Task, TaskQueue, Timer, Zone, ZoneOptions, ZoneSpecification, ZoneValues,
};
use core_types::{AsyncError, ErrorKind, RuntimeError, UncaughtError};
use std::time::Duration;

mod event_loop_contract {
    use super::*;

    #[test]
    fn event_loop_new_returns_self() {
        let event_loop = EventLoop::new();
        assert!(event_loop.is_task_queue_empty());
        assert!(event_loop.is_microtask_queue_empty());
    }

    #[test]
    fn event_loop_enqueue_task_accepts_task() {
        let mut event_loop = EventLoop::new();
        event_loop.enqueue_task(Task::new(|| Ok(())));
        assert!(!event_loop.is_task_queue_empty());
    }

    #[test]
    fn event_loop_enqueue_microtask_accepts_microtask() {
        let mut event_loop = EventLoop::new();
        event_loop.enqueue_microtask(MicroTask::new(|| Ok(())));
        assert!(!event_loop.is_microtask_queue_empty());
    }

    #[test]
    fn run_until_done_reports_uncaught_error() {
        let mut event_loop = EventLoop::new();
        event_loop.enqueue_task(Task::new(|| Err(AsyncError::msg("host"))));
        let result: Result<(), UncaughtError> = event_loop.run_until_done();
        assert!(result.is_err());
    }

    #[test]
    fn config_exposes_clock_mode() {
        let event_loop = EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual));
        assert_eq!(event_loop.config().clock, ClockMode::Virtual);
        assert_eq!(event_loop.now(), Duration::ZERO);
    }
}

mod queue_contract {
    use super::*;

    #[test]
    fn task_queue_is_fifo() {
        let mut queue = TaskQueue::new();
        queue.enqueue(Task::new(|| Ok(())));
        queue.enqueue(Task::new(|| Err(AsyncError::msg("second"))));
        assert_eq!(queue.len(), 2);
        assert!(queue.dequeue().unwrap().run().is_ok());
        assert!(queue.dequeue().unwrap().run().is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn microtask_queue_runs_priority_first() {
        let mut queue = MicrotaskQueue::new();
        queue.enqueue(MicroTask::new(|| Ok(())));
        queue.enqueue_priority(MicroTask::new(|| Err(UncaughtError::from(AsyncError::msg("first")))));
        assert!(queue.dequeue().unwrap().run().is_err());
        assert!(queue.dequeue().unwrap().run().is_ok());
        assert!(queue.dequeue().is_none());
    }
}

mod future_contract {
    use super::*;

    #[test]
    fn completer_rejects_second_completion() {
        let _event_loop = EventLoop::new();
        let completer = Completer::new();
        assert!(!completer.is_completed());
        assert!(completer.complete(1).is_ok());
        let error: RuntimeError = completer.complete(2).unwrap_err();
        assert_eq!(error.kind, ErrorKind::StateError);
        assert!(completer.is_completed());
    }

    #[test]
    fn future_value_is_not_complete_synchronously() {
        let mut event_loop = EventLoop::new();
        let future = Future::value(3);
        assert!(future.outcome().is_none());
        event_loop.run_until_done().unwrap();
        assert_eq!(future.outcome().unwrap().unwrap(), 3);
    }

    #[test]
    fn then_returns_future_of_mapped_type() {
        let mut event_loop = EventLoop::new();
        let mapped: Future<String> = Future::value(3).then(|x| x.to_string());
        event_loop.run_until_done().unwrap();
        assert_eq!(mapped.outcome().unwrap().unwrap(), "3");
    }

    #[test]
    fn handled_error_is_not_uncaught() {
        let mut event_loop = EventLoop::new();
        let recovered = Future::<i32>::error(AsyncError::msg("no")).catch_error(|_| Ok(0));
        event_loop.run_until_done().unwrap();
        assert_eq!(recovered.outcome().unwrap().unwrap(), 0);
    }
}

mod stream_contract {
    use super::*;

    #[test]
    fn controller_implements_event_sink() {
        fn sink<T>(_: &dyn EventSink<T>) {}
        let _event_loop = EventLoop::new();
        sink(&StreamController::<i32>::new());
        sink(&BroadcastStreamController::<i32>::new());
    }

    #[test]
    fn add_after_close_is_state_error() {
        let _event_loop = EventLoop::new();
        let controller = StreamController::new();
        controller.close().unwrap();
        assert_eq!(controller.add(1).unwrap_err().kind, ErrorKind::StateError);
    }

    #[test]
    fn single_subscription_stream_rejects_second_listener() {
        let _event_loop = EventLoop::new();
        let controller = StreamController::<i32>::new();
        let stream: Stream<i32> = controller.stream();
        let _first: StreamSubscription<i32> = stream.listen(|_| {}).unwrap();
        assert_eq!(stream.listen(|_| {}).unwrap_err().kind, ErrorKind::StateError);
    }

    #[test]
    fn broadcast_stream_accepts_many_listeners() {
        let _event_loop = EventLoop::new();
        let controller = BroadcastStreamController::<i32>::new();
        let stream = controller.stream();
        assert!(stream.is_broadcast());
        stream.listen(|_| {}).unwrap();
        stream.listen_with(StreamHandlers::new()).unwrap();
        assert!(controller.has_listener());
    }

    #[test]
    fn cancel_returns_future() {
        let mut event_loop = EventLoop::new();
        let controller = StreamController::<i32>::new();
        let subscription = controller.stream().listen(|_| {}).unwrap();
        let canceled: Future<()> = subscription.cancel();
        event_loop.run_until_done().unwrap();
        assert!(canceled.is_complete());
        assert!(subscription.is_canceled());
    }
}

mod timer_contract {
    use super::*;

    #[test]
    fn timer_cancel_makes_inactive() {
        let _event_loop = EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual));
        let timer = Timer::new(Duration::from_millis(5), || Ok(()));
        assert!(timer.is_active());
        timer.cancel();
        assert!(!timer.is_active());
        assert_eq!(timer.tick(), 0);
    }
}

mod zone_contract {
    use super::*;

    #[test]
    fn root_zone_is_current_outside_runs() {
        let _event_loop = EventLoop::new();
        assert_eq!(Zone::current(), Zone::root());
        assert!(Zone::root().parent().is_none());
    }

    #[test]
    fn fork_creates_child() {
        let _event_loop = EventLoop::new();
        let child = Zone::root().fork(ZoneSpecification::new(), ZoneValues::new());
        assert_eq!(child.parent(), Some(Zone::root()));
        assert!(child.in_same_error_zone(&Zone::root()));
        assert_eq!(child.run(Zone::current), child);
    }

    #[test]
    fn on_error_creates_new_error_zone() {
        let _event_loop = EventLoop::new();
        let zone = async_runtime::run_zoned(
            Zone::current,
            ZoneOptions::new().with_on_error(OnError::unary(|_: AsyncError| Ok(()))),
        );
        assert!(!zone.in_same_error_zone(&Zone::root()));
        assert_eq!(zone.error_zone(), zone);
    }
}
