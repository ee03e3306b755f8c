//! Unit tests for EventLoop, tasks, microtasks and timers

use async_runtime::{
    schedule_microtask, ClockMode, EventLoop, MicroTask, RuntimeConfig, Task, Timer,
};
use core_types::{AsyncError, UncaughtError};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn virtual_loop() -> EventLoop {
    crate::init_logging();
    EventLoop::with_config(RuntimeConfig::new().with_clock(ClockMode::Virtual))
}

fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let push = move |entry: &'static str| {
        let sink = sink.clone();
        Box::new(move || sink.borrow_mut().push(entry)) as Box<dyn FnOnce()>
    };
    (log, push)
}

#[test]
fn new_event_loop_has_empty_queues() {
    let event_loop = EventLoop::new();
    assert!(event_loop.is_task_queue_empty());
    assert!(event_loop.is_microtask_queue_empty());
    assert_eq!(event_loop.pending_timers(), 0);
}

#[test]
fn task_queue_fifo_order() {
    let mut event_loop = EventLoop::new();
    let (log, push) = recorder();
    for entry in ["first", "second"] {
        let record = push(entry);
        event_loop.enqueue_task(Task::new(move || {
            record();
            Ok(())
        }));
    }

    event_loop.run_all_tasks().unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn microtasks_run_before_next_task() {
    let mut event_loop = EventLoop::new();
    let (log, push) = recorder();

    let (task_one, micro, task_two) = (push("task 1"), push("microtask"), push("task 2"));
    event_loop.enqueue_task(Task::new(move || {
        task_one();
        schedule_microtask(move || {
            micro();
            Ok(())
        });
        Ok(())
    }));
    event_loop.enqueue_task(Task::new(move || {
        task_two();
        Ok(())
    }));

    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["task 1", "microtask", "task 2"]);
}

#[test]
fn microtasks_run_before_timers() {
    let mut event_loop = virtual_loop();
    let (log, push) = recorder();
    let (timer, micro) = (push("timer"), push("microtask"));
    Timer::run(move || {
        timer();
        Ok(())
    });
    schedule_microtask(move || {
        micro();
        Ok(())
    });

    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["microtask", "timer"]);
}

#[test]
fn failing_host_microtask_surfaces_uncaught_error() {
    let mut event_loop = EventLoop::new();
    event_loop.enqueue_microtask(MicroTask::new(|| Err(UncaughtError::from(AsyncError::msg("bad")))));
    let error = event_loop.run_until_done().unwrap_err();
    assert_eq!(error.to_string(), "Uncaught error: Exception: bad");
}

#[test]
fn timers_fire_in_deadline_then_creation_order() {
    let mut event_loop = virtual_loop();
    let (log, push) = recorder();
    for (delay, entry) in [(20, "late"), (10, "early a"), (10, "early b")] {
        let record = push(entry);
        Timer::new(Duration::from_millis(delay), move || {
            record();
            Ok(())
        });
    }

    event_loop.run_until_done().unwrap();
    assert_eq!(*log.borrow(), vec!["early a", "early b", "late"]);
    assert_eq!(event_loop.now(), Duration::from_millis(20));
}

#[test]
fn canceled_timer_never_fires() {
    let mut event_loop = virtual_loop();
    let (log, push) = recorder();
    let record = push("fired");
    let timer = Timer::new(Duration::from_millis(5), move || {
        record();
        Ok(())
    });
    timer.cancel();
    timer.cancel();

    event_loop.run_until_done().unwrap();
    assert!(log.borrow().is_empty());
    assert!(!timer.is_active());
}

#[test]
fn periodic_timer_counts_ticks_until_canceled() {
    let mut event_loop = virtual_loop();
    let timer = Timer::periodic(Duration::from_millis(10), |timer| {
        if timer.tick() == 3 {
            timer.cancel();
        }
        Ok(())
    });

    event_loop.run_until_done().unwrap();
    assert_eq!(timer.tick(), 3);
    assert_eq!(event_loop.now(), Duration::from_millis(30));
}

#[test]
fn advance_only_fires_due_timers() {
    let mut event_loop = virtual_loop();
    let (log, push) = recorder();
    let (soon, later) = (push("soon"), push("later"));
    Timer::new(Duration::from_millis(10), move || {
        soon();
        Ok(())
    });
    Timer::new(Duration::from_millis(100), move || {
        later();
        Ok(())
    });

    event_loop.advance(Duration::from_millis(50)).unwrap();
    assert_eq!(*log.borrow(), vec!["soon"]);
    assert_eq!(event_loop.now(), Duration::from_millis(50));
    assert_eq!(event_loop.pending_timers(), 1);
}

#[test]
fn config_loads_from_json() {
    let config = RuntimeConfig::from_json(
        r#"{ "clock": "virtual", "capture_stack_traces": false, "log_uncaught_errors": false }"#,
    )
    .unwrap();
    assert_eq!(config.clock, ClockMode::Virtual);
    assert!(!config.capture_stack_traces);
    assert!(!config.log_uncaught_errors);

    let event_loop = EventLoop::with_config(config.clone());
    assert_eq!(event_loop.config(), &config);
}
