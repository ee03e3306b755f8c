//! Single-threaded cooperative async runtime.
//!
//! This crate provides three composable primitives driven by an event loop
//! on the current thread:
//! - [`Future`] - a single deferred result, completed exactly once
//! - [`Stream`] - a push-based sequence of data and error events ending in done
//! - [`Zone`] - a dynamically scoped context that intercepts scheduling,
//!   callback registration and error handling
//!
//! # Overview
//!
//! - [`EventLoop`] - Drains microtasks, runs host tasks and fires timers
//! - [`Completer`] - The producer side of a [`Future`]
//! - [`StreamController`] / [`BroadcastStreamController`] - The producer side of a [`Stream`]
//! - [`Timer`] - One-shot and periodic timers
//! - [`zone::run_zoned`] - Runs code in a forked zone
//!
//! Nothing runs concurrently: "asynchronous" means deferred to a later
//! microtask or timer on the same thread. Continuations never run inside
//! the call that registered them.
//!
//! # Examples
//!
//! ## Futures
//!
//! ```
//! use async_runtime::{Completer, EventLoop};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut event_loop = EventLoop::new();
//! let completer = Completer::new();
//! let total = Rc::new(Cell::new(0));
//! let sink = total.clone();
//! completer.future().then(move |x: i32| sink.set(x * 2));
//!
//! completer.complete(21).unwrap();
//! assert!(completer.complete(0).is_err());
//! event_loop.run_until_done().unwrap();
//! assert_eq!(total.get(), 42);
//! ```
//!
//! ## Zones
//!
//! ```
//! use async_runtime::zone::{run_zoned_guarded, OnError};
//! use async_runtime::{EventLoop, Future};
//! use core_types::AsyncError;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut event_loop = EventLoop::new();
//! let caught = Rc::new(RefCell::new(Vec::new()));
//! let sink = caught.clone();
//! run_zoned_guarded(
//!     || {
//!         Future::<i32>::error(AsyncError::msg("lost"));
//!         Ok(())
//!     },
//!     OnError::unary(move |error: AsyncError| {
//!         sink.borrow_mut().push(error.to_string());
//!         Ok(())
//!     }),
//! );
//!
//! event_loop.run_until_done().unwrap();
//! assert_eq!(*caught.borrow(), vec!["Exception: lost"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod event_loop;
pub mod future;
mod scheduler;
pub mod stream;
pub mod task_queue;
pub mod timer;
pub mod zone;

// Re-export main types at crate root
pub use clock::Clock;
pub use config::{ClockMode, RuntimeConfig};
pub use event_loop::EventLoop;
pub use future::{Completer, Future, FutureOr, Thenable};
pub use stream::{
    BroadcastStreamController, EventSink, Stream, StreamController, StreamHandlers, StreamSubscription,
};
pub use task_queue::{MicroTask, MicrotaskQueue, Task, TaskQueue};
pub use timer::Timer;
pub use zone::{
    run_zoned, run_zoned_guarded, OnError, Zone, ZoneDelegate, ZoneKey, ZoneOptions, ZoneSpecification,
    ZoneValues,
};

use core_types::AsyncError;

/// Schedules `f` as a microtask in the current zone.
///
/// # Examples
///
/// ```
/// use async_runtime::{schedule_microtask, EventLoop};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let mut event_loop = EventLoop::new();
/// let ran = Rc::new(Cell::new(false));
/// let flag = ran.clone();
/// schedule_microtask(move || {
///     flag.set(true);
///     Ok(())
/// });
/// assert!(!ran.get());
/// event_loop.run_all_microtasks().unwrap();
/// assert!(ran.get());
/// ```
pub fn schedule_microtask(f: impl FnOnce() -> Result<(), AsyncError> + 'static) {
    Zone::current().schedule_microtask(f);
}
