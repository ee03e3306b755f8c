//! Iterative teardown of pending futures.
//!
//! A pending future owns its listeners, each listener owns the future it
//! completes, and that future owns its own listeners. Dropping the head of
//! a chain that never completed would otherwise recurse once per link.
//! Instead every future hands its listeners to a per-thread queue and the
//! outermost drop drains it in a loop.

use super::FutureState;
use std::any::Any;
use std::cell::{Cell, RefCell};

thread_local! {
    static RELEASED: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Releases what a dropped future's state still holds.
///
/// Stored as a function pointer on each future so that the `Drop` impl,
/// which cannot carry bounds, reaches the `'static` erasure.
pub(super) fn release_state<T: 'static>(state: FutureState<T>) {
    let held: Box<dyn Any> = match state {
        FutureState::Incomplete(listeners) | FutureState::PendingComplete(listeners) => {
            if listeners.is_empty() {
                return;
            }
            Box::new(listeners)
        }
        FutureState::Chained(target) => Box::new(target),
        FutureState::Value(_) | FutureState::Error(_) => return,
    };
    defer(held);
}

fn defer(held: Box<dyn Any>) {
    // During thread teardown the queue may be gone; `held` then drops in place.
    let _ = RELEASED.try_with(move |released| released.borrow_mut().push(held));

    let already_draining = DRAINING.try_with(|draining| draining.replace(true)).unwrap_or(true);
    if already_draining {
        return;
    }
    while let Some(next) = RELEASED
        .try_with(|released| released.borrow_mut().pop())
        .ok()
        .flatten()
    {
        drop(next);
    }
    let _ = DRAINING.try_with(|draining| draining.set(false));
}
