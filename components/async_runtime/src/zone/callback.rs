//! Type-erased callbacks and error handlers.
//!
//! Zones intercept callback registration without knowing the callback's
//! argument or result types. A callback is erased into an [`ErasedCallback`]
//! that reads its arguments from, and writes its result into, a call slot
//! passed as `&mut dyn Any`. Wrappers installed by a zone receive the slot
//! and forward it to the callback they wrap.

use super::specification::ZoneCallback;
use super::Zone;
use core_types::{AsyncError, StackTrace};
use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// A registered callback with its argument and result types erased.
///
/// A zone's registration handler may return the callback unchanged or a
/// wrapper that forwards the slot to it:
///
/// ```
/// use async_runtime::zone::ErasedCallback;
/// use async_runtime::{EventLoop, Zone, ZoneSpecification, ZoneValues};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let _event_loop = EventLoop::new();
/// let calls = Rc::new(Cell::new(0));
/// let counter = calls.clone();
/// let spec = ZoneSpecification::new().with_register_unary_callback(move |_, parent, zone, callback| {
///     let inner = parent.register_unary_callback(zone, callback);
///     let counter = counter.clone();
///     let wrapped: ErasedCallback = Rc::new(move |slot| {
///         counter.set(counter.get() + 1);
///         inner(slot)
///     });
///     wrapped
/// });
///
/// let zone = Zone::current().fork(spec, ZoneValues::new());
/// let double = zone.register_unary_callback(|x: i32| x * 2);
/// assert_eq!(double(21), 42);
/// assert_eq!(calls.get(), 1);
/// ```
///
/// A wrapper that returns without forwarding the slot cannot suppress the
/// call: the result type has no default to stand in for the callback's
/// result, so the original callback still runs, unwrapped, and the
/// fallback is logged at `debug`.
pub type ErasedCallback = Rc<dyn Fn(&mut dyn Any)>;

struct CallSlot<Args, R> {
    args: Option<Args>,
    result: Option<R>,
}

fn erase<Args: 'static, R: 'static>(callback: Rc<dyn Fn(Args) -> R>) -> ErasedCallback {
    Rc::new(move |slot: &mut dyn Any| {
        if let Some(slot) = slot.downcast_mut::<CallSlot<Args, R>>() {
            if let Some(args) = slot.args.take() {
                slot.result = Some(callback(args));
            }
        }
    })
}

fn call_erased<Args: 'static, R: 'static>(
    wrapped: &ErasedCallback,
    original: &Rc<dyn Fn(Args) -> R>,
    args: Args,
) -> R {
    let mut slot = CallSlot {
        args: Some(args),
        result: None,
    };
    wrapped(&mut slot);
    match (slot.result, slot.args) {
        (Some(result), _) => result,
        (None, Some(args)) => {
            log::debug!("registered callback wrapper did not forward the call; running the callback directly");
            original(args)
        }
        (None, None) => unreachable!("callback consumed its arguments without a result"),
    }
}

/// Passes `original` through a registration hook and returns the callable
/// that results. When the hook returns the callback unchanged, so does this.
pub(crate) fn register_with<Args, R, H>(original: Rc<dyn Fn(Args) -> R>, hook: H) -> Rc<dyn Fn(Args) -> R>
where
    Args: 'static,
    R: 'static,
    H: FnOnce(ErasedCallback) -> ErasedCallback,
{
    let erased = erase(original.clone());
    let wrapped = hook(erased.clone());
    if Rc::ptr_eq(&wrapped, &erased) {
        return original;
    }
    Rc::new(move |args| call_erased(&wrapped, &original, args))
}

/// Adapts a one-shot callback to the `Fn` shape registration expects. Calls
/// after the first do nothing.
pub(crate) fn once_callback(callback: ZoneCallback) -> impl Fn() -> Result<(), AsyncError> {
    let slot = RefCell::new(Some(callback));
    move || {
        let callback = slot.borrow_mut().take();
        match callback {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }
}

/// An error handler taking either the error alone or the error object and
/// its stack trace separately.
pub enum OnError<R> {
    /// Receives the error with its stack trace attached
    Unary(Rc<dyn Fn(AsyncError) -> R>),
    /// Receives the error object and the stack trace as two arguments
    Binary(Rc<dyn Fn(Rc<dyn StdError>, StackTrace) -> R>),
}

impl<R: 'static> OnError<R> {
    /// A handler taking the whole [`AsyncError`].
    pub fn unary<F>(handler: F) -> Self
    where
        F: Fn(AsyncError) -> R + 'static,
    {
        OnError::Unary(Rc::new(handler))
    }

    /// A handler taking the error object and stack trace separately.
    pub fn binary<F>(handler: F) -> Self
    where
        F: Fn(Rc<dyn StdError>, StackTrace) -> R + 'static,
    {
        OnError::Binary(Rc::new(handler))
    }

    /// Invokes the handler directly, outside any zone.
    pub fn call(&self, error: AsyncError) -> R {
        match self {
            OnError::Unary(handler) => handler(error),
            OnError::Binary(handler) => {
                handler(error.error().clone(), error.stack_trace().clone())
            }
        }
    }

    /// Registers the handler in `zone` with the registration matching its
    /// arity.
    pub(crate) fn register_in(&self, zone: &Zone) -> Self {
        match self {
            OnError::Unary(handler) => {
                let handler = handler.clone();
                OnError::Unary(zone.register_unary_callback(move |error: AsyncError| {
                    handler(error)
                }))
            }
            OnError::Binary(handler) => {
                let handler = handler.clone();
                OnError::Binary(zone.register_binary_callback(
                    move |error: Rc<dyn StdError>, trace: StackTrace| handler(error, trace),
                ))
            }
        }
    }

    /// Runs the handler in `zone` through `run_unary` or `run_binary`.
    pub(crate) fn run_in(&self, zone: &Zone, error: AsyncError) -> R {
        match self {
            OnError::Unary(handler) => zone.run_unary(|error| handler(error), error),
            OnError::Binary(handler) => zone.run_binary(
                |error, trace| handler(error, trace),
                error.error().clone(),
                error.stack_trace().clone(),
            ),
        }
    }
}

impl<R> Clone for OnError<R> {
    fn clone(&self) -> Self {
        match self {
            OnError::Unary(handler) => OnError::Unary(handler.clone()),
            OnError::Binary(handler) => OnError::Binary(handler.clone()),
        }
    }
}

impl<R> fmt::Debug for OnError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnError::Unary(_) => f.write_str("OnError::Unary"),
            OnError::Binary(_) => f.write_str("OnError::Binary"),
        }
    }
}
