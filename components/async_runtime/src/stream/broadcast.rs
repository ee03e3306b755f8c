//! Broadcast stream controllers.
//!
//! Subscribers live in an arena of nodes linked into a circular list
//! through a sentinel head node. A firing pass visits each node at most
//! once: nodes carry an event id bit that flips when they are visited, and
//! the controller flips its own bit at the start of each pass, so a node
//! linked during a pass waits for the next one. A node canceled while its
//! own handler runs is only marked, and unlinked once the pass has moved
//! past it.

use super::add_stream::{AddStreamState, AddStreamTarget};
use super::pending::StreamEvent;
use super::subscription::{SubscriptionCore, SubscriptionHooks};
use super::{done_subscription, EventSink, Stream, StreamHandlers, StreamSource, StreamSubscription};
use crate::future::Future;
use crate::zone::Zone;
use core_types::{AsyncError, RuntimeError};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

const HEAD: usize = 0;

/// Identifies a node; the generation tells a reused slot apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubscriberId {
    index: usize,
    generation: u64,
}

struct SubscriberNode<T> {
    core: Option<Rc<SubscriptionCore<T>>>,
    generation: u64,
    next: usize,
    prev: usize,
    event_id: bool,
    firing: bool,
    remove_after_firing: bool,
}

impl<T> SubscriberNode<T> {
    fn unlinked(index: usize) -> Self {
        Self {
            core: None,
            generation: 0,
            next: index,
            prev: index,
            event_id: false,
            firing: false,
            remove_after_firing: false,
        }
    }
}

/// Circular doubly linked list of subscribers stored in a vector.
struct SubscriberList<T> {
    nodes: Vec<SubscriberNode<T>>,
    free: Vec<usize>,
}

impl<T> SubscriberList<T> {
    fn new() -> Self {
        Self {
            nodes: vec![SubscriberNode::unlinked(HEAD)],
            free: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.nodes[HEAD].next == HEAD
    }

    fn has_one(&self) -> bool {
        !self.is_empty() && self.nodes[HEAD].next == self.nodes[HEAD].prev
    }

    fn first(&self) -> usize {
        self.nodes[HEAD].next
    }

    /// Links `core` at the end of the list.
    fn push_back(&mut self, core: Rc<SubscriptionCore<T>>, event_id: bool) -> SubscriberId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(SubscriberNode::unlinked(self.nodes.len()));
                self.nodes.len() - 1
            }
        };
        let last = self.nodes[HEAD].prev;
        let node = &mut self.nodes[index];
        node.core = Some(core);
        node.event_id = event_id;
        node.firing = false;
        node.remove_after_firing = false;
        node.prev = last;
        node.next = HEAD;
        let generation = node.generation;
        self.nodes[last].next = index;
        self.nodes[HEAD].prev = index;
        SubscriberId { index, generation }
    }

    /// The linked node `id` refers to, if it is still linked.
    fn get_mut(&mut self, id: SubscriberId) -> Option<&mut SubscriberNode<T>> {
        self.nodes
            .get_mut(id.index)
            .filter(|node| node.generation == id.generation && node.core.is_some())
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        let node = &mut self.nodes[index];
        node.core = None;
        node.next = index;
        node.prev = index;
        node.generation += 1;
        self.free.push(index);
    }

    /// Every linked subscription, in list order.
    fn cores(&self) -> Vec<Rc<SubscriptionCore<T>>> {
        let mut cores = Vec::new();
        let mut cursor = self.first();
        while cursor != HEAD {
            if let Some(core) = &self.nodes[cursor].core {
                cores.push(core.clone());
            }
            cursor = self.nodes[cursor].next;
        }
        cores
    }
}

struct BroadcastState<T> {
    subscribers: SubscriberList<T>,
    event_id: bool,
    firing: bool,
    closed: bool,
    add_stream: Option<Rc<AddStreamState<T>>>,
}

#[derive(Default)]
struct BroadcastHooks {
    on_listen: Option<Rc<dyn Fn()>>,
    on_cancel: Option<Rc<dyn Fn()>>,
}

pub(crate) struct BroadcastInner<T> {
    sync: bool,
    state: RefCell<BroadcastState<T>>,
    hooks: RefCell<BroadcastHooks>,
    done: RefCell<Option<Future<()>>>,
}

/// The producer side of a broadcast [`Stream`].
///
/// Any number of listeners may subscribe; each receives the events added
/// after it subscribed, in order. `on_listen` runs when the first listener
/// arrives and `on_cancel` when the last one leaves. Listening after close
/// yields a subscription that only receives done.
///
/// # Examples
///
/// ```
/// use async_runtime::{BroadcastStreamController, EventLoop};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let mut event_loop = EventLoop::new();
/// let controller = BroadcastStreamController::sync();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// for name in ["a", "b"] {
///     let sink = seen.clone();
///     controller
///         .stream()
///         .listen(move |x: i32| sink.borrow_mut().push(format!("{}{}", name, x)))
///         .unwrap();
/// }
///
/// controller.add(1).unwrap();
/// event_loop.run_until_done().unwrap();
/// assert_eq!(*seen.borrow(), vec!["a1", "b1"]);
/// ```
pub struct BroadcastStreamController<T> {
    inner: Rc<BroadcastInner<T>>,
}

impl<T> Clone for BroadcastStreamController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for BroadcastStreamController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("BroadcastStreamController")
            .field("sync", &self.inner.sync)
            .field("has_listener", &!state.subscribers.is_empty())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: Clone + 'static> BroadcastStreamController<T> {
    /// A controller that queues every event through each subscriber.
    pub fn new() -> Self {
        Self::with_sync(false)
    }

    /// A controller that delivers events during `add` where it can.
    pub fn sync() -> Self {
        Self::with_sync(true)
    }

    fn with_sync(sync: bool) -> Self {
        Self {
            inner: Rc::new(BroadcastInner {
                sync,
                state: RefCell::new(BroadcastState {
                    subscribers: SubscriberList::new(),
                    event_id: false,
                    firing: false,
                    closed: false,
                    add_stream: None,
                }),
                hooks: RefCell::new(BroadcastHooks::default()),
                done: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<BroadcastInner<T>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<BroadcastInner<T>>) -> Self {
        Self { inner }
    }

    /// The controlled stream.
    pub fn stream(&self) -> Stream<T> {
        Stream::from_source(BroadcastStream {
            controller: self.inner.clone(),
        })
    }

    /// Called when the first listener subscribes.
    pub fn set_on_listen(&self, hook: impl Fn() + 'static) {
        self.inner.hooks.borrow_mut().on_listen = Some(Rc::new(hook));
    }

    /// Called when the last listener leaves.
    pub fn set_on_cancel(&self, hook: impl Fn() + 'static) {
        self.inner.hooks.borrow_mut().on_cancel = Some(Rc::new(hook));
    }

    /// Returns true while at least one listener is subscribed.
    pub fn has_listener(&self) -> bool {
        !self.inner.state.borrow().subscribers.is_empty()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }

    /// Broadcast listeners cannot pause the producer.
    pub fn is_paused(&self) -> bool {
        false
    }

    /// Completes once the controller is closed and every listener is gone.
    pub fn done(&self) -> Future<()> {
        self.inner.done_future()
    }

    /// Sends a data event to every current listener.
    ///
    /// A synchronous controller fails with a `StateError` when called from
    /// inside one of its own multi-listener deliveries.
    pub fn add(&self, value: T) -> Result<(), RuntimeError> {
        self.inner.check_may_add()?;
        self.inner.send(StreamEvent::Data(value))
    }

    /// Sends an error event to every current listener.
    pub fn add_error(&self, error: AsyncError) -> Result<(), RuntimeError> {
        self.inner.check_may_add()?;
        let error = Zone::current().replace_error(error);
        self.inner.send(StreamEvent::Error(error))
    }

    /// Sends done to every current listener and closes the controller.
    pub fn close(&self) -> Result<Future<()>, RuntimeError> {
        if self.is_closed() {
            return Ok(self.done());
        }
        self.inner.check_may_add()?;
        self.inner.state.borrow_mut().closed = true;
        let done = self.done();
        self.inner.send(StreamEvent::Done)?;
        Ok(done)
    }

    /// Forwards all events of `source` to every listener until it is done.
    pub fn add_stream(&self, source: &Stream<T>, cancel_on_error: bool) -> Result<Future<()>, RuntimeError> {
        self.inner.check_may_add()?;
        let target: Rc<dyn AddStreamTarget<T>> = self.inner.clone();
        let add_stream = Rc::new(AddStreamState::start(target, source, cancel_on_error)?);
        let future = add_stream.future();
        self.inner.state.borrow_mut().add_stream = Some(add_stream);
        Ok(future)
    }
}

impl<T: Clone + 'static> Default for BroadcastStreamController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> EventSink<T> for BroadcastStreamController<T> {
    fn add(&self, value: T) -> Result<(), RuntimeError> {
        BroadcastStreamController::add(self, value)
    }

    fn add_error(&self, error: AsyncError) -> Result<(), RuntimeError> {
        BroadcastStreamController::add_error(self, error)
    }

    fn close(&self) -> Result<Future<()>, RuntimeError> {
        BroadcastStreamController::close(self)
    }
}

impl<T: Clone + 'static> BroadcastInner<T> {
    fn check_may_add(&self) -> Result<(), RuntimeError> {
        let state = self.state.borrow();
        if state.closed {
            Err(RuntimeError::state("Cannot add new events after calling close"))
        } else if state.add_stream.is_some() {
            Err(RuntimeError::state("Cannot add new events while doing an addStream"))
        } else {
            Ok(())
        }
    }

    fn done_future(&self) -> Future<()> {
        self.done.borrow_mut().get_or_insert_with(Future::pending).clone()
    }

    fn complete_done(&self) {
        let done = self.done.borrow().clone();
        if let Some(done) = done {
            if done.may_complete() {
                done.complete_async(Ok(()));
            }
        }
    }

    fn subscribe(self: &Rc<Self>, handlers: StreamHandlers<T>) -> StreamSubscription<T> {
        if self.state.borrow().closed {
            return done_subscription(handlers);
        }
        let core = SubscriptionCore::new(handlers);
        let (id, first) = {
            let mut state = self.state.borrow_mut();
            let event_id = state.event_id;
            let id = state.subscribers.push_back(core.clone(), event_id);
            (id, state.subscribers.has_one())
        };
        core.set_hooks(Rc::new(BroadcastSubscriptionHooks {
            controller: self.clone(),
            id,
        }));
        log::debug!("broadcast listener {} subscribed", id.index);
        if first {
            let on_listen = self.hooks.borrow().on_listen.clone();
            if let Some(on_listen) = on_listen {
                on_listen();
            }
        }
        StreamSubscription::from_core(core)
    }

    fn record_cancel(&self, id: SubscriberId) {
        let now_empty = {
            let mut state = self.state.borrow_mut();
            let firing = state.firing;
            let Some(node) = state.subscribers.get_mut(id) else {
                return;
            };
            if node.firing {
                node.remove_after_firing = true;
                return;
            }
            state.subscribers.unlink(id.index);
            !firing && state.subscribers.is_empty()
        };
        log::debug!("broadcast listener {} removed", id.index);
        if now_empty {
            self.call_on_cancel();
        }
    }

    fn call_on_cancel(&self) {
        if self.state.borrow().closed {
            self.complete_done();
        }
        let on_cancel = self.hooks.borrow().on_cancel.clone();
        if let Some(on_cancel) = on_cancel {
            on_cancel();
        }
    }

    fn send(&self, event: StreamEvent<T>) -> Result<(), RuntimeError> {
        if self.state.borrow().subscribers.is_empty() {
            if matches!(event, StreamEvent::Done) {
                self.complete_done();
            }
            return Ok(());
        }
        if !self.sync {
            let cores = self.state.borrow().subscribers.cores();
            for core in cores {
                core.add_pending(clone_event(&event));
            }
            return Ok(());
        }
        if matches!(event, StreamEvent::Data(_)) && self.state.borrow().subscribers.has_one() {
            return self.send_to_only_listener(event);
        }
        self.for_each_listener(|core| match &event {
            StreamEvent::Data(value) => core.add(value.clone()),
            StreamEvent::Error(error) => core.add_error(error.clone()),
            StreamEvent::Done => core.close(),
        })
    }

    fn send_to_only_listener(&self, event: StreamEvent<T>) -> Result<(), RuntimeError> {
        let core = {
            let mut state = self.state.borrow_mut();
            state.firing = true;
            let first = state.subscribers.first();
            state.subscribers.nodes[first].core.clone()
        };
        if let (Some(core), StreamEvent::Data(value)) = (core, event) {
            core.add(value);
        }
        let now_empty = {
            let mut state = self.state.borrow_mut();
            state.firing = false;
            state.subscribers.is_empty()
        };
        if now_empty {
            self.call_on_cancel();
        }
        Ok(())
    }

    /// Runs `action` once for each subscriber linked before the pass began.
    fn for_each_listener(&self, action: impl Fn(&SubscriptionCore<T>)) -> Result<(), RuntimeError> {
        let pass_id = {
            let mut state = self.state.borrow_mut();
            if state.firing {
                return Err(RuntimeError::state(
                    "Cannot fire new event. Controller is already firing an event",
                ));
            }
            if state.subscribers.is_empty() {
                return Ok(());
            }
            let pass_id = state.event_id;
            state.event_id = !pass_id;
            state.firing = true;
            pass_id
        };

        let mut cursor = self.state.borrow().subscribers.first();
        while cursor != HEAD {
            let visit = {
                let mut state = self.state.borrow_mut();
                let node = &mut state.subscribers.nodes[cursor];
                if node.event_id == pass_id {
                    node.firing = true;
                    node.core.clone()
                } else {
                    None
                }
            };
            let Some(core) = visit else {
                cursor = self.state.borrow().subscribers.nodes[cursor].next;
                continue;
            };

            action(&core);

            let mut state = self.state.borrow_mut();
            let node = &mut state.subscribers.nodes[cursor];
            node.event_id = !node.event_id;
            node.firing = false;
            let next = node.next;
            if node.remove_after_firing {
                state.subscribers.unlink(cursor);
            }
            cursor = next;
        }

        let now_empty = {
            let mut state = self.state.borrow_mut();
            state.firing = false;
            state.subscribers.is_empty()
        };
        if now_empty {
            self.call_on_cancel();
        }
        Ok(())
    }
}

fn clone_event<T: Clone>(event: &StreamEvent<T>) -> StreamEvent<T> {
    match event {
        StreamEvent::Data(value) => StreamEvent::Data(value.clone()),
        StreamEvent::Error(error) => StreamEvent::Error(error.clone()),
        StreamEvent::Done => StreamEvent::Done,
    }
}

impl<T: Clone + 'static> AddStreamTarget<T> for BroadcastInner<T> {
    fn add_unchecked(&self, value: T) {
        if let Err(error) = self.send(StreamEvent::Data(value)) {
            log::warn!("dropping added stream event: {}", error);
        }
    }

    fn add_error_unchecked(&self, error: AsyncError) {
        if let Err(error) = self.send(StreamEvent::Error(error)) {
            log::warn!("dropping added stream error: {}", error);
        }
    }

    fn finish_add_stream(&self) {
        let add_stream = self.state.borrow_mut().add_stream.take();
        if let Some(add_stream) = add_stream {
            add_stream.complete();
        }
    }
}

struct BroadcastSubscriptionHooks<T> {
    controller: Rc<BroadcastInner<T>>,
    id: SubscriberId,
}

impl<T: Clone + 'static> SubscriptionHooks for BroadcastSubscriptionHooks<T> {
    fn on_cancel(&self) -> Option<Future<()>> {
        self.controller.record_cancel(self.id);
        None
    }
}

struct BroadcastStream<T> {
    controller: Rc<BroadcastInner<T>>,
}

impl<T: Clone + 'static> StreamSource<T> for BroadcastStream<T> {
    fn listen(&self, handlers: StreamHandlers<T>) -> Result<StreamSubscription<T>, RuntimeError> {
        Ok(self.controller.subscribe(handlers))
    }

    fn is_broadcast(&self) -> bool {
        true
    }
}
