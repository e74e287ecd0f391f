use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::continuation::Callback;
use crate::scheduler::Scheduler;
use crate::{
    Buffer, Continuation, Delivery, Event, Facility, Message, Payload, Population, Random,
    Request, Source, SourceKind, Store, Time,
};

/// Identifier assigned to every registered actor, starting from 1 in registration order.
#[derive(
    From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Serialize, Deserialize, Copy, Clone, Hash, Display,
)]
pub struct ActorId(usize);

/// Recipients of a message sent with [`Context::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// Every other registered actor.
    All,
    /// A single actor.
    One(ActorId),
    /// A list of actors; an empty list means every other actor.
    Many(Vec<ActorId>),
}

/// A participant in the simulation.
///
/// An actor does nothing on its own: it reacts once to [`start`](Self::start) when registered,
/// and afterwards only through callbacks attached to the requests it issues.
pub trait Actor: Sized + 'static {
    /// Arguments passed to `start`.
    type Args;

    /// Called once, when the actor is added to the simulation.
    fn start(&mut self, ctx: &Context<Self>, args: Self::Args);

    /// Returns the finalization hook, if the actor has one.
    fn finalizer(&mut self) -> Option<&mut dyn Finalize<Self>> {
        None
    }

    /// Returns the message handler, if the actor accepts messages.
    fn receiver(&mut self) -> Option<&mut dyn Receive<Self>> {
        None
    }
}

/// Hook called for every actor, in registration order, at the end of a run.
pub trait Finalize<A: Actor> {
    /// Closes any statistics left open at the end of the run.
    fn finalize(&mut self, ctx: &Context<A>);
}

/// Message handling capability.
pub trait Receive<A: Actor> {
    /// Handles `message` sent by the actor `sender`.
    fn on_message(&mut self, ctx: &Context<A>, sender: ActorId, message: &Payload);
}

/// Per-actor state shared between the engine and the actor's contexts.
pub(crate) struct ActorCell {
    id: ActorId,
    name: String,
    stats: RefCell<Population>,
    random: Rc<RefCell<Random>>,
    callback: RefCell<Option<Delivery>>,
}

impl ActorCell {
    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    /// Makes `delivery` visible to the actor until the returned scope is dropped.
    pub(crate) fn enter_callback(&self, delivery: Delivery) -> CallbackScope<'_> {
        let previous = self.callback.replace(Some(delivery));
        CallbackScope {
            cell: self,
            previous,
        }
    }
}

pub(crate) struct CallbackScope<'a> {
    cell: &'a ActorCell,
    previous: Option<Delivery>,
}

impl<'a> Drop for CallbackScope<'a> {
    fn drop(&mut self) {
        self.cell.callback.replace(self.previous.take());
    }
}

/// Type-erased view of a registered actor, used by the engine.
pub(crate) trait ActorSlot {
    fn id(&self) -> ActorId;
    fn finalize(&self);
    fn receive(&self, sender: ActorId, source: &Source, payload: &Payload);
}

struct Registered<A: Actor> {
    object: Rc<RefCell<A>>,
    ctx: Context<A>,
}

impl<A: Actor> ActorSlot for Registered<A> {
    fn id(&self) -> ActorId {
        self.ctx.id()
    }

    fn finalize(&self) {
        let mut actor = self.object.borrow_mut();
        if let Some(finalizer) = actor.finalizer() {
            finalizer.finalize(&self.ctx);
        }
    }

    fn receive(&self, sender: ActorId, source: &Source, payload: &Payload) {
        let mut actor = self.object.borrow_mut();
        if let Some(receiver) = actor.receiver() {
            let _scope = self.ctx.cell.enter_callback(Delivery {
                source: Some(source.clone()),
                message: Message::Payload(payload.clone()),
                data: None,
            });
            receiver.on_message(&self.ctx, sender, payload);
        }
    }
}

/// Registers `actor` and calls its `start`.
pub(crate) fn register<A: Actor>(
    scheduler: &Rc<Scheduler>,
    name: String,
    actor: A,
    args: A::Args,
) -> ActorRef<A> {
    let id = scheduler.next_actor_id();
    let object = Rc::new(RefCell::new(actor));
    let cell = Rc::new(ActorCell {
        id,
        stats: RefCell::new(Population::new(name.clone())),
        name,
        random: Rc::clone(scheduler.random()),
        callback: RefCell::new(None),
    });
    let ctx = Context {
        scheduler: Rc::downgrade(scheduler),
        cell,
        this: Rc::downgrade(&object),
    };
    scheduler.push_actor(Rc::new(Registered {
        object: Rc::clone(&object),
        ctx: ctx.clone(),
    }));
    log::debug!("Registered actor {} [{}]", id, ctx.name());
    object.borrow_mut().start(&ctx, args);
    ActorRef { object, ctx }
}

/// Handle through which an actor interacts with the simulation.
///
/// Every request method creates a continuation owned by the actor and returns a [`Request`]
/// on which callbacks and alternatives can be registered. Contexts are cheap to clone and can
/// be stored inside the actor.
pub struct Context<A> {
    scheduler: Weak<Scheduler>,
    cell: Rc<ActorCell>,
    this: Weak<RefCell<A>>,
}

impl<A> Clone for Context<A> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Weak::clone(&self.scheduler),
            cell: Rc::clone(&self.cell),
            this: Weak::clone(&self.this),
        }
    }
}

impl<A> fmt::Debug for Context<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.cell.id)
            .field("name", &self.cell.name)
            .finish()
    }
}

impl<A: Actor> Context<A> {
    /// Identifier of this actor.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.cell.id
    }

    /// Name the actor was registered with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Current simulation time.
    #[must_use]
    pub fn time(&self) -> Time {
        self.scheduler.upgrade().map_or(0.0, |scheduler| scheduler.time())
    }

    /// Statistics owned by this actor.
    #[must_use]
    pub fn stats(&self) -> Ref<'_, Population> {
        self.cell.stats.borrow()
    }

    /// Mutable access to the statistics owned by this actor.
    pub fn stats_mut(&self) -> RefMut<'_, Population> {
        self.cell.stats.borrow_mut()
    }

    /// Random number generator shared by the whole simulation.
    pub fn random(&self) -> RefMut<'_, Random> {
        self.cell.random.borrow_mut()
    }

    /// Logs `message` prefixed with the current time and the actor's name, or its ID if the
    /// name is empty.
    pub fn log<D: fmt::Display>(&self, message: D) {
        if self.name().is_empty() {
            log::info!("{:.6} [{}] {}", self.time(), self.id(), message);
        } else {
            log::info!("{:.6} [{}] {}", self.time(), self.name(), message);
        }
    }

    /// Source of the continuation whose callback is currently running.
    #[must_use]
    pub fn callback_source(&self) -> Option<Source> {
        self.cell
            .callback
            .borrow()
            .as_ref()
            .and_then(|delivery| delivery.source.clone())
    }

    /// Message of the continuation whose callback is currently running.
    #[must_use]
    pub fn callback_message(&self) -> Message {
        self.cell
            .callback
            .borrow()
            .as_ref()
            .map(|delivery| delivery.message.clone())
            .unwrap_or_default()
    }

    /// Data attached to the continuation whose callback is currently running.
    #[must_use]
    pub fn callback_data(&self) -> Option<Payload> {
        self.cell
            .callback
            .borrow()
            .as_ref()
            .and_then(|delivery| delivery.data.clone())
    }

    /// Typed data attached to the continuation whose callback is currently running.
    #[must_use]
    pub fn callback_data_as<T: Any>(&self) -> Option<Rc<T>> {
        self.callback_data().and_then(|data| data.downcast())
    }

    /// Schedules a wake-up `duration` from now.
    ///
    /// # Panics
    ///
    /// Panics if `duration` is negative or NaN.
    pub fn set_timer(&self, duration: Time) -> Request<A> {
        assert!(duration >= 0.0, "timer duration must be non-negative");
        let continuation = self.continuation();
        continuation.schedule_at(self.time() + duration);
        self.request(continuation)
    }

    /// Waits until `event` fires. All waiters are released when it does.
    pub fn wait_event(&self, event: &Event) -> Request<A> {
        let continuation = self.continuation();
        event.add_wait_list(continuation.clone());
        self.request(continuation)
    }

    /// Queues on `event`. Only one queued actor is released per firing.
    pub fn queue_event(&self, event: &Event) -> Request<A> {
        let continuation = self.continuation();
        event.add_queue(continuation.clone());
        self.request(continuation)
    }

    /// Requests `duration` of service from `facility`.
    ///
    /// The request is delivered when the service completes, or with
    /// [`Message::Rejected`] if the facility queue is full.
    pub fn use_facility(&self, facility: &Facility, duration: Time) -> Request<A> {
        let continuation = self.continuation();
        facility.serve(duration, continuation.clone());
        self.request(continuation)
    }

    /// Puts `amount` into `buffer`, waiting for room if necessary.
    pub fn put_buffer(&self, buffer: &Buffer, amount: f64) -> Request<A> {
        let continuation = self.continuation();
        buffer.put(amount, continuation.clone());
        self.request(continuation)
    }

    /// Takes `amount` from `buffer`, waiting until it is available.
    pub fn get_buffer(&self, buffer: &Buffer, amount: f64) -> Request<A> {
        let continuation = self.continuation();
        buffer.get(amount, continuation.clone());
        self.request(continuation)
    }

    /// Puts `item` into `store`, waiting for room if necessary.
    pub fn put_store<T: 'static>(&self, store: &Store<T>, item: T) -> Request<A> {
        let continuation = self.continuation();
        store.put(item, continuation.clone());
        self.request(continuation)
    }

    /// Takes the oldest item out of `store`, waiting until there is one.
    ///
    /// The item is delivered as [`Message::Item`].
    pub fn get_store<T: 'static>(&self, store: &Store<T>) -> Request<A> {
        let continuation = self.continuation();
        store.get(None, continuation.clone());
        self.request(continuation)
    }

    /// Takes the oldest item accepted by `filter` out of `store`, waiting until there is one.
    pub fn get_store_matching<T, F>(&self, store: &Store<T>, filter: F) -> Request<A>
    where
        T: 'static,
        F: Fn(&T) -> bool + 'static,
    {
        let continuation = self.continuation();
        store.get(Some(Box::new(filter)), continuation.clone());
        self.request(continuation)
    }

    /// Sends `message` to `targets` after `delay`.
    ///
    /// Only actors that have a [`Receive`] capability get the message, and the sender never
    /// receives its own broadcast.
    pub fn send<T: Any>(&self, message: T, delay: Time, targets: Targets) {
        assert!(delay >= 0.0, "message delay must be non-negative");
        let now = self.time();
        let continuation = Continuation::new(Weak::clone(&self.scheduler), None, now);
        let source = Source::new(SourceKind::Actor(self.id()), Rc::from(self.name()));
        continuation.set_source(source.clone());
        let payload = Payload::new(message);
        continuation.set_message(Message::Payload(payload.clone()));
        let scheduler = Weak::clone(&self.scheduler);
        let sender = self.id();
        continuation.push_callback(Callback::new(None, move || {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.broadcast(sender, &source, &payload, &targets);
            }
        }));
        continuation.schedule_at(now + delay);
    }

    fn continuation(&self) -> Continuation {
        Continuation::new(
            Weak::clone(&self.scheduler),
            Some(Rc::clone(&self.cell)),
            self.time(),
        )
    }

    fn request(&self, continuation: Continuation) -> Request<A> {
        Request::new(continuation, self.clone())
    }

    /// Wraps `f` into a callback that runs on this actor.
    pub(crate) fn bind<F>(&self, f: F) -> Callback
    where
        F: FnOnce(&mut A, &Context<A>) + 'static,
    {
        let ctx = self.clone();
        Callback::new(Some(Rc::clone(&self.cell)), move || {
            if let Some(object) = ctx.this.upgrade() {
                f(&mut object.borrow_mut(), &ctx);
            }
        })
    }
}

/// Handle to a registered actor, returned by [`Simulation::add_actor`](crate::Simulation::add_actor).
pub struct ActorRef<A> {
    object: Rc<RefCell<A>>,
    ctx: Context<A>,
}

impl<A> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            object: Rc::clone(&self.object),
            ctx: self.ctx.clone(),
        }
    }
}

impl<A: Actor> ActorRef<A> {
    /// Identifier of the actor.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.ctx.id()
    }

    /// Name the actor was registered with.
    #[must_use]
    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    /// Immutable access to the actor's state.
    ///
    /// # Panics
    ///
    /// Panics if the actor is currently running a callback.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, A> {
        self.object.borrow()
    }

    /// Mutable access to the actor's state.
    ///
    /// # Panics
    ///
    /// Panics if the actor is currently running a callback.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, A> {
        self.object.borrow_mut()
    }

    /// Context of the actor, e.g., to issue requests on its behalf.
    #[must_use]
    pub fn context(&self) -> &Context<A> {
        &self.ctx
    }

    /// Statistics owned by the actor.
    #[must_use]
    pub fn stats(&self) -> Ref<'_, Population> {
        self.ctx.stats()
    }
}
