use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::actor::ActorCell;
use crate::scheduler::Scheduler;
use crate::{ActorId, Time};

/// Shared, type-erased value attached to a continuation or sent between actors.
#[derive(Clone)]
pub struct Payload(Rc<dyn Any>);

impl Payload {
    /// Wraps `value`.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrows the value if it is of type `T`.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns a shared handle to the value if it is of type `T`.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.0).downcast::<T>().ok()
    }

    /// Checks if the value is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// Outcome carried by a continuation to its callbacks.
#[derive(Debug, Clone)]
pub enum Message {
    /// Nothing to report, e.g., an expired timer.
    None,
    /// The request was turned away because the facility queue was full.
    Rejected,
    /// Index of the facility server that handled the request.
    Server(usize),
    /// Item retrieved from a store.
    Item(Payload),
    /// Name of the event that released the continuation.
    Event(Rc<str>),
    /// Message sent by another actor.
    Payload(Payload),
}

impl Default for Message {
    fn default() -> Self {
        Self::None
    }
}

impl Message {
    /// Checks if this is the rejection sentinel.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Server index, if the message came from a facility.
    #[must_use]
    pub fn server(&self) -> Option<usize> {
        match self {
            Self::Server(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Retrieved store item of type `T`.
    #[must_use]
    pub fn item<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Self::Item(payload) => payload.downcast(),
            _ => None,
        }
    }

    /// Name of the event that fired.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Event(name) => Some(name),
            _ => None,
        }
    }

    /// Payload of an actor message.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Payload(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Implemented by resources that need to re-examine their wait queues when one of their waiters
/// is cancelled.
pub(crate) trait Contended {
    fn reevaluate(&self, now: Time);
}

/// Kind of object a continuation originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A [`Facility`](crate::Facility).
    Facility,
    /// A [`Buffer`](crate::Buffer).
    Buffer,
    /// A [`Store`](crate::Store).
    Store,
    /// An [`Event`](crate::Event).
    Event,
    /// Another actor.
    Actor(ActorId),
}

/// Identifies where a continuation came from.
#[derive(Clone)]
pub struct Source {
    kind: SourceKind,
    name: Rc<str>,
    contended: Option<Weak<dyn Contended>>,
}

impl Source {
    pub(crate) fn new(kind: SourceKind, name: Rc<str>) -> Self {
        Self {
            kind,
            name,
            contended: None,
        }
    }

    pub(crate) fn contended(kind: SourceKind, name: Rc<str>, resource: Weak<dyn Contended>) -> Self {
        Self {
            kind,
            name,
            contended: Some(resource),
        }
    }

    /// Kind of resource or actor the delivery came from.
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Name of the source.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn reevaluate(&self, now: Time) {
        if let Some(resource) = self.contended.as_ref().and_then(Weak::upgrade) {
            resource.reevaluate(now);
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// Everything a callback can learn about the continuation that triggered it.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    /// Where the continuation came from.
    pub source: Option<Source>,
    /// Outcome of the wait.
    pub message: Message,
    /// Data attached with `set_data`.
    pub data: Option<Payload>,
}

/// A single callback registered on a continuation.
pub(crate) struct Callback {
    receiver: Option<Rc<ActorCell>>,
    action: Box<dyn FnOnce()>,
}

impl Callback {
    pub(crate) fn new<F: FnOnce() + 'static>(receiver: Option<Rc<ActorCell>>, action: F) -> Self {
        Self {
            receiver,
            action: Box::new(action),
        }
    }

    /// Runs the action with `delivery` visible on the receiver, which defaults to `owner`.
    fn dispatch(self, owner: Option<&Rc<ActorCell>>, delivery: &Delivery) {
        let receiver = self.receiver.as_ref().or(owner);
        let _scope = receiver.map(|cell| cell.enter_callback(delivery.clone()));
        (self.action)();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Scheduled,
    Cancelled,
    Delivered,
}

/// Position of a continuation within a group of mutually exclusive alternatives.
enum Role {
    Solo,
    Leader(Vec<Continuation>),
    Member(Weak<RefCell<Inner>>),
}

struct Inner {
    scheduler: Weak<Scheduler>,
    owner: Option<Rc<ActorCell>>,
    scheduled_at: Time,
    deliver_at: Option<Time>,
    status: Status,
    committed: bool,
    source: Option<Source>,
    message: Message,
    data: Option<Payload>,
    callbacks: Vec<Callback>,
    role: Role,
}

impl Inner {
    fn now(&self) -> Time {
        self.scheduler.upgrade().map_or(self.scheduled_at, |s| s.time())
    }
}

/// A scheduled unit of future work: "deliver this outcome to these callbacks at that time".
///
/// A continuation is either still scheduled, or it has been delivered or cancelled; both of the
/// latter are final. Delivering or cancelling it again does nothing.
///
/// Continuations can be grouped to race against each other: alternatives added with
/// [`Request::wait_until`](crate::Request::wait_until) or
/// [`Request::unless_event`](crate::Request::unless_event) become members of a group led by
/// the original request, and whichever member is delivered first cancels the rest.
#[derive(Clone)]
pub struct Continuation(Rc<RefCell<Inner>>);

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Continuation")
            .field("scheduled_at", &inner.scheduled_at)
            .field("deliver_at", &inner.deliver_at)
            .field("status", &inner.status)
            .field("committed", &inner.committed)
            .field("message", &inner.message)
            .finish()
    }
}

impl Continuation {
    pub(crate) fn new(
        scheduler: Weak<Scheduler>,
        owner: Option<Rc<ActorCell>>,
        scheduled_at: Time,
    ) -> Self {
        Self(Rc::new(RefCell::new(Inner {
            scheduler,
            owner,
            scheduled_at,
            deliver_at: None,
            status: Status::Scheduled,
            committed: false,
            source: None,
            message: Message::None,
            data: None,
            callbacks: Vec::new(),
            role: Role::Solo,
        })))
    }

    /// Creates a continuation with the same scheduler and no owner, used by resources for their
    /// internal bookkeeping.
    pub(crate) fn internal(&self) -> Self {
        let inner = self.0.borrow();
        let now = inner.now();
        Self::new(Weak::clone(&inner.scheduler), None, now)
    }

    /// Time at which the continuation was created.
    #[must_use]
    pub fn scheduled_at(&self) -> Time {
        self.0.borrow().scheduled_at
    }

    /// Time at which it is (or was) to be delivered; `None` while waiting on a resource or event.
    #[must_use]
    pub fn deliver_at(&self) -> Option<Time> {
        self.0.borrow().deliver_at
    }

    /// Checks if the continuation neither has been delivered nor cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.borrow().status == Status::Scheduled
    }

    /// Whether the continuation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.borrow().status == Status::Cancelled
    }

    /// Whether the continuation was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.0.borrow().status == Status::Delivered
    }

    /// Checks if a resource has committed to serving this continuation, after which it can no
    /// longer be cancelled.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.0.borrow().committed
    }

    /// Current message.
    #[must_use]
    pub fn message(&self) -> Message {
        self.0.borrow().message.clone()
    }

    /// ID of the actor that issued the continuation.
    #[must_use]
    pub fn owner(&self) -> Option<ActorId> {
        self.0.borrow().owner.as_ref().map(|cell| cell.id())
    }

    /// Number of alternatives racing against this continuation.
    #[must_use]
    pub fn alternatives(&self) -> usize {
        match &self.0.borrow().role {
            Role::Leader(members) => members.len(),
            _ => 0,
        }
    }

    pub(crate) fn now(&self) -> Time {
        self.0.borrow().now()
    }

    pub(crate) fn set_source(&self, source: Source) {
        self.0.borrow_mut().source = Some(source);
    }

    pub(crate) fn set_message(&self, message: Message) {
        self.0.borrow_mut().message = message;
    }

    pub(crate) fn set_data(&self, data: Payload) {
        self.0.borrow_mut().data = Some(data);
    }

    pub(crate) fn push_callback(&self, callback: Callback) {
        self.0.borrow_mut().callbacks.push(callback);
    }

    /// Fixes the delivery time and inserts the continuation into the event queue.
    pub(crate) fn schedule_at(&self, at: Time) {
        let scheduler = {
            let mut inner = self.0.borrow_mut();
            inner.deliver_at = Some(at);
            inner.scheduler.upgrade()
        };
        if let Some(scheduler) = scheduler {
            scheduler.insert(at, self.clone());
        }
    }

    /// Schedules delivery at the current time.
    pub(crate) fn schedule_now(&self) {
        self.schedule_at(self.now());
    }

    fn leader(&self) -> Option<Continuation> {
        match &self.0.borrow().role {
            Role::Member(leader) => leader.upgrade().map(Continuation),
            _ => None,
        }
    }

    /// Adds an alternative to the group led by this continuation.
    ///
    /// Returns `None` if a resource has already committed to serving this continuation, since
    /// there is nothing left to race against.
    pub(crate) fn add_alternative(&self, callback: Callback) -> Option<Continuation> {
        if let Some(leader) = self.leader() {
            return leader.add_alternative(callback);
        }
        let mut inner = self.0.borrow_mut();
        if inner.committed {
            return None;
        }
        let member = Self(Rc::new(RefCell::new(Inner {
            scheduler: Weak::clone(&inner.scheduler),
            owner: inner.owner.clone(),
            scheduled_at: inner.scheduled_at,
            deliver_at: None,
            status: Status::Scheduled,
            committed: false,
            source: None,
            message: Message::None,
            data: None,
            callbacks: vec![callback],
            role: Role::Member(Rc::downgrade(&self.0)),
        })));
        match &mut inner.role {
            Role::Leader(members) => members.push(member.clone()),
            role => *role = Role::Leader(vec![member.clone()]),
        }
        Some(member)
    }

    /// Cancels the continuation and every alternative in its group.
    ///
    /// Cancelling a group member cancels the whole group through its leader. Nothing happens if
    /// the continuation is already delivered or cancelled, or if a resource committed to
    /// serving it. The resource it waits on, if any, is notified so that it can hand the freed
    /// place to the next waiter.
    pub fn cancel(&self) {
        if let Some(leader) = self.leader() {
            leader.cancel();
            return;
        }
        let (source, members, now) = {
            let mut inner = self.0.borrow_mut();
            if inner.committed || inner.status != Status::Scheduled {
                return;
            }
            inner.status = Status::Cancelled;
            let now = inner.now();
            inner.deliver_at.get_or_insert(now);
            let members = match &inner.role {
                Role::Leader(members) => members.clone(),
                _ => Vec::new(),
            };
            (inner.source.clone(), members, now)
        };
        log::trace!("Continuation cancelled at {}", now);
        if let Some(source) = source {
            source.reevaluate(now);
        }
        for member in members {
            member.cancel_member(now);
        }
    }

    fn cancel_member(&self, now: Time) {
        let mut inner = self.0.borrow_mut();
        if inner.status == Status::Scheduled {
            inner.status = Status::Cancelled;
            inner.deliver_at.get_or_insert(now);
        }
    }

    /// Commits to the continuation: from now on it cannot be cancelled, and all its pending
    /// alternatives are cancelled.
    pub fn cancel_renege_clauses(&self) {
        self.0.borrow_mut().committed = true;
        self.cancel_alternatives();
    }

    fn cancel_alternatives(&self) {
        let (members, now) = {
            let inner = self.0.borrow();
            match &inner.role {
                Role::Leader(members) => (members.clone(), inner.now()),
                _ => return,
            }
        };
        for member in members {
            member.cancel_member(now);
        }
    }

    /// Runs all registered callbacks in registration order, unless already cancelled or
    /// delivered.
    ///
    /// Group members report the source and data of their leader, together with their own
    /// message.
    pub fn deliver(&self) {
        if !self.is_pending() {
            return;
        }
        let leader = self.leader();
        match &leader {
            Some(leader) => leader.cancel(),
            None => self.cancel_alternatives(),
        }
        let (callbacks, owner, delivery) = {
            let mut inner = self.0.borrow_mut();
            inner.status = Status::Delivered;
            let now = inner.now();
            inner.deliver_at.get_or_insert(now);
            let (source, data) = match &leader {
                Some(leader) => {
                    let leader = leader.0.borrow();
                    (leader.source.clone(), leader.data.clone())
                }
                None => (inner.source.clone(), inner.data.clone()),
            };
            let delivery = Delivery {
                source,
                message: inner.message.clone(),
                data,
            };
            (
                std::mem::take(&mut inner.callbacks),
                inner.owner.clone(),
                delivery,
            )
        };
        for callback in callbacks {
            callback.dispatch(owner.as_ref(), &delivery);
        }
    }
}
