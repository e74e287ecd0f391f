use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::actor::ActorSlot;
use crate::{ActorId, Clock, Continuation, EventQueue, Payload, Random, Source, Targets, Time};

/// This struct has only immutable access to the simulation clock exposed.
#[derive(Debug, Clone)]
pub struct ClockRef {
    clock: Clock,
}

impl From<Clock> for ClockRef {
    fn from(clock: Clock) -> Self {
        Self { clock }
    }
}

impl ClockRef {
    /// Return the current simulation time.
    #[must_use]
    pub fn time(&self) -> Time {
        self.clock.get()
    }
}

/// Keeps the current time, the pending continuations, and the registered actors.
///
/// Owned by [`Simulation`](crate::Simulation); everything else holds a weak reference.
pub(crate) struct Scheduler {
    clock: Clock,
    events: RefCell<EventQueue<Continuation>>,
    actors: RefCell<Vec<Rc<dyn ActorSlot>>>,
    random: Rc<RefCell<Random>>,
}

impl Scheduler {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            clock: Rc::new(Cell::new(0.0)),
            events: RefCell::new(EventQueue::default()),
            actors: RefCell::new(Vec::new()),
            random: Rc::new(RefCell::new(Random::new(seed))),
        }
    }

    pub(crate) fn time(&self) -> Time {
        self.clock.get()
    }

    pub(crate) fn set_time(&self, time: Time) {
        self.clock.set(time);
    }

    pub(crate) fn clock(&self) -> ClockRef {
        ClockRef::from(Rc::clone(&self.clock))
    }

    pub(crate) fn random(&self) -> &Rc<RefCell<Random>> {
        &self.random
    }

    pub(crate) fn insert(&self, at: Time, continuation: Continuation) {
        log::trace!("Scheduling continuation at {}", at);
        self.events.borrow_mut().insert(at, continuation);
    }

    pub(crate) fn pending(&self) -> usize {
        self.events.borrow().len()
    }

    pub(crate) fn next_time(&self) -> Option<Time> {
        self.events.borrow().next_time()
    }

    /// Removes the earliest continuation.
    pub(crate) fn pop(&self) -> Option<(Time, Continuation)> {
        self.events.borrow_mut().remove_min()
    }

    /// Removes all continuations sharing the earliest timestamp, in insertion order.
    ///
    /// Continuations inserted at the same timestamp while the batch is being delivered belong
    /// to the next batch.
    pub(crate) fn next_batch(&self) -> Vec<(Time, Continuation)> {
        let mut events = self.events.borrow_mut();
        let mut batch = Vec::new();
        if let Some(time) = events.next_time() {
            while events.next_time() == Some(time) {
                batch.extend(events.remove_min());
            }
        }
        batch
    }

    /// ID that the next registered actor receives.
    pub(crate) fn next_actor_id(&self) -> ActorId {
        ActorId::from(self.actors.borrow().len() + 1)
    }

    pub(crate) fn push_actor(&self, slot: Rc<dyn ActorSlot>) {
        self.actors.borrow_mut().push(slot);
    }

    pub(crate) fn actors(&self) -> Vec<Rc<dyn ActorSlot>> {
        self.actors.borrow().clone()
    }

    pub(crate) fn actor(&self, id: ActorId) -> Option<Rc<dyn ActorSlot>> {
        let idx = usize::from(id).checked_sub(1)?;
        self.actors.borrow().get(idx).cloned()
    }

    /// Hands `payload` to the receiving targets, most recently registered first.
    ///
    /// The sender never receives its own broadcast, and actors without a receiver are skipped.
    pub(crate) fn broadcast(
        &self,
        sender: ActorId,
        source: &Source,
        payload: &Payload,
        targets: &Targets,
    ) {
        let receivers: Vec<Rc<dyn ActorSlot>> = match targets {
            Targets::One(id) => self.actor(*id).into_iter().collect(),
            Targets::Many(ids) if !ids.is_empty() => ids
                .iter()
                .rev()
                .filter(|&&id| id != sender)
                .filter_map(|&id| self.actor(id))
                .collect(),
            Targets::All | Targets::Many(_) => self
                .actors()
                .into_iter()
                .rev()
                .filter(|slot| slot.id() != sender)
                .collect(),
        };
        for receiver in receivers {
            receiver.receive(sender, source, payload);
        }
    }
}
