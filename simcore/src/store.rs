use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::continuation::Contended;
use crate::{
    Continuation, Error, Message, Payload, Population, Result, Source, SourceKind, Time,
    WaitQueue,
};

/// Predicate selecting which stored item satisfies a get request.
pub type Filter<T> = Box<dyn Fn(&T) -> bool>;

struct PendingPut<T> {
    request: Continuation,
    item: T,
}

struct PendingGet<T> {
    request: Continuation,
    filter: Option<Filter<T>>,
}

impl<T> PendingGet<T> {
    fn find(&self, items: &VecDeque<T>) -> Option<usize> {
        match &self.filter {
            Some(filter) => items.iter().position(|item| filter(item)),
            None if items.is_empty() => None,
            None => Some(0),
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    put_queue: WaitQueue<PendingPut<T>>,
    get_queue: WaitQueue<PendingGet<T>>,
}

impl<T: 'static> State<T> {
    fn hand_over(&mut self, idx: usize, request: &Continuation, now: Time) {
        if let Some(item) = self.items.remove(idx) {
            request.set_message(Message::Item(Payload::new(item)));
            request.cancel_renege_clauses();
            request.schedule_at(now);
        }
    }

    fn progress_put(&mut self, capacity: usize, now: Time) -> bool {
        let mut progressed = false;
        loop {
            let ready = match self.put_queue.top() {
                None => break,
                Some(p) => !p.request.is_pending() || self.items.len() < capacity,
            };
            if !ready {
                break;
            }
            if let Some(p) = self.put_queue.shift(now) {
                if p.request.is_pending() {
                    self.items.push_back(p.item);
                    p.request.cancel_renege_clauses();
                    p.request.schedule_at(now);
                    progressed = true;
                }
            }
        }
        progressed
    }

    fn progress_get(&mut self, now: Time) -> bool {
        let mut progressed = false;
        loop {
            let found = match self.get_queue.top() {
                None => break,
                Some(p) if !p.request.is_pending() => None,
                Some(p) => match p.find(&self.items) {
                    Some(idx) => Some(idx),
                    None => break,
                },
            };
            if let Some(p) = self.get_queue.shift(now) {
                if let Some(idx) = found {
                    self.hand_over(idx, &p.request, now);
                    progressed = true;
                }
            }
        }
        progressed
    }

    fn settle(&mut self, capacity: usize, now: Time) {
        while self.progress_put(capacity, now) | self.progress_get(now) {}
    }
}

struct StoreCell<T> {
    this: Weak<StoreCell<T>>,
    name: Rc<str>,
    capacity: usize,
    state: RefCell<State<T>>,
}

impl<T: 'static> Contended for StoreCell<T> {
    fn reevaluate(&self, now: Time) {
        self.state.borrow_mut().settle(self.capacity, now);
    }
}

/// Container holding up to `capacity` distinct items.
///
/// Items come out in the order they were put in, unless a get request carries a filter, in
/// which case it receives the oldest item the filter accepts. Retrieved items are delivered as
/// [`Message::Item`].
pub struct Store<T>(Rc<StoreCell<T>>);

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.0.name)
            .field("capacity", &self.0.capacity)
            .finish()
    }
}

impl<T: 'static> Store<T> {
    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::capacity(name, "a store must hold at least one item"));
        }
        Ok(Self(Rc::new_cyclic(|this| StoreCell {
            this: Weak::clone(this),
            name: Rc::from(name),
            capacity,
            state: RefCell::new(State {
                items: VecDeque::new(),
                put_queue: WaitQueue::new(format!("{} put", name)),
                get_queue: WaitQueue::new(format!("{} get", name)),
            }),
        })))
    }

    /// Name of the store.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of stored items.
    #[must_use]
    pub fn current(&self) -> usize {
        self.0.state.borrow().items.len()
    }

    /// Capacity.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.capacity
    }

    /// Statistics of put requests waiting for room.
    #[must_use]
    pub fn put_stats(&self) -> Ref<'_, Population> {
        Ref::map(self.0.state.borrow(), |state| state.put_queue.stats())
    }

    /// Statistics of get requests waiting for items.
    #[must_use]
    pub fn get_stats(&self) -> Ref<'_, Population> {
        Ref::map(self.0.state.borrow(), |state| state.get_queue.stats())
    }

    /// Closes open statistics intervals at `timestamp`.
    pub fn finalize(&self, timestamp: Time) {
        let mut state = self.0.state.borrow_mut();
        state.put_queue.finalize(timestamp);
        state.get_queue.finalize(timestamp);
    }

    fn source(&self) -> Source {
        let this: Weak<dyn Contended> = self.0.this.clone();
        Source::contended(SourceKind::Store, Rc::clone(&self.0.name), this)
    }

    /// Retrieves an item accepted by `filter`, or the oldest item if there is no filter.
    pub fn get(&self, filter: Option<Filter<T>>, request: Continuation) {
        request.set_source(self.source());
        let now = request.now();
        let pending = PendingGet { request, filter };
        let mut state = self.0.state.borrow_mut();
        if state.get_queue.is_empty() {
            if let Some(idx) = pending.find(&state.items) {
                state.hand_over(idx, &pending.request, now);
                state.get_queue.passby(now);
                state.settle(self.0.capacity, now);
                return;
            }
        }
        log::trace!("Store {} parked a get at {}", self.0.name, now);
        if state.get_queue.push(pending, now).is_err() {
            unreachable!("store queues are unbounded");
        }
    }

    /// Stores `item` once there is room for it.
    pub fn put(&self, item: T, request: Continuation) {
        request.set_source(self.source());
        let now = request.now();
        let mut state = self.0.state.borrow_mut();
        if state.put_queue.is_empty() && state.items.len() < self.0.capacity {
            state.items.push_back(item);
            request.cancel_renege_clauses();
            request.schedule_at(now);
            state.put_queue.passby(now);
            state.settle(self.0.capacity, now);
            return;
        }
        log::trace!("Store {} parked a put at {}", self.0.name, now);
        if state.put_queue.push(PendingPut { request, item }, now).is_err() {
            unreachable!("store queues are unbounded");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn request() -> Continuation {
        Continuation::new(Weak::new(), None, 0.0)
    }

    fn item(request: &Continuation) -> Option<u32> {
        request.message().item::<u32>().map(|item| *item)
    }

    #[test]
    fn test_zero_capacity() {
        assert!(Store::<u32>::new("none", 0).is_err());
    }

    #[test]
    fn test_oldest_item_first() {
        let store = Store::new("shelf", 3).unwrap();
        store.put(1_u32, request());
        store.put(2_u32, request());
        assert_eq!(store.current(), 2);
        let get = request();
        store.get(None, get.clone());
        assert_eq!(item(&get), Some(1));
        assert_eq!(get.deliver_at(), Some(0.0));
        assert_eq!(store.current(), 1);
    }

    #[test]
    fn test_filtered_get_waits_for_match() {
        let store = Store::new("shelf", 3).unwrap();
        store.put(1_u32, request());
        let even = request();
        store.get(Some(Box::new(|item: &u32| item % 2 == 0)), even.clone());
        assert_eq!(even.deliver_at(), None);
        let any = request();
        store.get(None, any.clone());
        assert_eq!(any.deliver_at(), None);
        store.put(4_u32, request());
        assert_eq!(item(&even), Some(4));
        assert_eq!(item(&any), Some(1));
        assert_eq!(store.current(), 0);
    }

    #[test]
    fn test_put_waits_for_room() {
        let store = Store::new("slot", 1).unwrap();
        store.put(7_u32, request());
        let blocked = request();
        store.put(8_u32, blocked.clone());
        assert_eq!(blocked.deliver_at(), None);
        assert_eq!(store.put_stats().current(), 1);
        let get = request();
        store.get(None, get.clone());
        assert_eq!(item(&get), Some(7));
        assert_eq!(blocked.deliver_at(), Some(0.0));
        assert_eq!(store.current(), 1);
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_cancelled_get_is_skipped() {
        let store = Store::new("shelf", 2).unwrap();
        let (first, second) = (request(), request());
        store.get(None, first.clone());
        store.get(None, second.clone());
        first.cancel();
        store.put(3_u32, request());
        assert!(first.is_cancelled());
        assert_eq!(item(&second), Some(3));
    }
}
