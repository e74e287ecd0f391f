use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::continuation::Contended;
use crate::{Continuation, Error, Population, Result, Source, SourceKind, Time, WaitQueue};

struct Pending {
    request: Continuation,
    amount: f64,
}

struct State {
    available: f64,
    put_queue: WaitQueue<Pending>,
    get_queue: WaitQueue<Pending>,
}

impl State {
    /// Satisfies waiting puts from the head of the queue while there is room.
    fn progress_put(&mut self, capacity: f64, now: Time) -> bool {
        let mut progressed = false;
        loop {
            let ready = match self.put_queue.top() {
                None => break,
                Some(p) => !p.request.is_pending() || p.amount + self.available <= capacity,
            };
            if !ready {
                break;
            }
            if let Some(p) = self.put_queue.shift(now) {
                if p.request.is_pending() {
                    self.available += p.amount;
                    p.request.cancel_renege_clauses();
                    p.request.schedule_at(now);
                    progressed = true;
                }
            }
        }
        progressed
    }

    /// Satisfies waiting gets from the head of the queue while there is enough content.
    fn progress_get(&mut self, now: Time) -> bool {
        let mut progressed = false;
        loop {
            let ready = match self.get_queue.top() {
                None => break,
                Some(p) => !p.request.is_pending() || p.amount <= self.available,
            };
            if !ready {
                break;
            }
            if let Some(p) = self.get_queue.shift(now) {
                if p.request.is_pending() {
                    self.available -= p.amount;
                    p.request.cancel_renege_clauses();
                    p.request.schedule_at(now);
                    progressed = true;
                }
            }
        }
        progressed
    }

    fn settle(&mut self, capacity: f64, now: Time) {
        while self.progress_put(capacity, now) | self.progress_get(now) {}
    }
}

struct BufferCell {
    this: Weak<BufferCell>,
    name: Rc<str>,
    capacity: f64,
    state: RefCell<State>,
}

impl Contended for BufferCell {
    fn reevaluate(&self, now: Time) {
        self.state.borrow_mut().settle(self.capacity, now);
    }
}

/// Container holding a continuous quantity, such as liters of fuel or plates of food.
///
/// Both sides wait in arrival order: a request at the head of a queue that cannot be satisfied
/// blocks the requests behind it.
#[derive(Clone)]
pub struct Buffer(Rc<BufferCell>);

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.0.name)
            .field("capacity", &self.0.capacity)
            .field("available", &self.current())
            .finish()
    }
}

impl Buffer {
    /// Creates a buffer holding `initial` out of `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is not positive, or `initial` is
    /// outside of `[0, capacity]`.
    pub fn new(name: &str, capacity: f64, initial: f64) -> Result<Self> {
        if !(capacity > 0.0 && capacity.is_finite()) {
            return Err(Error::capacity(name, "capacity must be positive"));
        }
        if !(0.0..=capacity).contains(&initial) {
            return Err(Error::capacity(
                name,
                format!("initial content {} outside of [0, {}]", initial, capacity),
            ));
        }
        Ok(Self(Rc::new_cyclic(|this| BufferCell {
            this: Weak::clone(this),
            name: Rc::from(name),
            capacity,
            state: RefCell::new(State {
                available: initial,
                put_queue: WaitQueue::new(format!("{} put", name)),
                get_queue: WaitQueue::new(format!("{} get", name)),
            }),
        })))
    }

    /// Name of the buffer.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Amount currently available.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.0.state.borrow().available
    }

    /// Capacity.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.0.capacity
    }

    /// Fill level in percent.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.current() * 100.0 / self.0.capacity
    }

    /// Statistics of put requests waiting for room.
    #[must_use]
    pub fn put_stats(&self) -> Ref<'_, Population> {
        Ref::map(self.0.state.borrow(), |state| state.put_queue.stats())
    }

    /// Statistics of get requests waiting for content.
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
        Source::contended(SourceKind::Buffer, Rc::clone(&self.0.name), this)
    }

    /// Takes `amount` out of the buffer once it is available.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is negative or NaN.
    pub fn get(&self, amount: f64, request: Continuation) {
        assert!(amount >= 0.0, "buffer amount must be non-negative");
        request.set_source(self.source());
        let now = request.now();
        let mut state = self.0.state.borrow_mut();
        if state.get_queue.is_empty() && amount <= state.available {
            state.available -= amount;
            request.cancel_renege_clauses();
            request.schedule_at(now);
            state.get_queue.passby(now);
            state.settle(self.0.capacity, now);
            return;
        }
        log::trace!("Buffer {} parked a get of {} at {}", self.0.name, amount, now);
        if state.get_queue.push(Pending { request, amount }, now).is_err() {
            unreachable!("buffer queues are unbounded");
        }
    }

    /// Puts `amount` into the buffer once there is room for it.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is negative or NaN.
    pub fn put(&self, amount: f64, request: Continuation) {
        assert!(amount >= 0.0, "buffer amount must be non-negative");
        request.set_source(self.source());
        let now = request.now();
        let mut state = self.0.state.borrow_mut();
        if state.put_queue.is_empty() && amount + state.available <= self.0.capacity {
            state.available += amount;
            request.cancel_renege_clauses();
            request.schedule_at(now);
            state.put_queue.passby(now);
            state.settle(self.0.capacity, now);
            return;
        }
        log::trace!("Buffer {} parked a put of {} at {}", self.0.name, amount, now);
        if state.put_queue.push(Pending { request, amount }, now).is_err() {
            unreachable!("buffer queues are unbounded");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rstest::*;

    #[fixture]
    fn buffer() -> Buffer {
        Buffer::new("tank", 10.0, 4.0).unwrap()
    }

    fn request() -> Continuation {
        Continuation::new(Weak::new(), None, 0.0)
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(Buffer::new("empty", 0.0, 0.0).is_err());
        assert!(Buffer::new("overfull", 1.0, 2.0).is_err());
        assert!(Buffer::new("negative", 1.0, -1.0).is_err());
    }

    #[rstest]
    fn test_immediate_get_and_put(buffer: Buffer) {
        let get = request();
        buffer.get(3.0, get.clone());
        assert_eq!(get.deliver_at(), Some(0.0));
        assert!(approx_eq!(f64, buffer.current(), 1.0));
        let put = request();
        buffer.put(9.0, put.clone());
        assert_eq!(put.deliver_at(), Some(0.0));
        assert!(approx_eq!(f64, buffer.percentage(), 100.0));
        assert_eq!(buffer.get_stats().duration_series().count(), 1);
    }

    #[rstest]
    fn test_head_of_line_blocking(buffer: Buffer) {
        let (big, small) = (request(), request());
        buffer.get(5.0, big.clone());
        buffer.get(1.0, small.clone());
        assert_eq!(big.deliver_at(), None);
        assert_eq!(small.deliver_at(), None);
        assert!(approx_eq!(f64, buffer.current(), 4.0));
        buffer.put(2.0, request());
        assert_eq!(big.deliver_at(), Some(0.0));
        assert_eq!(small.deliver_at(), Some(0.0));
        assert!(approx_eq!(f64, buffer.current(), 0.0));
    }

    #[rstest]
    fn test_cancelled_waiter_unblocks_queue(buffer: Buffer) {
        let (big, small) = (request(), request());
        buffer.get(5.0, big.clone());
        buffer.get(1.0, small.clone());
        big.cancel();
        assert_eq!(small.deliver_at(), Some(0.0));
        assert!(approx_eq!(f64, buffer.current(), 3.0));
        assert_eq!(buffer.get_stats().current(), 0);
    }

    #[rstest]
    fn test_waiting_put(buffer: Buffer) {
        let put = request();
        buffer.put(8.0, put.clone());
        assert_eq!(put.deliver_at(), None);
        buffer.get(2.0, request());
        assert_eq!(put.deliver_at(), Some(0.0));
        assert!(approx_eq!(f64, buffer.current(), 10.0));
        assert_eq!(buffer.size(), 10.0);
    }
}
