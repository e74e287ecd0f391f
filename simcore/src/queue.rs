use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::Time;

/// Entry stored in the event queue: a value together with its delivery time and the sequence
/// number assigned at insertion.
#[derive(Debug)]
struct EventEntry<T> {
    key: Reverse<(OrderedFloat<Time>, u64)>,
    value: T,
}

impl<T> PartialEq for EventEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for EventEntry<T> {}

impl<T> PartialOrd for EventEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EventEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Priority queue of future events ordered by delivery time.
///
/// Events with equal timestamps come out in the order they were inserted, which makes every run
/// with the same inputs deterministic.
///
/// # Examples
///
/// ```
/// # use simcore::EventQueue;
/// let mut queue = EventQueue::default();
/// queue.insert(2.0, "late");
/// queue.insert(1.0, "first");
/// queue.insert(1.0, "second");
/// assert_eq!(queue.remove_min(), Some((1.0, "first")));
/// assert_eq!(queue.remove_min(), Some((1.0, "second")));
/// assert_eq!(queue.remove_min(), Some((2.0, "late")));
/// assert_eq!(queue.remove_min(), None);
/// ```
#[derive(Debug)]
pub struct EventQueue<T> {
    heap: BinaryHeap<EventEntry<T>>,
    next_seq: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> EventQueue<T> {
    /// Inserts `value` to be delivered at time `at`.
    pub fn insert(&mut self, at: Time, value: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(EventEntry {
            key: Reverse((OrderedFloat(at), seq)),
            value,
        });
    }

    /// Removes and returns the earliest event, or `None` if the queue is empty.
    pub fn remove_min(&mut self) -> Option<(Time, T)> {
        self.heap.pop().map(|entry| {
            let Reverse((at, _)) = entry.key;
            (at.into_inner(), entry.value)
        })
    }

    /// Returns the earliest event without removing it.
    #[must_use]
    pub fn peek_min(&self) -> Option<(Time, &T)> {
        self.heap.peek().map(|entry| {
            let Reverse((at, _)) = entry.key;
            (at.into_inner(), &entry.value)
        })
    }

    /// Delivery time of the earliest event.
    #[must_use]
    pub fn next_time(&self) -> Option<Time> {
        self.peek_min().map(|(at, _)| at)
    }

    /// Number of events waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Checks if there are no more events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_entry_cmp() {
        let entry = |at: f64, seq: u64| EventEntry {
            key: Reverse((OrderedFloat(at), seq)),
            value: (),
        };
        assert_eq!(entry(1.0, 0).cmp(&entry(1.0, 0)), Ordering::Equal);
        assert_eq!(entry(0.0, 5).cmp(&entry(1.0, 0)), Ordering::Greater);
        assert_eq!(entry(2.0, 0).cmp(&entry(1.0, 3)), Ordering::Less);
        assert_eq!(entry(1.0, 0).cmp(&entry(1.0, 1)), Ordering::Greater);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = EventQueue::default();
        assert!(queue.peek_min().is_none());
        queue.insert(3.0, 'a');
        queue.insert(1.5, 'b');
        assert_eq!(queue.peek_min(), Some((1.5, &'b')));
        assert_eq!(queue.next_time(), Some(1.5));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.remove_min(), Some((1.5, 'b')));
        assert_eq!(queue.peek_min(), Some((3.0, &'a')));
    }

    #[test]
    fn test_ties_are_fifo_across_interleaved_inserts() {
        let mut queue = EventQueue::default();
        queue.insert(5.0, 0);
        queue.insert(1.0, 1);
        queue.insert(5.0, 2);
        assert_eq!(queue.remove_min(), Some((1.0, 1)));
        queue.insert(5.0, 3);
        queue.insert(1.0, 4);
        let rest: Vec<_> = std::iter::from_fn(|| queue.remove_min()).collect();
        assert_eq!(rest, vec![(1.0, 4), (5.0, 0), (5.0, 2), (5.0, 3)]);
        assert!(queue.is_empty());
    }

    #[quickcheck]
    fn removal_is_ordered_by_time_then_insertion(times: Vec<u8>) -> bool {
        let mut queue = EventQueue::default();
        for (order, &time) in times.iter().enumerate() {
            queue.insert(Time::from(time), order);
        }
        let removed: Vec<_> = std::iter::from_fn(|| queue.remove_min()).collect();
        removed.len() == times.len()
            && removed
                .windows(2)
                .all(|w| w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1))
    }
}
