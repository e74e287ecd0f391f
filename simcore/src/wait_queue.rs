use std::collections::VecDeque;

use crate::{Population, Time};

/// Holding area for entries blocked on a resource.
///
/// Every entry remembers when it arrived, and each arrival and departure is fed into a
/// [`Population`], so the queue keeps its own length and waiting time statistics.
///
/// Like [`VecDeque`], it can be used from both ends: resources serving in arrival order use
/// [`push`](Self::push) and [`shift`](Self::shift), while last-come-first-served resources
/// use [`push`](Self::push) and [`pop`](Self::pop).
/// By default, the capacity is equal to [`usize::MAX`], which makes it unlimited in practice.
///
/// # Examples
///
/// ```
/// # use simcore::WaitQueue;
/// let mut queue: WaitQueue<&str> = WaitQueue::bounded(2);
/// assert!(queue.push("a", 0.0).is_ok());
/// assert!(queue.push("b", 1.0).is_ok());
/// assert_eq!(queue.push("c", 1.0), Err("c"));
/// assert_eq!(queue.shift(3.0), Some("a"));
/// assert_eq!(queue.stats().current(), 1);
/// ```
#[derive(Debug)]
pub struct WaitQueue<T> {
    entries: VecDeque<(T, Time)>,
    capacity: usize,
    stats: Population,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new("WaitQueue")
    }
}

impl<T> WaitQueue<T> {
    /// Creates an unbounded queue.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: usize::MAX,
            stats: Population::new(name),
        }
    }

    /// Creates a queue that holds at most `capacity` entries.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Changes the maximum number of entries.
    #[must_use]
    pub fn with_capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Appends `value` at the back.
    ///
    /// # Errors
    ///
    /// Gives `value` back if the queue is full.
    pub fn push(&mut self, value: T, timestamp: Time) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.entries.push_back((value, timestamp));
        self.stats.enter(timestamp);
        Ok(())
    }

    /// Inserts `value` at the front.
    ///
    /// # Errors
    ///
    /// Gives `value` back if the queue is full.
    pub fn unshift(&mut self, value: T, timestamp: Time) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.entries.push_front((value, timestamp));
        self.stats.enter(timestamp);
        Ok(())
    }

    /// Removes the front entry, recording its departure at `timestamp`.
    pub fn shift(&mut self, timestamp: Time) -> Option<T> {
        let (value, entered_at) = self.entries.pop_front()?;
        self.stats.leave(entered_at, timestamp);
        Some(value)
    }

    /// Removes the back entry, recording its departure at `timestamp`.
    pub fn pop(&mut self, timestamp: Time) -> Option<T> {
        let (value, entered_at) = self.entries.pop_back()?;
        self.stats.leave(entered_at, timestamp);
        Some(value)
    }

    /// Front entry.
    #[must_use]
    pub fn top(&self) -> Option<&T> {
        self.entries.front().map(|(value, _)| value)
    }

    /// Back entry.
    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.entries.back().map(|(value, _)| value)
    }

    /// Records an entity that was served without waiting.
    pub fn passby(&mut self, timestamp: Time) {
        self.stats.enter(timestamp);
        self.stats.leave(timestamp, timestamp);
    }

    /// Closes the statistics at `timestamp`.
    pub fn finalize(&mut self, timestamp: Time) {
        self.stats.finalize(timestamp);
    }

    /// Clears statistics but keeps the waiting entries.
    pub fn reset(&mut self) {
        self.stats.reset();
    }

    /// Clears statistics and drops all waiting entries.
    pub fn clear(&mut self) {
        self.reset();
        self.entries.clear();
    }

    /// Average queue length and average waiting time.
    #[must_use]
    pub fn report(&self) -> (f64, f64) {
        (
            self.stats.size_series().average(),
            self.stats.duration_series().average(),
        )
    }

    /// Statistics of the entries that went through the queue.
    #[must_use]
    pub fn stats(&self) -> &Population {
        &self.stats
    }

    /// Whether the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the queue reached its maximum length.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over waiting entries from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(value, _)| value)
    }
}
