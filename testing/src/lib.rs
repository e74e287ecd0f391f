//! Helpers shared by the tests of the simulation crates.

#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::distributions::Distribution;

/// Logger capturing log lines in memory.
pub mod logger;

/// Ordered log of `(time, label)` entries recorded by callbacks under test.
///
/// Clones share the same log, so a trace can be handed to several actors and inspected after
/// the run.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: Rc<RefCell<Vec<(f64, String)>>>,
}

impl Trace {
    /// Constructs an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record<S: Into<String>>(&self, time: f64, label: S) {
        self.entries.borrow_mut().push((time, label.into()));
    }

    /// All entries in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<(f64, String)> {
        self.entries.borrow().clone()
    }

    /// Labels in recording order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, label)| label.clone())
            .collect()
    }

    /// Times at which `label` was recorded.
    #[must_use]
    pub fn times_of(&self, label: &str) -> Vec<f64> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, l)| l == label)
            .map(|(time, _)| *time)
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Checks if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// This distribution cycles through a fixed list of values, ignoring the random number
/// generator.
///
/// This is meant for testing: it makes inter-arrival or service times predictable while the
/// code under test still samples them through the [`Distribution`] interface.
#[derive(Debug)]
pub struct CyclicDistribution<T> {
    values: Vec<T>,
    next: Cell<usize>,
}

impl<T> CyclicDistribution<T> {
    /// Constructs a distribution returning `values` in order, starting over after the last one.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    #[must_use]
    pub fn new(values: Vec<T>) -> Self {
        assert!(!values.is_empty(), "at least one value is required");
        Self {
            values,
            next: Cell::new(0),
        }
    }
}

impl<T: Copy> Distribution<T> for CyclicDistribution<T> {
    fn sample<R: rand::Rng + ?Sized>(&self, _: &mut R) -> T {
        let idx = self.next.get();
        self.next.set((idx + 1) % self.values.len());
        self.values[idx]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_trace() {
        let trace = Trace::new();
        let shared = trace.clone();
        shared.record(1.0, "a");
        trace.record(2.0, "b");
        shared.record(3.0, "a");
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.labels(), vec!["a", "b", "a"]);
        assert_eq!(trace.times_of("a"), vec![1.0, 3.0]);
        assert_eq!(trace.entries()[1], (2.0, String::from("b")));
    }

    #[test]
    fn test_cyclic_distribution() {
        let mut rng = StepRng::new(0, 1);
        let dist = CyclicDistribution::new(vec![1.5, 2.5]);
        let samples: Vec<f64> = (0..5).map(|_| dist.sample(&mut rng)).collect();
        assert_eq!(samples, vec![1.5, 2.5, 1.5, 2.5, 1.5]);
    }
}
