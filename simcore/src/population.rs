use serde::Serialize;

use crate::{DataSeries, TimeSeries, Time};

/// Tracks how many entities are inside something (a queue, a facility, a model) over time, and
/// how long each of them stayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Population {
    name: String,
    population: i64,
    size_series: TimeSeries,
    duration_series: DataSeries,
}

impl Default for Population {
    fn default() -> Self {
        Self::new("Population")
    }
}

impl Population {
    /// Creates empty statistics labelled `name`.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            size_series: TimeSeries::new(format!("{} size", name)),
            duration_series: DataSeries::new(format!("{} duration", name)),
            name,
            population: 0,
        }
    }

    /// Label of the statistics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drops everything recorded so far.
    pub fn reset(&mut self) {
        self.size_series.reset();
        self.duration_series.reset();
        self.population = 0;
    }

    /// Registers an arrival at `timestamp`.
    pub fn enter(&mut self, timestamp: Time) {
        self.population += 1;
        #[allow(clippy::cast_precision_loss)]
        self.size_series.record(self.population as f64, timestamp);
    }

    /// Registers a departure at `left_at` of an entity that arrived at `arrived_at`.
    pub fn leave(&mut self, arrived_at: Time, left_at: Time) {
        self.population -= 1;
        #[allow(clippy::cast_precision_loss)]
        self.size_series.record(self.population as f64, left_at);
        self.duration_series.record(left_at - arrived_at);
    }

    /// Current number of entities inside.
    #[must_use]
    pub fn current(&self) -> i64 {
        self.population
    }

    /// Closes the open size interval at `timestamp`.
    pub fn finalize(&mut self, timestamp: Time) {
        self.size_series.finalize(timestamp);
    }

    /// Population size weighted by time.
    #[must_use]
    pub fn size_series(&self) -> &TimeSeries {
        &self.size_series
    }

    /// Time spent inside, one sample per departure.
    #[must_use]
    pub fn duration_series(&self) -> &DataSeries {
        &self.duration_series
    }

    /// Mutable access to the size series, e.g., to set up a histogram.
    pub fn size_series_mut(&mut self) -> &mut TimeSeries {
        &mut self.size_series
    }

    /// Mutable access to the duration series, e.g., to set up a histogram.
    pub fn duration_series_mut(&mut self) -> &mut DataSeries {
        &mut self.duration_series
    }
}
