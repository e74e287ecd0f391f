//! Running statistics over weighted value streams.
//!
//! Mean and variance are updated incrementally (West's weighted variant of Welford's algorithm),
//! so no samples need to be kept in memory.

use serde::Serialize;

use crate::{Error, Result, Time};

/// Fixed-width histogram with two extra buckets for values outside of the configured range.
///
/// Bucket `0` collects values below `lower`, the last bucket collects values at or above `upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    lower: f64,
    upper: f64,
    bucket_size: f64,
    buckets: Vec<f64>,
}

impl Histogram {
    /// Creates a histogram with `num_buckets` equally sized buckets covering `[lower, upper)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHistogram`] if the range is empty or there are no buckets.
    pub fn new(lower: f64, upper: f64, num_buckets: usize) -> Result<Self> {
        if num_buckets == 0 || !(lower < upper) || !lower.is_finite() || !upper.is_finite() {
            return Err(Error::InvalidHistogram {
                lower,
                upper,
                num_buckets,
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let bucket_size = (upper - lower) / num_buckets as f64;
        Ok(Self {
            lower,
            upper,
            bucket_size,
            buckets: vec![0.0; num_buckets + 2],
        })
    }

    fn record(&mut self, value: f64, weight: f64) {
        let last = self.buckets.len() - 1;
        let idx = if value < self.lower {
            0
        } else if value > self.upper {
            last
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = ((value - self.lower) / self.bucket_size).floor() as usize + 1;
            idx.min(last)
        };
        self.buckets[idx] += weight;
    }

    fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0.0);
    }

    /// Accumulated weights per bucket, including the underflow and overflow buckets.
    #[must_use]
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }
}

/// Accumulates count, sum, extremes, and weighted mean and variance of recorded values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSeries {
    name: String,
    count: usize,
    total_weight: f64,
    mean: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    sum: f64,
    histogram: Option<Histogram>,
}

impl Default for DataSeries {
    fn default() -> Self {
        Self::new("DataSeries")
    }
}

impl DataSeries {
    /// Creates an empty series.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            count: 0,
            total_weight: 0.0,
            mean: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            histogram: None,
        }
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clears all accumulated values. The histogram layout, if any, is kept.
    pub fn reset(&mut self) {
        let histogram = self.histogram.take().map(|mut h| {
            h.clear();
            h
        });
        *self = Self {
            histogram,
            ..Self::new(std::mem::take(&mut self.name))
        };
    }

    /// Starts recording a histogram over `[lower, upper)` with `num_buckets` buckets.
    ///
    /// # Errors
    ///
    /// See [`Histogram::new`].
    pub fn set_histogram(&mut self, lower: f64, upper: f64, num_buckets: usize) -> Result<()> {
        self.histogram = Some(Histogram::new(lower, upper, num_buckets)?);
        Ok(())
    }

    /// The histogram, if one was set up.
    #[must_use]
    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    /// Records `value` with weight `1`.
    pub fn record(&mut self, value: f64) {
        self.record_weighted(value, 1.0);
    }

    /// Records `value` with the given `weight`.
    pub fn record_weighted(&mut self, value: f64, weight: f64) {
        self.max = self.max.max(value);
        self.min = self.min.min(value);
        self.sum += value;
        self.count += 1;
        if let Some(histogram) = &mut self.histogram {
            histogram.record(value, weight);
        }
        self.total_weight += weight;
        if self.total_weight == 0.0 {
            return;
        }
        let last_mean = self.mean;
        self.mean = last_mean + (weight / self.total_weight) * (value - last_mean);
        self.sum_sq += weight * (value - last_mean) * (value - self.mean);
    }

    /// Number of recorded values.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Smallest recorded value (`+inf` when empty).
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest recorded value (`-inf` when empty).
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Difference between the largest and the smallest observation.
    #[must_use]
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Unweighted sum of recorded values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Sum of values multiplied by their weights.
    #[must_use]
    pub fn sum_weighted(&self) -> f64 {
        self.mean * self.total_weight
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weighted mean.
    #[must_use]
    pub fn average(&self) -> f64 {
        self.mean
    }

    /// Weighted population variance. `NaN` if nothing with a positive weight was recorded.
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.sum_sq / self.total_weight
    }

    /// Weighted standard deviation.
    #[must_use]
    pub fn deviation(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Turns point samples of a piecewise-constant signal into a series weighted by how long each
/// value was held.
///
/// A recorded value only contributes once the next one arrives (or the series is finalized),
/// because only then is its duration known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    data: DataSeries,
    last: Option<(Time, f64)>,
    points: Vec<(Time, f64)>,
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new("TimeSeries")
    }
}

impl TimeSeries {
    /// Creates an empty series labelled `name`.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            data: DataSeries::new(name),
            last: None,
            points: Vec::new(),
        }
    }

    /// Forgets all values, including the last held one.
    pub fn reset(&mut self) {
        self.data.reset();
        self.last = None;
        self.points.clear();
    }

    /// See [`DataSeries::set_histogram`].
    ///
    /// # Errors
    ///
    /// See [`Histogram::new`].
    pub fn set_histogram(&mut self, lower: f64, upper: f64, num_buckets: usize) -> Result<()> {
        self.data.set_histogram(lower, upper, num_buckets)
    }

    /// Records that the signal changed to `value` at `timestamp`.
    pub fn record(&mut self, value: f64, timestamp: Time) {
        if let Some((last_time, last_value)) = self.last {
            self.data.record_weighted(last_value, timestamp - last_time);
        }
        self.last = Some((timestamp, value));
        self.points.push((timestamp, value));
    }

    /// Closes the interval of the last held value at `timestamp`.
    ///
    /// Finalizing again at the same timestamp adds a zero-weight sample, which leaves the
    /// averages unchanged.
    pub fn finalize(&mut self, timestamp: Time) {
        if let Some((_, value)) = self.last {
            self.record(value, timestamp);
        }
    }

    /// Duration-weighted statistics.
    #[must_use]
    pub fn data(&self) -> &DataSeries {
        &self.data
    }

    /// All recorded `(timestamp, value)` points, in recording order.
    #[must_use]
    pub fn points(&self) -> &[(Time, f64)] {
        &self.points
    }

    /// Number of recorded points.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.count()
    }

    /// Smallest recorded value.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.data.min()
    }

    /// Largest recorded value.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.data.max()
    }

    /// Difference between the largest and the smallest value.
    #[must_use]
    pub fn range(&self) -> f64 {
        self.data.range()
    }

    /// Unweighted sum of the recorded values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// Time-weighted mean.
    #[must_use]
    pub fn average(&self) -> f64 {
        self.data.average()
    }

    /// Time-weighted variance of the values.
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.data.variance()
    }

    /// Time-weighted standard deviation of the values.
    #[must_use]
    pub fn deviation(&self) -> f64 {
        self.data.deviation()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn series() -> DataSeries {
        let mut series = DataSeries::new("values");
        for v in &[1.0, 2.0, 3.0, 4.0] {
            series.record(*v);
        }
        series
    }

    #[rstest]
    fn test_unweighted_summary(series: DataSeries) {
        assert_eq!(series.count(), 4);
        assert!(approx_eq!(f64, series.average(), 2.5, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.min(), 1.0));
        assert!(approx_eq!(f64, series.max(), 4.0));
        assert!(approx_eq!(f64, series.range(), 3.0));
        assert!(approx_eq!(f64, series.sum(), 10.0));
        assert!(approx_eq!(f64, series.variance(), 1.25, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.deviation(), 1.25_f64.sqrt(), epsilon = 1e-12));
    }

    #[rstest]
    fn test_reset_keeps_name(mut series: DataSeries) {
        series.reset();
        assert_eq!(series.name(), "values");
        assert_eq!(series.count(), 0);
        assert!(series.min().is_infinite());
        assert!(series.variance().is_nan());
    }

    #[test]
    fn test_weighted_mean() {
        let mut series = DataSeries::default();
        series.record_weighted(10.0, 3.0);
        series.record_weighted(20.0, 1.0);
        assert!(approx_eq!(f64, series.average(), 12.5, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.sum_weighted(), 50.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.variance(), 18.75, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.total_weight(), 4.0));
        assert_eq!(series.count(), 2);
    }

    #[test]
    fn test_zero_weight_does_not_move_mean() {
        let mut series = DataSeries::default();
        series.record_weighted(7.0, 0.0);
        assert!(approx_eq!(f64, series.average(), 0.0));
        series.record_weighted(3.0, 2.0);
        series.record_weighted(100.0, 0.0);
        assert!(approx_eq!(f64, series.average(), 3.0));
        assert!(approx_eq!(f64, series.max(), 100.0));
    }

    #[test]
    fn test_histogram() {
        let mut series = DataSeries::default();
        series.set_histogram(0.0, 10.0, 5).unwrap();
        for v in &[-1.0, 0.0, 1.9, 2.0, 9.99, 10.0, 11.0] {
            series.record(*v);
        }
        assert_eq!(
            series.histogram().unwrap().buckets(),
            &[1.0, 2.0, 1.0, 0.0, 0.0, 1.0, 2.0]
        );
        series.reset();
        assert!(series.histogram().unwrap().buckets().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_invalid_histogram() {
        assert!(Histogram::new(0.0, 10.0, 0).is_err());
        assert!(Histogram::new(10.0, 10.0, 3).is_err());
        assert!(Histogram::new(f64::NAN, 10.0, 3).is_err());
    }

    #[test]
    fn test_time_series_weights_by_duration() {
        let mut series = TimeSeries::default();
        series.record(1.0, 0.0);
        series.record(3.0, 2.0);
        series.record(0.0, 3.0);
        series.finalize(7.0);
        // 1 held for 2, 3 held for 1, 0 held for 4.
        assert!(approx_eq!(f64, series.average(), 5.0 / 7.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, series.data().total_weight(), 7.0));
        assert_eq!(series.points().len(), 4);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut series = TimeSeries::default();
        series.record(2.0, 1.0);
        series.record(4.0, 3.0);
        series.finalize(5.0);
        let average = series.average();
        let variance = series.variance();
        series.finalize(5.0);
        assert!(approx_eq!(f64, series.average(), average));
        assert!(approx_eq!(f64, series.variance(), variance));
    }

    #[test]
    fn test_finalize_empty_series() {
        let mut series = TimeSeries::default();
        series.finalize(10.0);
        assert_eq!(series.count(), 0);
        assert!(series.points().is_empty());
    }
}
