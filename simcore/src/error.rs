/// Errors reported while configuring a simulation.
///
/// Contention at run time (full queues, double cancellation, exceeded budgets) is part of normal
/// operation and is never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Run parameters that cannot be simulated.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    /// A resource constructed with a capacity it cannot operate with.
    #[error("invalid capacity of `{resource}`: {reason}")]
    InvalidCapacity {
        /// Name of the resource.
        resource: String,
        /// What is wrong with the capacity.
        reason: String,
    },

    /// Histogram with an empty range or no buckets.
    #[error("invalid histogram layout: [{lower}, {upper}) with {num_buckets} buckets")]
    InvalidHistogram {
        /// Lower bound of the range.
        lower: f64,
        /// Upper bound of the range.
        upper: f64,
        /// Requested number of buckets.
        num_buckets: usize,
    },

    /// Distribution parameters rejected by the sampler.
    #[error("invalid parameters of {distribution} distribution: {reason}")]
    InvalidDistribution {
        /// Name of the distribution.
        distribution: &'static str,
        /// Reason given by the sampler.
        reason: String,
    },
}

impl Error {
    pub(crate) fn capacity<R: Into<String>, S: Into<String>>(resource: R, reason: S) -> Self {
        Self::InvalidCapacity {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
