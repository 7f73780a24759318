//! Error types for setting up key generators.

use thiserror::Error;

/// Errors that can occur when configuring an ID generator source.
#[derive(Debug, Error)]
pub enum IdError {
    /// The key space has no records, so there is no existing ID to sample.
    #[error("key space is empty, existing IDs require a maximum ID of at least 1")]
    EmptyKeySpace,

    /// The parameters of a zipfian distribution are out of range.
    #[error("invalid zipf parameters: exponent {exponent} must be > 1, hot set {hot_set} must be >= 1")]
    InvalidZipf {
        /// The skew exponent.
        exponent: f64,
        /// The width of the hot set.
        hot_set: f64,
    },
}
