//! Latency statistics for running plans.
//!
//! [`DurationObserver`] is a lock-free running counter feeding the live status line, while
//! [`Histogram`] collects the exact latency distribution reported once a plan has finished.

mod histogram;
mod observer;

pub use histogram::{Bucket, Histogram, HistogramChild, HistogramOptions};
pub use observer::DurationObserver;
