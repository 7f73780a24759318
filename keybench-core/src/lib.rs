//! The core of the keybench load generator.
//!
//! A [`Plan`] runs a fixed sequence of operations on a pool of worker threads until it is stopped
//! or an operation ceiling is reached, timing every successful operation.
//!
//! Keys for those operations come from the [`idgen`] family of generators. They produce sequential,
//! uniformly random or *zipfian* keys, the latter heavily skewed towards the most recently
//! inserted records.
//!
//! Latencies are collected in [`stats::Histogram`]s which are split into one child per worker,
//! so the hot path never contends on shared statistics, and merged exactly once at the end.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod idgen;
pub mod plan;
pub mod stats;

pub use crate::error::IdError;
pub use crate::idgen::{Generator, IdGenerator, IdSource};
pub use crate::plan::{OperationFn, OperationResult, Plan, RecordSource, StopHandle};
pub use crate::stats::{DurationObserver, Histogram, HistogramOptions};
