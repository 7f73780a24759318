use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;

use crate::idgen::IdGenerator;
use crate::stats::{DurationObserver, Histogram};

/// A backend operation run by every worker of a [`Plan`](super::Plan).
///
/// The operation receives the worker's private record, ID generator and random stream. It returns
/// `false` if the operation failed, in which case its latency is discarded and it does not count
/// towards the operation ceiling. Implementations should log the cause of a failure themselves.
pub type OperationFn<R> = Arc<dyn Fn(&mut R, &mut IdGenerator, &mut SmallRng) -> bool + Send + Sync>;

/// An [`OperationFn`] together with its statistics.
///
/// Operations sharing a name share the same observer and histogram.
pub(crate) struct Operation<R> {
    pub name: String,
    pub callback: OperationFn<R>,
    pub observer: Arc<DurationObserver>,
    pub histogram: Arc<Histogram>,
    /// Index of the histogram child within a worker.
    pub slot: usize,
}

impl<R> fmt::Debug for Operation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// The latency histogram of all calls to a named operation.
#[derive(Clone, Debug)]
pub struct OperationResult {
    /// Name the operation was added with.
    pub name: String,
    /// Merged latencies in milliseconds.
    pub histogram: Arc<Histogram>,
}
