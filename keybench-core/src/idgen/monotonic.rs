use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Generator;

/// Returns increasing, ordered IDs.
///
/// [`get_new`](Generator::get_new) increments the shared counter and returns the new value,
/// [`get_existing`](Generator::get_existing) returns the current value without changing it.
/// All generators from the same [`MonotonicSource`] share that counter, so no two calls to
/// `get_new` ever return the same ID.
#[derive(Debug)]
pub struct Monotonic {
    count: Arc<AtomicU64>,
}

impl Generator for Monotonic {
    fn get_new(&mut self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get_existing(&mut self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Creates linked instances of [`Monotonic`].
#[derive(Clone, Debug)]
pub struct MonotonicSource {
    count: Arc<AtomicU64>,
}

impl MonotonicSource {
    /// Creates a source whose first new ID is `count + 1`.
    pub fn new(count: u64) -> Self {
        Self {
            count: Arc::new(AtomicU64::new(count)),
        }
    }

    /// Returns the most recently issued ID.
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns a generator operating on the shared counter.
    pub fn new_generator(&self) -> Monotonic {
        Monotonic {
            count: Arc::clone(&self.count),
        }
    }
}
