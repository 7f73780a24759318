//! Storage backends that workloads run against.
//!
//! A [`Backend`] provides the operations a workload is composed of. Each operation runs on behalf
//! of a single worker, using the worker's record, ID generator and random stream, and reports
//! whether it succeeded. Failed operations are logged by the backend and excluded from the latency
//! statistics.

use std::fmt::Debug;
use std::sync::Arc;

use keybench_core::IdGenerator;
use rand::rngs::SmallRng;

use crate::config;
use crate::record::Person;

mod in_memory;

pub use in_memory::InMemoryBackend;

/// A shared handle to a backend.
pub type BoxedBackend = Arc<dyn Backend>;

/// Operations of a storage backend.
///
/// Methods are called concurrently from all workers.
pub trait Backend: Debug + Send + Sync + 'static {
    /// Short name of the backend for logs and reports.
    fn name(&self) -> &'static str;

    /// Randomises `record` and inserts it with an ID from [`get_new`].
    ///
    /// [`get_new`]: keybench_core::Generator::get_new
    fn insert_record(&self, record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool;

    /// Sets the balance of the record with an ID from [`get_existing`] to a random value.
    ///
    /// [`get_existing`]: keybench_core::Generator::get_existing
    fn update_record(&self, record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool;

    /// Fetches and decodes the record with an ID from [`get_existing`].
    ///
    /// [`get_existing`]: keybench_core::Generator::get_existing
    fn read_record(&self, record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool;

    /// Fetches and decodes all records with an age greater than 45 and less than 75.
    fn read_range(&self, record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool;

    /// Fetches and decodes the record with the highest ID.
    fn read_most_recent(
        &self,
        record: &mut Person,
        ids: &mut IdGenerator,
        rng: &mut SmallRng,
    ) -> bool;

    /// Returns the highest ID in the backend.
    ///
    /// Fails if the backend holds no records.
    fn max_id(&self) -> anyhow::Result<u64>;
}

/// Creates the backend described by `config`.
///
/// Preloaded records are created with `padding` bytes of binary padding.
pub fn from_config(config: &config::Backend, padding: usize) -> BoxedBackend {
    match *config {
        config::Backend::Memory { preload } => {
            let backend = InMemoryBackend::new();
            if preload > 0 {
                backend.preload(preload, padding);
                tracing::info!(records = preload, "preloaded in-memory backend");
            }
            Arc::new(backend)
        }
    }
}
