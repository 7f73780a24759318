//! Generators for record IDs.
//!
//! Workloads need different key access patterns to stress a backend realistically:
//!
//!  - [`Monotonic`] hands out strictly increasing IDs, for cold inserts.
//!  - [`Uniform`] reads random existing records across the whole key space, which causes a high
//!    number of cache misses.
//!  - [`Zipfian`] reads existing records heavily skewed towards the most recently inserted ones,
//!    which are probably still in the cache.
//!  - [`Persistent`] wraps any of the above and returns the same existing ID for several
//!    consecutive calls, so a chain of operations can act on one record.
//!
//! Every worker obtains its own generator from a shared [`IdSource`]. Generators from the same
//! source share one atomic counter, which is the only state shared between workers.

mod monotonic;
mod persistent;
mod uniform;
mod zipfian;

pub use monotonic::{Monotonic, MonotonicSource};
pub use persistent::{Persistent, PersistentSource};
pub use uniform::{Uniform, UniformSource};
pub use zipfian::{SkewedZipf, Zipfian, ZipfianSource};

/// Produces IDs for operations on records.
pub trait Generator {
    /// Returns a brand-new ID for a record that is about to be created.
    fn get_new(&mut self) -> u64;

    /// Returns the ID of a record that already exists.
    fn get_existing(&mut self) -> u64;
}

/// A per-worker ID generator.
///
/// See the [module documentation](self) for the available strategies.
#[derive(Debug)]
pub enum IdGenerator {
    /// See [`Monotonic`].
    Monotonic(Monotonic),
    /// See [`Uniform`].
    Uniform(Uniform),
    /// See [`Zipfian`].
    Zipfian(Zipfian),
    /// See [`Persistent`].
    Persistent(Box<Persistent>),
}

impl Generator for IdGenerator {
    fn get_new(&mut self) -> u64 {
        match self {
            Self::Monotonic(generator) => generator.get_new(),
            Self::Uniform(generator) => generator.get_new(),
            Self::Zipfian(generator) => generator.get_new(),
            Self::Persistent(generator) => generator.get_new(),
        }
    }

    fn get_existing(&mut self) -> u64 {
        match self {
            Self::Monotonic(generator) => generator.get_existing(),
            Self::Uniform(generator) => generator.get_existing(),
            Self::Zipfian(generator) => generator.get_existing(),
            Self::Persistent(generator) => generator.get_existing(),
        }
    }
}

/// Creates linked [`IdGenerator`]s sharing the same underlying counter.
#[derive(Clone, Debug)]
pub enum IdSource {
    /// See [`MonotonicSource`].
    Monotonic(MonotonicSource),
    /// See [`UniformSource`].
    Uniform(UniformSource),
    /// See [`ZipfianSource`].
    Zipfian(ZipfianSource),
    /// See [`PersistentSource`].
    Persistent(PersistentSource),
}

impl IdSource {
    /// Returns a new generator for exclusive use by one worker.
    pub fn new_generator(&self) -> IdGenerator {
        match self {
            Self::Monotonic(source) => IdGenerator::Monotonic(source.new_generator()),
            Self::Uniform(source) => IdGenerator::Uniform(source.new_generator()),
            Self::Zipfian(source) => IdGenerator::Zipfian(source.new_generator()),
            Self::Persistent(source) => IdGenerator::Persistent(Box::new(source.new_generator())),
        }
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::Monotonic(MonotonicSource::new(0))
    }
}

impl From<MonotonicSource> for IdSource {
    fn from(source: MonotonicSource) -> Self {
        Self::Monotonic(source)
    }
}

impl From<UniformSource> for IdSource {
    fn from(source: UniformSource) -> Self {
        Self::Uniform(source)
    }
}

impl From<ZipfianSource> for IdSource {
    fn from(source: ZipfianSource) -> Self {
        Self::Zipfian(source)
    }
}

impl From<PersistentSource> for IdSource {
    fn from(source: PersistentSource) -> Self {
        Self::Persistent(source)
    }
}

/// Panics with a descriptive message if there are no existing records to sample from.
fn assert_existing(max: u64) -> u64 {
    assert!(max > 0, "existing ID requested from an empty key space");
    max
}
