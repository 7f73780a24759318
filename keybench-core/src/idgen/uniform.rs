use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{Generator, assert_existing};
use crate::error::IdError;

/// Returns existing IDs evenly distributed between 1 and the shared maximum ID.
///
/// Reading uniformly from the entire key space causes a high number of cache misses. The modulo
/// mapping is slightly biased for a maximum that is not a power of two, which is irrelevant for
/// benchmarking purposes.
#[derive(Debug)]
pub struct Uniform {
    max: Arc<AtomicU64>,
    rng: SmallRng,
}

impl Generator for Uniform {
    fn get_new(&mut self) -> u64 {
        self.max.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// # Panics
    ///
    /// Panics if the maximum ID is zero.
    fn get_existing(&mut self) -> u64 {
        let max = assert_existing(self.max.load(Ordering::SeqCst));
        self.rng.random::<u64>() % max + 1
    }
}

/// Creates linked instances of [`Uniform`] sharing a maximum ID.
#[derive(Clone, Debug)]
pub struct UniformSource {
    max: Arc<AtomicU64>,
}

impl UniformSource {
    /// Creates a source for a key space of `1..=max`.
    ///
    /// Returns [`IdError::EmptyKeySpace`] if `max` is zero.
    pub fn new(max: u64) -> Result<Self, IdError> {
        if max == 0 {
            return Err(IdError::EmptyKeySpace);
        }

        Ok(Self {
            max: Arc::new(AtomicU64::new(max)),
        })
    }

    /// Returns the current maximum ID.
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::SeqCst)
    }

    /// Returns a generator with its own random stream, operating on the shared maximum ID.
    pub fn new_generator(&self) -> Uniform {
        Uniform {
            max: Arc::clone(&self.max),
            rng: SmallRng::seed_from_u64(rand::random()),
        }
    }
}
