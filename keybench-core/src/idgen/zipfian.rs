use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;

use super::{Generator, assert_existing};
use crate::error::IdError;

/// Default skew exponent of [`ZipfianSource`].
pub const DEFAULT_EXPONENT: f64 = 2.5;
/// Default hot set width of [`ZipfianSource`].
pub const DEFAULT_HOT_SET: f64 = 50.0;

/// A Zipf-like distribution over `0..=imax` with `P(k) ∝ (v + k)^-s`.
///
/// `s` is the skew exponent and `v` the width of the hot set: the first `v` values are sampled
/// with similar probability before the power law decay sets in. Unlike [`rand_distr::Zipf`], this
/// supports a hot set and starts at zero.
///
/// Sampling uses rejection-inversion as described in W. Hörmann, G. Derflinger: "Rejection-Inversion
/// to Generate Variates from Monotone Discrete Distributions".
#[derive(Clone, Copy, Debug)]
pub struct SkewedZipf {
    imax: f64,
    v: f64,
    q: f64,
    s: f64,
    one_minus_q: f64,
    one_minus_q_inv: f64,
    hxm: f64,
    hx0_minus_hxm: f64,
}

impl SkewedZipf {
    /// Creates the distribution with exponent `s > 1` and hot set width `v >= 1`.
    pub fn new(s: f64, v: f64, imax: u64) -> Result<Self, IdError> {
        if !(s > 1.0 && v >= 1.0) {
            return Err(IdError::InvalidZipf {
                exponent: s,
                hot_set: v,
            });
        }

        let mut zipf = Self {
            imax: imax as f64,
            v,
            q: s,
            s: 0.0,
            one_minus_q: 1.0 - s,
            one_minus_q_inv: 1.0 / (1.0 - s),
            hxm: 0.0,
            hx0_minus_hxm: 0.0,
        };

        zipf.hxm = zipf.h(zipf.imax + 0.5);
        zipf.hx0_minus_hxm = zipf.h(0.5) - (v.ln() * -s).exp() - zipf.hxm;
        zipf.s = 1.0 - zipf.hinv(zipf.h(1.5) - (-s * (v + 1.0).ln()).exp());

        Ok(zipf)
    }

    fn h(&self, x: f64) -> f64 {
        (self.one_minus_q * (self.v + x).ln()).exp() * self.one_minus_q_inv
    }

    fn hinv(&self, x: f64) -> f64 {
        (self.one_minus_q_inv * (self.one_minus_q * x).ln()).exp() - self.v
    }
}

impl Distribution<u64> for SkewedZipf {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        loop {
            let r: f64 = rng.random();
            let ur = self.hxm + r * self.hx0_minus_hxm;
            let x = self.hinv(ur);
            let k = (x + 0.5).floor();

            if k - x <= self.s
                || ur >= self.h(k + 0.5) - (-(k + self.v).ln() * self.q).exp()
            {
                return k.min(self.imax) as u64;
            }
        }
    }
}

/// Returns existing IDs heavily skewed towards the shared maximum ID.
///
/// Example output with a maximum ID of 100,000:
///
/// ```text
/// 99991 99986 99993 99981 99979 99976 99972 99934 99996 99995 99998 99930
/// ```
///
/// This is good for operating on records that are probably still in the cache.
#[derive(Debug)]
pub struct Zipfian {
    max: Arc<AtomicU64>,
    distribution: SkewedZipf,
    rng: SmallRng,
}

impl Generator for Zipfian {
    fn get_new(&mut self) -> u64 {
        self.max.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// # Panics
    ///
    /// Panics if the maximum ID is zero.
    fn get_existing(&mut self) -> u64 {
        let max = assert_existing(self.max.load(Ordering::SeqCst));

        let n = self.distribution.sample(&mut self.rng);
        if n < max { max - n } else { max }
    }
}

/// Creates linked instances of [`Zipfian`] sharing a maximum ID.
#[derive(Clone, Debug)]
pub struct ZipfianSource {
    max: Arc<AtomicU64>,
    distribution: SkewedZipf,
}

impl ZipfianSource {
    /// Creates a source for a key space of `1..=max` with the default exponent and hot set.
    ///
    /// Returns [`IdError::EmptyKeySpace`] if `max` is zero.
    pub fn new(max: u64) -> Result<Self, IdError> {
        Self::with_params(max, DEFAULT_EXPONENT, DEFAULT_HOT_SET)
    }

    /// Creates a source with a custom skew `exponent` and `hot_set` width.
    pub fn with_params(max: u64, exponent: f64, hot_set: f64) -> Result<Self, IdError> {
        if max == 0 {
            return Err(IdError::EmptyKeySpace);
        }

        Ok(Self {
            max: Arc::new(AtomicU64::new(max)),
            distribution: SkewedZipf::new(exponent, hot_set, u64::MAX)?,
        })
    }

    /// Returns the current maximum ID.
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::SeqCst)
    }

    /// Returns a generator with its own random stream, operating on the shared maximum ID.
    pub fn new_generator(&self) -> Zipfian {
        Zipfian {
            max: Arc::clone(&self.max),
            distribution: self.distribution,
            rng: SmallRng::seed_from_u64(rand::random()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(ZipfianSource::new(0), Err(IdError::EmptyKeySpace)));
        assert!(matches!(
            ZipfianSource::with_params(10, 1.0, 50.0),
            Err(IdError::InvalidZipf { .. })
        ));
        assert!(matches!(
            ZipfianSource::with_params(10, 2.5, 0.5),
            Err(IdError::InvalidZipf { .. })
        ));
    }

    #[test]
    fn skewed_towards_max() {
        const MAX: u64 = 100_000;

        let source = ZipfianSource::new(MAX).unwrap();
        let mut generator = source.new_generator();

        let mut at_max = 0;
        let mut at_half = 0;
        let mut near_max = 0;
        for _ in 0..100_000 {
            let id = generator.get_existing();
            assert!((1..=MAX).contains(&id), "{id} out of range");

            match id {
                MAX => at_max += 1,
                50_000 => at_half += 1,
                _ => {}
            }
            if id > MAX - 1000 {
                near_max += 1;
            }
        }

        assert!(at_max > at_half, "max: {at_max}, half: {at_half}");
        assert!(near_max > 90_000, "only {near_max} samples near max");
    }

    #[test]
    fn distribution_decays() {
        let zipf = SkewedZipf::new(2.5, 50.0, u64::MAX).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);

        let mut counts = [0u32; 4];
        for _ in 0..50_000 {
            match zipf.sample(&mut rng) {
                0..50 => counts[0] += 1,
                50..100 => counts[1] += 1,
                100..200 => counts[2] += 1,
                _ => counts[3] += 1,
            }
        }

        assert!(counts[0] > counts[1], "{counts:?}");
        assert!(counts[1] > counts[2], "{counts:?}");
    }

    #[test]
    fn saturates_small_key_spaces() {
        let source = ZipfianSource::with_params(3, 1.1, 1.0).unwrap();
        let mut generator = source.new_generator();

        for _ in 0..1000 {
            assert!((1..=3).contains(&generator.get_existing()));
        }
    }
}
