//! A latency histogram which can be split for contention-free concurrent measurements.
//!
//! A [`Histogram`] is never written to directly. Each worker instead obtains its own
//! [`HistogramChild`] via [`Histogram::split`], records into it without any synchronisation,
//! and hands it back with [`HistogramChild::done`] when it exits. [`Histogram::merge`] collects
//! exactly as many children as were split and sums their buckets into the parent.
//!
//! Children are handed back over a zero-capacity channel, so `done` blocks until the merging side
//! has received the child.
//!
//! # Liveness
//!
//! `merge` waits for every split child. A child whose owner never calls `done` and never drops it,
//! for instance because a worker is stuck in a backend call that never returns, blocks `merge`
//! forever. There is no timeout. A child that is dropped without calling `done` is reported as
//! lost and excluded from the results.

use std::io;
use std::mem;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Bucket layout of a [`Histogram`].
///
/// All children of a histogram share the layout of their parent, which is what makes merging them
/// a simple per-bucket sum.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistogramOptions {
    /// Number of buckets. Values beyond the last lower bound are counted in the last bucket.
    pub num_buckets: usize,
    /// Each bucket is `1 + growth_factor` times as wide as the one before it.
    pub growth_factor: f64,
    /// Width of the second bucket.
    pub base_bucket_size: f64,
    /// Lower bound of the first bucket.
    pub min_value: i64,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            num_buckets: 100,
            growth_factor: 0.1,
            base_bucket_size: 1.0,
            min_value: 0,
        }
    }
}

#[derive(Debug)]
struct Layout {
    options: HistogramOptions,
    lower_bounds: Vec<f64>,
    log_base_bucket_size: f64,
    one_over_log_growth: f64,
}

impl Layout {
    fn new(mut options: HistogramOptions) -> Self {
        if options.num_buckets == 0 {
            options.num_buckets = 32;
        }
        if options.base_bucket_size <= 0.0 {
            options.base_bucket_size = 1.0;
        }

        let min = options.min_value as f64;
        let growth = 1.0 + options.growth_factor;

        let mut lower_bounds = Vec::with_capacity(options.num_buckets);
        lower_bounds.push(min);
        let mut delta = options.base_bucket_size;
        for _ in 1..options.num_buckets {
            lower_bounds.push(min + delta);
            delta *= growth;
        }

        Self {
            options,
            lower_bounds,
            log_base_bucket_size: options.base_bucket_size.ln(),
            one_over_log_growth: 1.0 / growth.ln(),
        }
    }

    fn bucket_index(&self, value: i64) -> usize {
        let delta = (value as f64) - (self.options.min_value as f64);
        if delta < self.options.base_bucket_size {
            return 0;
        }

        let index = (delta.ln() - self.log_base_bucket_size) * self.one_over_log_growth + 1.0;
        (index as usize).min(self.lower_bounds.len() - 1)
    }
}

/// Raw bucket counts and summary statistics sharing one [`Layout`].
#[derive(Debug)]
struct Buckets {
    layout: Arc<Layout>,
    counts: Vec<u64>,
    count: u64,
    sum: i128,
    min: i64,
    max: i64,
}

impl Buckets {
    fn new(layout: Arc<Layout>) -> Self {
        let counts = vec![0; layout.lower_bounds.len()];
        Self {
            layout,
            counts,
            count: 0,
            sum: 0,
            min: i64::MAX,
            max: i64::MIN,
        }
    }

    fn add(&mut self, value: i64) {
        let index = self.layout.bucket_index(value);
        self.counts[index] += 1;
        self.count += 1;
        self.sum += i128::from(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn merge(&mut self, other: &Buckets) {
        debug_assert!(Arc::ptr_eq(&self.layout, &other.layout));

        for (count, other) in self.counts.iter_mut().zip(&other.counts) {
            *count += other;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn snapshot(&self) -> Vec<Bucket> {
        let bounds = &self.layout.lower_bounds;
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| Bucket {
                lower_bound: bounds[i],
                upper_bound: bounds.get(i + 1).copied(),
                count,
            })
            .collect()
    }
}

/// A single bucket of a [`Histogram`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bucket {
    /// Inclusive lower bound of the bucket.
    pub lower_bound: f64,
    /// Exclusive upper bound of the bucket, `None` for the last, unbounded bucket.
    pub upper_bound: Option<f64>,
    /// Number of values recorded in this bucket.
    pub count: u64,
}

#[derive(Debug)]
struct State {
    buckets: Buckets,
    expected: usize,
    merged: bool,
    sender: Option<SyncSender<Buckets>>,
    receiver: Option<Receiver<Buckets>>,
}

/// A histogram that is split into per-worker children and merged back exactly once.
///
/// See the [module documentation](self) for the split and merge protocol.
#[derive(Debug)]
pub struct Histogram {
    layout: Arc<Layout>,
    state: Mutex<State>,
}

impl Histogram {
    /// Creates an empty histogram with the given bucket layout.
    ///
    /// A bucket count of zero is replaced with 32, and a non-positive base bucket size with `1.0`.
    pub fn new(options: HistogramOptions) -> Self {
        let layout = Arc::new(Layout::new(options));
        let (sender, receiver) = sync_channel(0);

        Self {
            state: Mutex::new(State {
                buckets: Buckets::new(Arc::clone(&layout)),
                expected: 0,
                merged: false,
                sender: Some(sender),
                receiver: Some(receiver),
            }),
            layout,
        }
    }

    /// Returns the normalized bucket layout of this histogram.
    pub fn options(&self) -> HistogramOptions {
        self.layout.options
    }

    /// Creates a child histogram for use by a single worker.
    ///
    /// Returns `None` once the histogram has been merged.
    pub fn split(&self) -> Option<HistogramChild> {
        let mut state = self.lock();
        if state.merged {
            return None;
        }

        let sender = state.sender.clone()?;
        state.expected += 1;

        Some(HistogramChild {
            buckets: Buckets::new(Arc::clone(&self.layout)),
            sender: Some(sender),
        })
    }

    /// Waits for every split child to call [`HistogramChild::done`] and sums them into this
    /// histogram.
    ///
    /// Only the first call merges, subsequent calls return immediately. Afterwards,
    /// [`split`](Self::split) returns `None`.
    pub fn merge(&self) {
        let mut state = self.lock();
        if state.merged {
            return;
        }
        state.merged = true;

        // Children hold their own senders. Dropping ours lets `recv` fail once every child is
        // either merged or dropped, instead of waiting on a child that no longer exists.
        drop(state.sender.take());
        let Some(receiver) = state.receiver.take() else {
            return;
        };

        let expected = state.expected;
        for received in 0..expected {
            match receiver.recv() {
                Ok(child) => state.buckets.merge(&child),
                Err(_) => {
                    tracing::error!(
                        received,
                        expected,
                        "histogram children were dropped without being marked done"
                    );
                    break;
                }
            }
        }
    }

    /// Returns `true` once [`merge`](Self::merge) has been called.
    pub fn is_merged(&self) -> bool {
        self.lock().merged
    }

    /// Total number of recorded values.
    pub fn count(&self) -> u64 {
        self.lock().buckets.count
    }

    /// Smallest recorded value, if any.
    pub fn min(&self) -> Option<i64> {
        let state = self.lock();
        (state.buckets.count > 0).then_some(state.buckets.min)
    }

    /// Largest recorded value, if any.
    pub fn max(&self) -> Option<i64> {
        let state = self.lock();
        (state.buckets.count > 0).then_some(state.buckets.max)
    }

    /// Arithmetic mean of all recorded values, if any.
    pub fn mean(&self) -> Option<f64> {
        let state = self.lock();
        let Buckets { count, sum, .. } = state.buckets;
        (count > 0).then(|| sum as f64 / count as f64)
    }

    /// Returns all buckets in ascending order.
    pub fn buckets(&self) -> Vec<Bucket> {
        self.lock().buckets.snapshot()
    }

    /// Estimates the `q`-quantile (`0.0..=1.0`) from the bucket counts.
    ///
    /// The estimate is the upper bound of the bucket containing the quantile, capped at the largest
    /// recorded value.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let state = self.lock();
        let buckets = &state.buckets;
        if buckets.count == 0 {
            return None;
        }

        let target = ((q.clamp(0.0, 1.0) * buckets.count as f64).ceil() as u64).max(1);
        let max = buckets.max as f64;

        let mut cumulative = 0;
        for bucket in buckets.snapshot() {
            cumulative += bucket.count;
            if cumulative >= target {
                let upper = bucket.upper_bound.unwrap_or(max);
                return Some(upper.min(max));
            }
        }

        Some(max)
    }

    /// Writes the histogram as CSV.
    ///
    /// The columns are `LowerBound,UpperBound,Count,Percent,AccumulativePercent` with one row per
    /// bucket in ascending order. The upper bound of the last bucket is `inf`.
    pub fn write_csv<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        let (buckets, total) = {
            let state = self.lock();
            (state.buckets.snapshot(), state.buckets.count)
        };

        let percent_multiplier = if total == 0 {
            0.0
        } else {
            100.0 / total as f64
        };

        writeln!(writer, "LowerBound,UpperBound,Count,Percent,AccumulativePercent")?;
        let mut accumulated = 0;
        for bucket in buckets {
            accumulated += bucket.count;

            write!(writer, "{:.1},", bucket.lower_bound)?;
            match bucket.upper_bound {
                Some(upper) => write!(writer, "{upper:.1},")?,
                None => write!(writer, "inf,")?,
            }
            writeln!(
                writer,
                "{},{:.1},{:.1}",
                bucket.count,
                bucket.count as f64 * percent_multiplier,
                accumulated as f64 * percent_multiplier,
            )?;
        }

        writer.flush()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A part of a [`Histogram`] owned by a single worker.
///
/// Recording into a child requires no synchronisation. Call [`done`](Self::done) to hand the
/// measurements back to the parent.
#[derive(Debug)]
pub struct HistogramChild {
    buckets: Buckets,
    sender: Option<SyncSender<Buckets>>,
}

impl HistogramChild {
    /// Records a single value.
    pub fn add(&mut self, value: i64) {
        self.buckets.add(value);
    }

    /// Number of values recorded in this child.
    pub fn count(&self) -> u64 {
        self.buckets.count
    }

    /// Hands the measurements to the parent histogram.
    ///
    /// Blocks until [`Histogram::merge`] has received them. Subsequent calls do nothing.
    pub fn done(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        let layout = Arc::clone(&self.buckets.layout);
        let buckets = mem::replace(&mut self.buckets, Buckets::new(layout));
        if sender.send(buckets).is_err() {
            tracing::debug!("histogram closed before child was merged");
        }
    }
}
