//! Run a sequence of operations concurrently and measure their latency.
//!
//! A [`Plan`] spawns a fixed number of worker threads. Each worker repeatedly runs all operations
//! in the order they were added, until the plan is stopped or the total number of successful
//! operations exceeds the configured ceiling.
//!
//! Workers never share statistics while running. Each one records into its own
//! [`HistogramChild`](crate::stats::HistogramChild)s, which are merged once all workers have
//! exited. Only the live throughput counters and the ceiling counter are shared atomics.
//!
//! # Liveness
//!
//! There are no timeouts. An operation that never returns wedges its worker, and with it the final
//! merge and [`Plan::run`].

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::idgen::{IdGenerator, IdSource};
use crate::stats::{DurationObserver, Histogram, HistogramChild, HistogramOptions};

mod operation;
mod stop;

use self::operation::Operation;
pub use self::operation::{OperationFn, OperationResult};
pub use self::stop::StopHandle;

/// Interval between two status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);
/// Number of status lines between blank separator lines.
const STATUS_BLOCK: u64 = 10;

/// Creates the record each worker passes to its operations.
pub trait RecordSource: Send + Sync {
    /// The record type handed to [`OperationFn`]s.
    type Record: Send;

    /// Creates a record for exclusive use by one worker.
    fn create(&self, rng: &mut SmallRng) -> Self::Record;
}

impl RecordSource for () {
    type Record = ();

    fn create(&self, _rng: &mut SmallRng) {}
}

/// A series of operations run concurrently by a pool of workers.
///
/// Operations are added with [`add`](Self::add) before calling [`run`](Self::run). A plan runs
/// only once: after `run` returns, or after [`stop`](Self::stop), it stays stopped.
pub struct Plan<S: RecordSource = ()> {
    records: S,
    ids: IdSource,
    ops: Vec<Operation<S::Record>>,
    /// Indexes into `ops` of the first operation with each name.
    distinct: Vec<usize>,
    histogram_options: HistogramOptions,

    ops_max: u64,
    ops_count: AtomicU64,

    stop: StopHandle,
    run_lock: Mutex<()>,
}

/// Everything a worker owns exclusively.
struct Worker<R> {
    id: usize,
    record: R,
    ids: IdGenerator,
    rng: SmallRng,
    histograms: Vec<HistogramChild>,
}

impl Plan {
    /// Creates an empty plan stopping after `ops_max` successful operations, `0` for no limit.
    ///
    /// Operations receive the unit record `()`.
    pub fn new(ops_max: u64) -> Self {
        Self::with_records(ops_max, ())
    }
}

impl<S: RecordSource> Plan<S> {
    /// Creates an empty plan whose workers obtain their record from `records`.
    pub fn with_records(ops_max: u64, records: S) -> Self {
        Self {
            records,
            ids: IdSource::default(),
            ops: Vec::new(),
            distinct: Vec::new(),
            histogram_options: HistogramOptions::default(),
            ops_max,
            ops_count: AtomicU64::new(0),
            stop: StopHandle::default(),
            run_lock: Mutex::new(()),
        }
    }

    /// Sets the bucket layout for histograms of operations added afterwards.
    pub fn with_histogram_options(mut self, options: HistogramOptions) -> Self {
        self.histogram_options = options;
        self
    }

    /// Sets the source of ID generators, one generator is created for each worker.
    ///
    /// Defaults to a [`MonotonicSource`](crate::idgen::MonotonicSource) starting at zero.
    pub fn set_id_generator(&mut self, source: impl Into<IdSource>) {
        self.ids = source.into();
    }

    /// Appends an operation to the sequence each worker runs.
    ///
    /// If an operation with the same `name` was added before, both share their statistics and are
    /// reported as a single result.
    pub fn add<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(&mut S::Record, &mut IdGenerator, &mut SmallRng) -> bool + Send + Sync + 'static,
    {
        let name = name.into();

        let operation = match self.ops.iter().find(|op| op.name == name) {
            Some(existing) => Operation {
                name,
                callback: Arc::new(callback),
                observer: Arc::clone(&existing.observer),
                histogram: Arc::clone(&existing.histogram),
                slot: existing.slot,
            },
            None => {
                self.distinct.push(self.ops.len());
                Operation {
                    name,
                    callback: Arc::new(callback),
                    observer: Arc::new(DurationObserver::new()),
                    histogram: Arc::new(Histogram::new(self.histogram_options)),
                    slot: self.distinct.len() - 1,
                }
            }
        };

        self.ops.push(operation);
    }

    /// Returns a handle that can stop this plan from another thread or from within an operation.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops all workers once their current operation has returned.
    ///
    /// Stopping is permanent, a stopped plan cannot be resumed.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns `true` once the plan has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Number of successful operations so far.
    ///
    /// This can exceed the ceiling by up to one operation per worker, since all workers may
    /// complete an operation concurrently before observing the stop.
    pub fn operations_count(&self) -> u64 {
        self.ops_count.load(Ordering::SeqCst)
    }

    /// Runs `workers` concurrent workers until the plan is stopped, then returns the merged latency
    /// histogram of each distinct operation name in the order they were added.
    ///
    /// Once per second, a line with the approximate throughput and average latency of every
    /// operation is written to `status`.
    ///
    /// Returns no results if the plan has already been stopped or has no operations.
    pub fn run<W>(&self, workers: usize, status: W) -> Vec<OperationResult>
    where
        W: io::Write + Send,
    {
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_stopped() {
            return Vec::new();
        }
        if self.ops.is_empty() {
            tracing::warn!("plan has no operations");
            self.stop();
            return Vec::new();
        }

        // Split every histogram before any worker starts, so that merging cannot begin while
        // children are still being created.
        let Some(prepared) = (0..workers)
            .map(|id| self.prepare_worker(id))
            .collect::<Option<Vec<_>>>()
        else {
            tracing::error!("plan histograms were already merged");
            self.stop();
            return Vec::new();
        };

        tracing::info!(
            workers,
            operations = self.ops.len(),
            ops_max = self.ops_max,
            "running plan"
        );
        let start = Instant::now();

        let results = thread::scope(|scope| {
            scope.spawn(|| self.report_status(status));

            for worker in prepared {
                let spawned = thread::Builder::new()
                    .name(format!("worker-{}", worker.id))
                    .spawn_scoped(scope, move || self.work(worker));

                if let Err(error) = spawned {
                    tracing::error!(error = &error as &dyn std::error::Error, "failed to spawn worker");
                }
            }

            // Blocks until every worker has handed back its histograms.
            let results = self.collect_results();
            self.stop();
            results
        });

        tracing::info!(
            elapsed = ?start.elapsed(),
            operations = self.operations_count(),
            "plan finished"
        );

        results
    }

    fn prepare_worker(&self, id: usize) -> Option<Worker<S::Record>> {
        let histograms = self
            .distinct
            .iter()
            .map(|&index| self.ops[index].histogram.split())
            .collect::<Option<Vec<_>>>()?;

        // Each worker gets its own random stream to avoid contention and correlated samples.
        let mut rng = SmallRng::seed_from_u64(rand::random());
        let record = self.records.create(&mut rng);

        Some(Worker {
            id,
            record,
            ids: self.ids.new_generator(),
            rng,
            histograms,
        })
    }

    fn work(&self, mut worker: Worker<S::Record>) {
        tracing::trace!(worker = worker.id, "worker started");
        self.work_until_stopped(&mut worker);

        // Children are handed back in the order `collect_results` merges them. Otherwise two
        // workers could each block on a different histogram.
        for histogram in &mut worker.histograms {
            histogram.done();
        }
        tracing::trace!(worker = worker.id, "worker finished");
    }

    fn work_until_stopped(&self, worker: &mut Worker<S::Record>) {
        loop {
            for op in &self.ops {
                if self.is_stopped() {
                    return;
                }

                let start = Instant::now();
                let succeeded = (op.callback)(&mut worker.record, &mut worker.ids, &mut worker.rng);
                let elapsed = start.elapsed();

                if !succeeded {
                    continue;
                }

                let millis = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
                worker.histograms[op.slot].add(millis);
                op.observer.observe(elapsed, 1);

                // Other workers may also cross the ceiling before they observe the stop.
                let count = self.ops_count.fetch_add(1, Ordering::SeqCst) + 1;
                if self.ops_max != 0 && count > self.ops_max {
                    self.stop();
                    return;
                }
            }
        }
    }

    fn collect_results(&self) -> Vec<OperationResult> {
        self.distinct
            .iter()
            .map(|&index| {
                let op = &self.ops[index];
                op.histogram.merge();
                OperationResult {
                    name: op.name.clone(),
                    histogram: Arc::clone(&op.histogram),
                }
            })
            .collect()
    }

    fn report_status<W: io::Write>(&self, mut out: W) {
        let mut emitted = 0;
        while !self.stop.wait_timeout(STATUS_INTERVAL) {
            if let Err(error) = self.write_status(&mut out, emitted) {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to write status, disabling status reports"
                );
                return;
            }
            emitted += 1;
        }
    }

    fn write_status<W: io::Write>(&self, out: &mut W, emitted: u64) -> io::Result<()> {
        if emitted > 0 && emitted % STATUS_BLOCK == 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}", self.status_line())?;
        out.flush()
    }

    /// Describes the throughput of every operation since the last call, and resets the counters.
    ///
    /// The format is `<name> <count>op/s avg.<ms>ms` per operation, separated by tabs.
    pub fn status_line(&self) -> String {
        self.distinct
            .iter()
            .map(|&index| {
                let op = &self.ops[index];
                let (count, avg) = op.observer.reset();
                format!("{} {count}op/s avg.{avg}ms", op.name)
            })
            .collect::<Vec<_>>()
            .join("\t")
    }
}

impl<S: RecordSource + fmt::Debug> fmt::Debug for Plan<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("records", &self.records)
            .field("ids", &self.ids)
            .field("ops", &self.ops)
            .field("ops_max", &self.ops_max)
            .field("ops_count", &self.ops_count)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::idgen::{Generator, MonotonicSource};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn records_every_success() {
        keybench_test::tracing::init();
        const CALLS: u64 = 10_000;

        let mut plan = Plan::new(0);
        let stop = plan.stop_handle();
        let seen = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&seen);
        plan.add("counter", move |_, ids, _| {
            if ids.get_new() > CALLS {
                stop.stop();
                return false;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let results = plan.run(16, io::sink());

        assert_eq!(seen.load(Ordering::SeqCst), CALLS);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "counter");
        assert_eq!(results[0].histogram.count(), CALLS);
        assert_eq!(plan.operations_count(), CALLS);
    }

    #[test]
    fn failures_are_discarded() {
        const MAX: u64 = 1000;

        let mut plan = Plan::new(MAX);
        let failures = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&failures);
        plan.add("fails", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        plan.add("succeeds", |_, _, _| true);

        let results = plan.run(1, io::sink());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "fails");
        assert_eq!(results[0].histogram.count(), 0);
        assert_eq!(results[1].histogram.count(), MAX + 1);
        // A failed operation does not abort the pass.
        assert_eq!(failures.load(Ordering::SeqCst), MAX + 1);
    }

    #[test]
    fn ceiling_overshoot_is_bounded() {
        const MAX: u64 = 5000;
        const WORKERS: usize = 8;

        let mut plan = Plan::new(MAX);
        plan.add("noop", |_, _, _| true);

        let results = plan.run(WORKERS, io::sink());
        let count = results[0].histogram.count();

        assert!(count > MAX, "{count} did not exceed {MAX}");
        assert!(count <= MAX + WORKERS as u64, "{count} overshot {MAX}");
        assert_eq!(plan.operations_count(), count);
    }

    #[test]
    fn same_names_share_statistics() {
        const MAX: u64 = 2000;

        let mut plan = Plan::new(MAX);
        let calls = Arc::new(AtomicU64::new(0));

        plan.add("insert", |_, ids, _| {
            ids.get_new();
            true
        });
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            plan.add("select", move |_, _, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            });
        }

        let results = plan.run(4, io::sink());
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, ["insert", "select"]);
        assert_eq!(results[1].histogram.count(), calls.load(Ordering::SeqCst));
        assert_eq!(
            results[0].histogram.count() + results[1].histogram.count(),
            plan.operations_count()
        );
    }

    #[test]
    fn external_stop() {
        let mut plan = Plan::new(0);
        let stop = plan.stop_handle();
        let calls = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&calls);
        plan.add("noop", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let results = thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                stop.stop();
            });
            plan.run(4, io::sink())
        });

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].histogram.count(), calls.load(Ordering::SeqCst));
        assert!(results[0].histogram.count() > 0);
    }

    #[test]
    fn runs_only_once() {
        let mut plan = Plan::new(10);
        plan.add("noop", |_, _, _| true);

        assert_eq!(plan.run(2, io::sink()).len(), 1);
        assert!(plan.is_stopped());
        assert!(plan.run(2, io::sink()).is_empty());
    }

    #[test]
    fn stopped_plan_does_not_run() {
        let mut plan = Plan::new(0);
        plan.add("unreachable", |_, _, _| panic!("operation called on stopped plan"));
        plan.stop();

        assert!(plan.run(4, io::sink()).is_empty());
    }

    #[test]
    fn empty_plan_returns_immediately() {
        let plan = Plan::new(0);
        assert!(plan.run(4, io::sink()).is_empty());
    }

    #[test]
    fn status_line_format() {
        let mut plan = Plan::new(0);
        let stop = plan.stop_handle();

        plan.add("step1", |_, _, _| true);
        plan.add("step2", move |_, _, _| {
            stop.stop();
            true
        });
        plan.run(1, io::sink());

        assert_eq!(plan.status_line(), "step1 1op/s avg.0ms\tstep2 1op/s avg.0ms");
        assert_eq!(plan.status_line(), "step1 0op/s avg.0ms\tstep2 0op/s avg.0ms");
    }

    #[test]
    fn writes_status_lines() {
        let mut plan = Plan::new(0);
        let stop = plan.stop_handle();
        plan.add("sleep", |_, _, _| {
            thread::sleep(Duration::from_millis(1));
            true
        });

        let buffer = SharedBuffer::default();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(1500));
                stop.stop();
            });
            plan.run(2, buffer.clone());
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line = output.lines().next().unwrap();
        assert!(line.starts_with("sleep "), "{line}");
        assert!(line.contains("op/s avg."), "{line}");
    }

    #[test]
    fn status_block_separator() {
        let mut plan = Plan::new(0);
        plan.add("a", |_, _, _| true);
        plan.add("b", |_, _, _| true);

        let mut out = Vec::new();
        for emitted in 0..12 {
            plan.write_status(&mut out, emitted).unwrap();
        }

        let output = String::from_utf8(out).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[10], "");
        assert_eq!(lines[0], "a 0op/s avg.0ms\tb 0op/s avg.0ms");
    }

    #[test]
    fn workers_own_their_state() {
        struct Counting(AtomicUsize);

        impl RecordSource for Counting {
            type Record = Vec<u64>;

            fn create(&self, _rng: &mut SmallRng) -> Self::Record {
                self.0.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            }
        }

        const WORKERS: usize = 6;

        let mut plan = Plan::with_records(600, Counting(AtomicUsize::new(0)));
        plan.set_id_generator(MonotonicSource::new(100));
        plan.add("insert", |seen: &mut Vec<u64>, ids, _| {
            let id = ids.get_new();
            // Every worker sees strictly increasing IDs.
            assert!(seen.last().is_none_or(|&last| last < id));
            assert!(id > 100);
            seen.push(id);
            true
        });

        let results = plan.run(WORKERS, io::sink());

        assert_eq!(plan.records.0.load(Ordering::SeqCst), WORKERS);
        assert!(results[0].histogram.count() > 600);
    }
}
