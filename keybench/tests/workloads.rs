//! Runs workloads end to end against the in-memory backend.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use keybench::backend::{Backend, BoxedBackend, InMemoryBackend};
use keybench::config::Config;
use keybench::record::PersonSource;
use keybench::{report, workload};
use keybench_core::Plan;

fn preloaded(records: u64) -> BoxedBackend {
    let backend = InMemoryBackend::new();
    backend.preload(records, 32);
    Arc::new(backend)
}

#[test]
fn insert_grows_backend() {
    keybench_test::tracing::init();

    let backend = preloaded(10);
    let mut plan = Plan::with_records(1000, PersonSource { padding: 32 });
    workload::configure("insert", &mut plan, &backend).unwrap();

    let results = plan.run(8, io::sink());
    let inserted = results[0].histogram.count();

    assert!(inserted > 1000);
    // IDs are contiguous, so the highest ID matches the number of records.
    assert_eq!(backend.max_id().unwrap(), 10 + inserted);
}

#[test]
fn interrupted_read_workload() {
    let backend = preloaded(1000);
    let mut plan = Plan::with_records(0, PersonSource::default());
    workload::configure("select-update-zipfian", &mut plan, &backend).unwrap();
    let stop = plan.stop_handle();

    let results = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(200));
            stop.stop();
        });
        plan.run(4, io::sink())
    });

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["select", "update"]);
    assert!(results.iter().all(|r| r.histogram.count() > 0));
    assert_eq!(backend.max_id().unwrap(), 1000);
}

#[test]
fn report_of_run() {
    let backend = preloaded(100);
    let mut plan = Plan::with_records(500, PersonSource::default());
    workload::configure("insert-select", &mut plan, &backend).unwrap();
    let results = plan.run(2, io::sink());

    let config = Config {
        workload: "insert-select".into(),
        workers: 2,
        ops: 500,
        ..Default::default()
    };
    let mut out = Vec::new();
    report::write_csv(&mut out, &config, &results).unwrap();
    let csv = String::from_utf8(out).unwrap();

    assert!(csv.starts_with("Endpoint:,memory://?preload=0\nTable:,test\nRecordLimit:,500\n"));
    assert!(csv.contains("\n\ninsert latency\nLowerBound,UpperBound,Count,Percent,AccumulativePercent\n"));
    assert!(csv.contains("\n\nselect latency\n"));
    assert!(csv.ends_with(",100.0\n"));
}
