//! Catalogue of workloads.
//!
//! A workload is a sequence of [`Backend`] operations plus the ID generator that shapes their key
//! access pattern. [`configure`] adds both to a [`Plan`].

use std::sync::Arc;

use keybench_core::idgen::{MonotonicSource, PersistentSource, UniformSource, ZipfianSource};
use keybench_core::{IdError, IdGenerator, IdSource, Plan};
use rand::rngs::SmallRng;
use thiserror::Error;

use crate::backend::{Backend, BoxedBackend};
use crate::record::{Person, PersonSource};

/// Number of reads following each insert in `insert5-select95`.
const SELECTS_PER_INSERT: usize = 19;

/// All available workloads with a short description.
pub const WORKLOADS: &[(&str, &str)] = &[
    ("insert", "insert new records with sequential IDs"),
    (
        "insert-update",
        "insert a record, then update the record just inserted",
    ),
    (
        "insert-select",
        "insert a record, then read the record just inserted",
    ),
    (
        "insert5-select95",
        "insert a record, then read the most recent record 19 times",
    ),
    (
        "select-uniform",
        "read existing records uniformly across the key space",
    ),
    (
        "select-zipfian",
        "read existing records skewed towards the most recent",
    ),
    (
        "select-update-uniform",
        "read and update existing records uniformly across the key space",
    ),
    (
        "select-update-zipfian",
        "read and update existing records skewed towards the most recent",
    ),
    (
        "update-uniform",
        "update existing records uniformly across the key space",
    ),
    (
        "update-zipfian",
        "update existing records skewed towards the most recent",
    ),
    ("read-range", "read all records within an age range"),
];

/// Errors that prevent a workload from being set up.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The workload name is not in [`WORKLOADS`].
    #[error("unknown workload {0:?}, run `keybench workloads` for a list")]
    Unknown(String),

    /// The workload operates on existing records, but the backend has none.
    #[error("workload {workload} requires existing records")]
    NoExistingData {
        /// Name of the workload.
        workload: String,
        /// Why the highest ID could not be determined.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The ID generator rejected the key space.
    #[error("invalid key space: {0}")]
    Ids(#[from] IdError),
}

/// Adds the operations and ID generator of the workload `name` to `plan`.
pub fn configure(
    name: &str,
    plan: &mut Plan<PersonSource>,
    backend: &BoxedBackend,
) -> Result<(), WorkloadError> {
    if !WORKLOADS.iter().any(|&(known, _)| known == name) {
        return Err(WorkloadError::Unknown(name.to_owned()));
    }

    // Insert workloads start from an empty backend, everything else needs existing records.
    let max = match backend.max_id() {
        Ok(max) => max,
        Err(_) if matches!(name, "insert" | "insert-update") => 0,
        Err(error) => {
            return Err(WorkloadError::NoExistingData {
                workload: name.to_owned(),
                source: error.into(),
            });
        }
    };
    tracing::debug!(workload = name, max, backend = backend.name(), "configuring workload");

    let ids: IdSource = match name {
        "insert" => {
            add(plan, "insert", backend, |b, r, i, g| b.insert_record(r, i, g));
            MonotonicSource::new(max).into()
        }
        "insert-update" => {
            add(plan, "insert", backend, |b, r, i, g| b.insert_record(r, i, g));
            add(plan, "update", backend, |b, r, i, g| b.update_record(r, i, g));
            PersistentSource::new(MonotonicSource::new(max), 1).into()
        }
        "insert-select" => {
            add(plan, "insert", backend, |b, r, i, g| b.insert_record(r, i, g));
            add(plan, "select", backend, |b, r, i, g| b.read_record(r, i, g));
            PersistentSource::new(MonotonicSource::new(max), 1).into()
        }
        "insert5-select95" => {
            add(plan, "insert", backend, |b, r, i, g| b.insert_record(r, i, g));
            for _ in 0..SELECTS_PER_INSERT {
                add(plan, "select", backend, |b, r, i, g| {
                    b.read_most_recent(r, i, g)
                });
            }
            MonotonicSource::new(max).into()
        }
        "select-uniform" => {
            add(plan, "select", backend, |b, r, i, g| b.read_record(r, i, g));
            UniformSource::new(max)?.into()
        }
        "select-zipfian" => {
            add(plan, "select", backend, |b, r, i, g| b.read_record(r, i, g));
            ZipfianSource::new(max)?.into()
        }
        "select-update-uniform" => {
            add(plan, "select", backend, |b, r, i, g| b.read_record(r, i, g));
            add(plan, "update", backend, |b, r, i, g| b.update_record(r, i, g));
            UniformSource::new(max)?.into()
        }
        "select-update-zipfian" => {
            add(plan, "select", backend, |b, r, i, g| b.read_record(r, i, g));
            add(plan, "update", backend, |b, r, i, g| b.update_record(r, i, g));
            ZipfianSource::new(max)?.into()
        }
        "update-uniform" => {
            add(plan, "update", backend, |b, r, i, g| b.update_record(r, i, g));
            UniformSource::new(max)?.into()
        }
        "update-zipfian" => {
            add(plan, "update", backend, |b, r, i, g| b.update_record(r, i, g));
            ZipfianSource::new(max)?.into()
        }
        "read-range" => {
            add(plan, "range", backend, |b, r, i, g| b.read_range(r, i, g));
            MonotonicSource::new(max).into()
        }
        _ => return Err(WorkloadError::Unknown(name.to_owned())),
    };

    plan.set_id_generator(ids);
    Ok(())
}

/// Adds an operation calling `method` on a shared handle to `backend`.
fn add<F>(plan: &mut Plan<PersonSource>, name: &str, backend: &BoxedBackend, method: F)
where
    F: Fn(&dyn Backend, &mut Person, &mut IdGenerator, &mut SmallRng) -> bool
        + Send
        + Sync
        + 'static,
{
    let backend = Arc::clone(backend);
    plan.add(name, move |record, ids, rng| {
        method(&*backend, record, ids, rng)
    });
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::backend::InMemoryBackend;

    fn backend(preload: u64) -> BoxedBackend {
        let backend = InMemoryBackend::new();
        backend.preload(preload, 0);
        Arc::new(backend)
    }

    fn plan() -> Plan<PersonSource> {
        Plan::with_records(200, PersonSource::default())
    }

    #[test]
    fn unknown_workload() {
        let error = configure("delete-all", &mut plan(), &backend(10)).unwrap_err();
        assert!(matches!(error, WorkloadError::Unknown(name) if name == "delete-all"));
    }

    #[test]
    fn reads_require_existing_records() {
        for name in ["select-uniform", "update-zipfian", "read-range", "insert-select"] {
            let error = configure(name, &mut plan(), &backend(0)).unwrap_err();
            assert!(
                matches!(error, WorkloadError::NoExistingData { .. }),
                "{name}: {error}"
            );
        }
    }

    #[test]
    fn inserts_start_from_empty_backend() {
        keybench_test::tracing::init();
        let backend = backend(0);

        let mut plan = plan();
        configure("insert-update", &mut plan, &backend).unwrap();
        let results = plan.run(1, io::sink());

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["insert", "update"]);
        // Every update hits the record inserted right before it.
        assert_eq!(
            results[0].histogram.count() + results[1].histogram.count(),
            plan.operations_count()
        );
        assert!(results[1].histogram.count() >= 100);
        assert!(backend.max_id().unwrap() > 100);
    }

    #[test]
    fn select_heavy_workload_aliases_reads() {
        let mut plan = plan();
        configure("insert5-select95", &mut plan, &backend(1)).unwrap();
        let results = plan.run(1, io::sink());

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["insert", "select"]);
        assert!(results[1].histogram.count() >= 19 * results[0].histogram.count() - 19);
    }

    #[test]
    fn every_workload_runs() {
        for &(name, _) in WORKLOADS {
            let mut plan = plan();
            configure(name, &mut plan, &backend(50)).unwrap();

            let results = plan.run(4, io::sink());
            let total: u64 = results.iter().map(|r| r.histogram.count()).sum();
            assert!(total > 200, "{name} completed only {total} operations");
        }
    }
}
