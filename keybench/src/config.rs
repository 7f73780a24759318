//! Configuration for a benchmark run.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Flags of the `run` command
//! 2. Environment variables (prefixed with `KEYBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration structures,
//! for example `KEYBENCH__BACKEND__PRELOAD=100000`.
//!
//! # YAML Configuration File
//!
//! ```yaml
//! workload: select-zipfian
//! workers: 64
//! duration: 30s
//! padding: 4KiB
//! histogram: results.csv
//!
//! backend:
//!   type: memory
//!   preload: 100000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use keybench_core::HistogramOptions;
use serde::{Deserialize, Serialize};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "KEYBENCH__";

/// Storage backend the workload runs against.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// In-process backend keeping JSON-encoded records in memory (type `"memory"`).
    Memory {
        /// Number of records inserted before the run starts.
        ///
        /// Read and update workloads need existing records, an empty backend aborts them.
        ///
        /// # Default
        ///
        /// `0`
        #[serde(default)]
        preload: u64,
    },
}

impl Default for Backend {
    fn default() -> Self {
        Self::Memory { preload: 0 }
    }
}

/// Main configuration struct for a benchmark run.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Name of the workload to run, see `keybench workloads`.
    ///
    /// # Default
    ///
    /// `"insert"`
    pub workload: String,

    /// Number of concurrent workers.
    ///
    /// # Default
    ///
    /// `30`
    pub workers: usize,

    /// Number of successful operations after which the run stops, `0` for no limit.
    ///
    /// The run may overshoot this by up to one operation per worker.
    pub ops: u64,

    /// Wall-clock limit for the run. Without a limit, the run continues until `ops` is reached or
    /// it is interrupted with Ctrl+C.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,

    /// Amount of random binary padding in each record.
    ///
    /// # Default
    ///
    /// `0`
    pub padding: ByteSize,

    /// Name of the table or collection, reported alongside the results.
    ///
    /// # Default
    ///
    /// `"test"`
    pub table: String,

    /// Path of the CSV file the latency histograms are written to.
    pub histogram: Option<PathBuf>,

    /// Bucket layout of the latency histograms, in milliseconds.
    pub histogram_options: HistogramOptions,

    /// Backend configuration.
    pub backend: Backend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workload: "insert".into(),
            workers: 30,
            ops: 0,
            duration: None,
            padding: ByteSize::b(0),
            table: "test".into(),
            histogram: None,
            histogram_options: HistogramOptions::default(),
            backend: Backend::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `KEYBENCH__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Describes the connected backend for reports.
    pub fn endpoint(&self) -> String {
        match self.backend {
            Backend::Memory { preload } => format!("memory://?preload={preload}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.workload, "insert");
            assert_eq!(config.workers, 30);
            assert_eq!(config.ops, 0);
            assert_eq!(config.duration, None);
            assert_eq!(config.padding, ByteSize::b(0));
            assert_eq!(config.histogram_options, HistogramOptions::default());
            assert_eq!(config.backend, Backend::Memory { preload: 0 });

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYBENCH__WORKLOAD", "select-zipfian");
            jail.set_env("KEYBENCH__WORKERS", "8");
            jail.set_env("KEYBENCH__DURATION", "1m 30s");
            jail.set_env("KEYBENCH__BACKEND__TYPE", "memory");
            jail.set_env("KEYBENCH__BACKEND__PRELOAD", "1000");
            jail.set_env("KEYBENCH__HISTOGRAM_OPTIONS__NUM_BUCKETS", "20");

            let config = Config::load(None).unwrap();

            assert_eq!(config.workload, "select-zipfian");
            assert_eq!(config.workers, 8);
            assert_eq!(config.duration, Some(Duration::from_secs(90)));
            assert_eq!(config.backend, Backend::Memory { preload: 1000 });
            assert_eq!(config.histogram_options.num_buckets, 20);
            assert_eq!(config.histogram_options.growth_factor, 0.1);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            workload: update-uniform
            ops: 5000
            padding: 4 KiB
            histogram: results.csv
            backend:
                type: memory
                preload: 10
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("KEYBENCH__OPS", "100");

            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.workload, "update-uniform");
            assert_eq!(config.ops, 100);
            assert_eq!(config.padding, ByteSize::kib(4));
            assert_eq!(config.histogram.as_deref(), Some(Path::new("results.csv")));
            assert_eq!(config.backend, Backend::Memory { preload: 10 });
            assert_eq!(config.endpoint(), "memory://?preload=10");

            Ok(())
        });
    }
}
