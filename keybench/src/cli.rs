//! Command line interface of the `keybench` binary.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use bytesize::ByteSize;
use keybench_core::{OperationResult, Plan};
use yansi::Paint;

use crate::config::Config;
use crate::record::PersonSource;
use crate::workload::WORKLOADS;
use crate::{backend, observability, report, workload};

/// Load generator for storage backends.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Workloads(WorkloadsCommand),
    Version(VersionCommand),
}

/// run a workload and report operation latencies
///
/// Flags override the configuration file and environment variables.
#[derive(Debug, Default, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// name of the workload, see `keybench workloads`
    #[argh(option, short = 'w')]
    workload: Option<String>,

    /// number of concurrent workers
    #[argh(option, short = 'n')]
    workers: Option<usize>,

    /// stop after this many successful operations, 0 for no limit
    #[argh(option)]
    ops: Option<u64>,

    /// stop after this duration, for example `30s` or `5m`
    #[argh(option, short = 'd', from_str_fn(parse_duration))]
    duration: Option<Duration>,

    /// amount of random binary padding in each record, for example `4KiB`
    #[argh(option)]
    padding: Option<ByteSize>,

    /// name of the table, reported alongside the results
    #[argh(option)]
    table: Option<String>,

    /// path of the CSV file to write latency histograms to
    #[argh(option)]
    histogram: Option<PathBuf>,
}

impl RunCommand {
    fn apply(self, config: &mut Config) {
        if let Some(workload) = self.workload {
            config.workload = workload;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(ops) = self.ops {
            config.ops = ops;
        }
        if let Some(duration) = self.duration {
            config.duration = Some(duration);
        }
        if let Some(padding) = self.padding {
            config.padding = padding;
        }
        if let Some(table) = self.table {
            config.table = table;
        }
        if let Some(histogram) = self.histogram {
            config.histogram = Some(histogram);
        }
    }
}

/// list the available workloads
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "workloads")]
struct WorkloadsCommand {}

/// print the keybench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|error| error.to_string())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let run = match args.command {
        Command::Run(run) => run,
        Command::Workloads(WorkloadsCommand {}) => {
            for (name, description) in WORKLOADS {
                println!("{} {description}", format!("{name:<24}").bold());
            }
            return Ok(());
        }
        Command::Version(VersionCommand {}) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
    };

    let mut config = Config::load(args.config.as_deref())?;
    run.apply(&mut config);

    observability::init_tracing();
    tracing::debug!(?config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;

    let results = runtime.block_on(run_workload(&config))?;

    report::print_summary(&config, &results);
    if let Some(path) = &config.histogram {
        report::write_csv_file(path, &config, &results)?;
    }

    Ok(())
}

/// Runs the configured workload until it completes, its duration elapses, or it is interrupted.
async fn run_workload(config: &Config) -> Result<Vec<OperationResult>> {
    let padding = usize::try_from(config.padding.as_u64()).context("padding is too large")?;
    let backend = backend::from_config(&config.backend, padding);

    let mut plan = Plan::with_records(config.ops, PersonSource { padding })
        .with_histogram_options(config.histogram_options);
    workload::configure(&config.workload, &mut plan, &backend)
        .context("failed to set up workload")?;

    // The plan blocks its thread until all workers have exited.
    let plan = Arc::new(plan);
    let workers = config.workers;
    let mut task = tokio::task::spawn_blocking({
        let plan = Arc::clone(&plan);
        move || plan.run(workers, io::stdout())
    });

    let deadline = async {
        match config.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut elapsed = false;
    let mut interrupted = false;
    loop {
        tokio::select! {
            results = &mut task => return results.context("workers panicked"),
            _ = &mut deadline, if !elapsed => {
                tracing::info!("duration elapsed, stopping");
                elapsed = true;
                plan.stop();
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl+C")?;
                if interrupted {
                    println!("\nForcing...");
                    std::process::exit(1);
                }

                println!("\nStopping... Ctrl+C again to force");
                interrupted = true;
                plan.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["keybench"], args).unwrap()
    }

    #[test]
    fn run_flags_override_config() {
        let args = parse(&[
            "-c",
            "bench.yaml",
            "run",
            "--workload",
            "select-zipfian",
            "-n",
            "8",
            "--duration",
            "1m 30s",
            "--padding",
            "4KiB",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("bench.yaml")));

        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        let mut config = Config {
            ops: 500,
            ..Default::default()
        };
        run.apply(&mut config);

        assert_eq!(config.workload, "select-zipfian");
        assert_eq!(config.workers, 8);
        assert_eq!(config.ops, 500);
        assert_eq!(config.duration, Some(Duration::from_secs(90)));
        assert_eq!(config.padding, ByteSize::kib(4));
        assert_eq!(config.histogram, None);
    }

    #[test]
    fn invalid_duration() {
        assert!(Args::from_args(&["keybench"], &["run", "--duration", "soon"]).is_err());
    }

    #[test]
    fn subcommands() {
        assert!(matches!(parse(&["workloads"]).command, Command::Workloads(_)));
        assert!(matches!(parse(&["version"]).command, Command::Version(_)));
    }
}
