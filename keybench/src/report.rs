//! Print and export the results of a run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use keybench_core::OperationResult;
use yansi::Paint;

use crate::config::Config;

/// Quantiles printed in the summary.
const QUANTILES: [(&str, f64); 3] = [("p50", 0.5), ("p90", 0.9), ("p99", 0.99)];

/// Prints a latency summary of every operation that completed at least once.
pub fn print_summary(config: &Config, results: &[OperationResult]) {
    println!();
    println!(
        "{} {} (workers: {}, padding: {})",
        "## Workload".bold(),
        config.workload.bold().blue(),
        config.workers.bold(),
        config.padding,
    );

    for result in results {
        let histogram = &result.histogram;
        let (Some(min), Some(max), Some(mean)) =
            (histogram.min(), histogram.max(), histogram.mean())
        else {
            continue;
        };

        println!(
            "{} ({} ops)",
            format!("{}:", result.name.to_uppercase()).bold().green(),
            histogram.count().bold()
        );

        let quantiles = QUANTILES
            .iter()
            .filter_map(|&(label, q)| Some(format!("{label}: {:.1}ms", histogram.quantile(q)?)))
            .collect::<Vec<_>>()
            .join("; ");
        println!(
            "  min: {min}ms; max: {max}ms; avg: {}; {quantiles}",
            format!("{mean:.2}ms").bold()
        );
    }
}

/// Writes the run configuration followed by the latency histograms of all operations as CSV.
///
/// Operations that never completed are skipped.
pub fn write_csv<W: Write>(mut writer: W, config: &Config, results: &[OperationResult]) -> io::Result<()> {
    let metadata = [
        ("Endpoint:", config.endpoint()),
        ("Table:", config.table.clone()),
        ("RecordLimit:", config.ops.to_string()),
        ("Workers:", config.workers.to_string()),
        ("PaddingSize:", config.padding.to_string()),
        ("Workload:", config.workload.clone()),
    ];

    // Values come from user input and are quoted where needed.
    let mut rows = csv::Writer::from_writer(&mut writer);
    for (label, value) in &metadata {
        rows.write_record([*label, value.as_str()])?;
    }
    rows.flush()?;
    drop(rows);

    writeln!(writer)?;

    for result in results {
        if result.histogram.count() == 0 {
            continue;
        }

        write!(writer, "\n{} latency\n", result.name)?;
        result.histogram.write_csv(&mut writer)?;
    }

    writer.flush()
}

/// Creates the file at `path` and writes the CSV report into it.
pub fn write_csv_file(path: &Path, config: &Config, results: &[OperationResult]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create histogram file {}", path.display()))?;
    write_csv(BufWriter::new(file), config, results)
        .with_context(|| format!("failed to write histogram file {}", path.display()))?;

    tracing::info!(path = %path.display(), "wrote latency histograms");
    Ok(())
}
