//! Output formatting for sweep results

use crate::cli::{Cli, OutputFormat};
use vecbench_core::error::Result;
use vecbench_core::sweep::SweepResult;

/// Print a sweep result in the requested format
pub fn print_sweep(cli: &Cli, result: &SweepResult) -> Result<()> {
    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Human => {
            if !cli.quiet {
                print!("{}", render_table(result));
            }
            println!("{}", summary_line(result));
        }
    }
    Ok(())
}

fn render_table(result: &SweepResult) -> String {
    let mut out = format!("backend: {}\n", result.backend);
    out.push_str(&format!(
        "{:>11}  {:>9}  {:>10}  {:>12}\n",
        "concurrency", "duration", "count", "qps"
    ));
    for sample in &result.samples {
        out.push_str(&format!(
            "{:>11}  {:>8.3}s  {:>10}  {:>12.4}\n",
            sample.concurrency, sample.elapsed_secs, sample.count, sample.qps
        ));
    }
    if let Some(failure) = &result.aborted_at {
        out.push_str(&format!(
            "stopped at concurrency {}: {}\n",
            failure.concurrency, failure.reason
        ));
    }
    out
}

fn summary_line(result: &SweepResult) -> String {
    let mut line = format!(
        "max qps: {:.4} at concurrency {}",
        result.max_qps, result.concurrency
    );
    if result.is_degraded() {
        line.push_str(" (partial sweep)");
    }
    line
}
