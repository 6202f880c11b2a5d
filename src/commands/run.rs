//! `vecbench run` command
//!
//! Resolves the configuration, applies command-line overrides, loads the
//! test queries once, builds the backend and runs the sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::cli::{BackendKind, Cli, RunArgs};
use crate::commands::format;
use vecbench_core::backend::BackendConfig;
use vecbench_core::bail_usage;
use vecbench_core::config::{BenchConfig, ModeConfig};
use vecbench_core::dataset::{DatasetSource, SearchFilter, SharedDataset};
use vecbench_core::error::Result;
use vecbench_core::sweep::SweepOrchestrator;
use vecbench_core::trace_time;

pub fn execute(cli: &Cli, args: &RunArgs, start: Instant) -> Result<()> {
    let mut config = BenchConfig::resolve(args.config.as_deref())?;
    apply_overrides(&mut config, args)?;
    let settings = config.sweep_settings()?;

    debug!(elapsed = ?start.elapsed(), "resolve_config");

    let load_start = Instant::now();
    let dataset = config.dataset.load(config.filter.clone())?;
    trace_time!(
        load_start,
        "load_dataset",
        queries = dataset.len(),
        dim = dataset.dim()
    );

    let db = config.backend.build(dataset.dim())?;
    info!(
        backend = db.name(),
        queries = dataset.len(),
        levels = ?settings.concurrencies,
        "starting sweep"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = Arc::clone(&interrupted);

    let _ = ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    });

    let sweep = SweepOrchestrator::new(db, SharedDataset::create(dataset), settings)
        .with_interrupt(interrupted);
    let result = sweep.run()?;

    debug!(elapsed = ?start.elapsed(), "sweep_complete");

    format::print_sweep(cli, &result)
}

/// Fold command-line flags into the resolved configuration
fn apply_overrides(config: &mut BenchConfig, args: &RunArgs) -> Result<()> {
    if !args.concurrency.is_empty() {
        config.concurrencies = args.concurrency.clone();
    }
    if let Some(duration) = args.duration {
        config.duration_secs = duration;
    }
    if let Some(k) = args.k {
        config.k = k;
    }
    if let Some(nq) = args.nq {
        config.nq = nq;
    }
    if let Some(bound) = args.filter_id_gte {
        config.filter = Some(SearchFilter::id_gte(bound));
    }
    if args.paced && config.mode == ModeConfig::Saturate {
        config.mode = ModeConfig::paced();
    }
    if let Some(path) = &args.queries {
        config.dataset = DatasetSource::File { path: path.clone() };
    }

    match args.backend {
        Some(BackendKind::Flat) if !matches!(config.backend, BackendConfig::Flat { .. }) => {
            config.backend = BackendConfig::default();
        }
        Some(BackendKind::Simulated)
            if !matches!(config.backend, BackendConfig::Simulated { .. }) =>
        {
            config.backend = BackendConfig::Simulated {
                latency_ms: 1.0,
                fail_after: None,
            };
        }
        _ => {}
    }

    if let Some(latency) = args.latency_ms {
        match &mut config.backend {
            BackendConfig::Simulated { latency_ms, .. } => *latency_ms = latency,
            BackendConfig::Flat { .. } => {
                bail_usage!("--latency-ms requires the simulated backend")
            }
        }
    }

    Ok(())
}
