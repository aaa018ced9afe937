//! CLI entry point for the performance report analyzer.
//!
//! Provides subcommands for listing the groups of a report directory,
//! aggregating a selection into plottable curves, writing per-report frame
//! statistics to CSV, and checking that reports were recorded under the same
//! conditions.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use perf_report_analyzer::{
    aggregate::{AggregationRunner, AxisRole},
    config::AnalyzerConfig,
    consistency::{ConsistencyReport, Severity},
    loader::{LoadReport, load_directory},
    output::{append_record, print_json, write_json},
    stats::FrameStats,
    store::GroupedStore,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Selector entry matching every label of an axis.
const WILDCARD: &str = "-";

#[derive(Parser)]
#[command(name = "perf_report_analyzer")]
#[command(about = "A tool to group and aggregate benchmark frame-time reports", long_about = None)]
struct Cli {
    /// JSON config file; command-line flags take precedence
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Maximum number of report files parsed concurrently
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the axes and labels found in report directories
    Groups {
        /// Report directory (repeat to merge several)
        #[arg(short, long = "dir", required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Aggregate a selection of reports into time series or distributions
    Aggregate {
        /// Report directory (repeat to merge several)
        #[arg(short, long = "dir", required = true)]
        dirs: Vec<PathBuf>,

        /// One label per axis, comma separated; "-" keeps every label
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<String>,

        /// Role per axis (every axis, pinned ones included): auto, group, merge or each
        #[arg(short, long, value_delimiter = ',')]
        roles: Vec<AxisRole>,

        /// Fit densities instead of time series
        #[arg(long, default_value_t = false)]
        distribution: bool,

        /// Sort each composite series
        #[arg(long, default_value_t = false)]
        sort: bool,

        /// Plot frames per second instead of frame times
        #[arg(long, default_value_t = false)]
        rate: bool,

        /// Use the frame index as x instead of elapsed time
        #[arg(long, default_value_t = false)]
        frame_index: bool,

        /// Drop runs whose mean deviates too far from their group
        #[arg(long, default_value_t = false)]
        exclude_outliers: bool,

        /// Base outlier threshold in standard deviations
        #[arg(long)]
        threshold: Option<f64>,

        /// Moving-average window
        #[arg(long)]
        smoothing_window: Option<usize>,

        /// JSON file to write the result to (logged when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gzip compress the JSON output
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Append frame statistics of every report to a CSV file
    Summary {
        /// Report directory (repeat to merge several)
        #[arg(short, long = "dir", required = true)]
        dirs: Vec<PathBuf>,

        /// CSV file to append results to
        #[arg(short, long, default_value = "data.csv")]
        output: PathBuf,
    },
    /// Check that reports share OS, device, display mode, version and resolution
    Consistency {
        /// Report directory (repeat to merge several)
        #[arg(short, long = "dir", required = true)]
        dirs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/perf_report_analyzer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("perf_report_analyzer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.loader.workers = workers;
    }

    match cli.command {
        Commands::Groups { dirs } => {
            let (store, _) = load_stores(&dirs, config.loader.workers).await?;

            for (axis, labels) in store.axes().iter().enumerate() {
                info!(axis, labels = ?labels, "Axis");
            }
            info!(
                depth = store.depth(),
                leaves = store.leaf_count(),
                "Store summary"
            );
        }
        Commands::Aggregate {
            dirs,
            select,
            roles,
            distribution,
            sort,
            rate,
            frame_index,
            exclude_outliers,
            threshold,
            smoothing_window,
            output,
            gzip,
        } => {
            let mut settings = config.aggregate;
            settings.distribution |= distribution;
            settings.sort_timings |= sort;
            settings.rate |= rate;
            settings.exclude_outliers |= exclude_outliers;
            if frame_index {
                settings.time_axis = false;
            }
            if let Some(threshold) = threshold {
                settings.exclusion_threshold = threshold;
            }
            if let Some(window) = smoothing_window {
                settings.smoothing_window = window;
            }

            let (store, _) = load_stores(&dirs, config.loader.workers).await?;
            let selected = select_subtree(&store, &select)?;
            info!(
                depth = selected.depth(),
                leaves = selected.leaf_count(),
                "Selection ready"
            );

            let runner = AggregationRunner::new();
            let (generation, handle) = runner.request(Arc::new(selected), roles, settings);
            if !handle.await? {
                bail!("aggregation {} was superseded", generation.value());
            }
            let (_, result) = runner
                .take()
                .context("aggregation finished without a result")?;
            let result = result?;

            match output {
                Some(path) => write_json(&path, &result, gzip)?,
                None => print_json(&result)?,
            }
        }
        Commands::Summary { dirs, output } => {
            let (store, reports) = load_stores(&dirs, config.loader.workers).await?;

            let mut rows = 0;
            for (key, record) in store.iterate() {
                let stats = FrameStats::from_record(&key, record);
                debug!(
                    key = %stats.key,
                    fps = stats.average_fps,
                    over_budget_pct = stats.over_budget_pct(),
                    "Report summarized"
                );
                append_record(&output, &stats)?;
                rows += 1;
            }
            for failure in reports.iter().flat_map(|r| &r.failures) {
                let source = failure.path.display().to_string();
                let stats = FrameStats::from_error(&source, "load", &failure.error);
                append_record(&output, &stats)?;
            }

            info!(rows, output = %output.display(), "Frame statistics written");
        }
        Commands::Consistency { dirs } => {
            let (store, _) = load_stores(&dirs, config.loader.workers).await?;
            let report = ConsistencyReport::from_store(&store);

            match report.severity() {
                Severity::Consistent => info!("{report}"),
                Severity::Warning => warn!("{report}"),
                Severity::Error => error!("{report}"),
            }
        }
    }

    Ok(())
}

/// Loads every directory and merges the results into one store.
///
/// Directories must be compatible (same depth and labels below the root).
async fn load_stores(dirs: &[PathBuf], workers: usize) -> Result<(GroupedStore, Vec<LoadReport>)> {
    let mut merged: Option<GroupedStore> = None;
    let mut reports = Vec::with_capacity(dirs.len());

    for dir in dirs {
        let (store, report) = load_directory(dir, workers)
            .await
            .with_context(|| format!("Failed to load {}", dir.display()))?;
        if report.has_warnings() {
            warn!(directory = %dir.display(), "{}", report.summary());
        }
        reports.push(report);

        merged = Some(match merged {
            None => store,
            Some(mut base) => {
                if !base.is_compatible_with(&store) {
                    bail!(
                        "{} does not have the same groups as the directories opened before it",
                        dir.display()
                    );
                }
                base.merge(&store)?;
                base
            }
        });
    }

    let store = merged.context("no report directory given")?;
    Ok((store, reports))
}

/// Applies a `--select` list; an empty list keeps the whole store.
///
/// Pinned axes stay in the result, so `--roles` and the figure label refer to
/// the same axes with or without a selection.
fn select_subtree(store: &GroupedStore, select: &[String]) -> Result<GroupedStore> {
    if select.is_empty() {
        return Ok(store.clone());
    }

    let selector: Vec<Option<String>> = select
        .iter()
        .map(|label| (label != WILDCARD).then(|| label.clone()))
        .collect();
    Ok(store.build_subtree(&selector, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_report_analyzer::aggregate::Aggregator;
    use perf_report_analyzer::config::AggregateSettings;
    use perf_report_analyzer::record::ReportRecord;

    #[test]
    fn test_wildcard_selection_keeps_every_axis() {
        let store = versions_store();
        let aggregator = Aggregator::new(AggregateSettings::default());

        let selected = select_subtree(&store, &select(&["-", "-", "-"])).unwrap();
        assert_eq!(selected.depth(), 3);

        let all = aggregator.compose(&store, &[]).unwrap();
        let wildcard = aggregator.compose(&selected, &[]).unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["reports"]);
        assert_eq!(wildcard, all);
    }

    #[test]
    fn test_pinned_axis_stays_aggregatable() {
        let store = versions_store();
        let aggregator = Aggregator::new(AggregateSettings::default());

        let selected = select_subtree(&store, &select(&["-", "-", "1"])).unwrap();
        assert_eq!(selected.depth(), 3);
        assert_eq!(selected.leaf_count(), 2);

        let figures = aggregator.compose(&selected, &[]).unwrap();
        // the pinned run is the last single-label axis
        assert_eq!(figures.keys().collect::<Vec<_>>(), vec!["1"]);
        assert_eq!(figures["1"].len(), 2);
    }

    #[test]
    fn test_selection_length_must_match_depth() {
        let store = versions_store();
        assert!(select_subtree(&store, &select(&["-", "-"])).is_err());
        assert_eq!(select_subtree(&store, &[]).unwrap().leaf_count(), 4);
    }

    // Helper functions for tests
    fn select(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn versions_store() -> GroupedStore {
        let mut store = GroupedStore::new();
        for version in ["v1", "v2"] {
            for run in ["1", "2"] {
                store
                    .add(
                        select(&["reports", version, run]),
                        ReportRecord::new(vec![10.0, 12.0], "bench-1-report.json"),
                    )
                    .unwrap();
            }
        }
        store
    }
}
