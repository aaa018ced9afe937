//! Gaussian kernel density estimates, fitted on a bounded worker pool.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::aggregate::composite::Composite;
use crate::aggregate::types::{DensityCurve, FigureMap};
use crate::aggregate::utility::{linspace, mean, sample_stddev, stddev};
use crate::error::AggregateError;

/// Number of points the density is evaluated on.
pub const GRID_POINTS: usize = 1000;

/// Half-width of the evaluation window, in standard deviations.
pub const VISIBLE_DEVIATIONS: f64 = 3.3;

/// Fraction of the data range added on both sides of it.
const RANGE_MARGIN: f64 = 0.01;

/// Kernels are summed only within this many bandwidths of a grid point.
const KERNEL_REACH: f64 = 8.0;

/// Fits a Gaussian KDE (Scott's rule bandwidth) to `values`.
///
/// The grid covers the data range widened by 1% on each side, cut down to
/// `mean ± 3.3·std`. Returns `None` for fewer than two values or values
/// without spread.
pub fn fit_density(values: &[f64]) -> Option<DensityCurve> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = mean(values);
    let std = stddev(values, mean);
    let spread = sample_stddev(values, mean);
    if !spread.is_finite() || spread <= 0.0 {
        return None;
    }
    let bandwidth = spread * (n as f64).powf(-0.2);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (min, max) = (sorted[0], sorted[n - 1]);
    let margin = (max - min) * RANGE_MARGIN;

    let low = (min - margin).max(mean - VISIBLE_DEVIATIONS * std);
    let high = (max + margin).min(mean + VISIBLE_DEVIATIONS * std);

    let x = linspace(low, high, GRID_POINTS);
    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * PI).sqrt());
    let density = x
        .iter()
        .map(|&at| {
            let from = sorted.partition_point(|&v| v < at - KERNEL_REACH * bandwidth);
            let to = sorted.partition_point(|&v| v <= at + KERNEL_REACH * bandwidth);
            sorted[from..to]
                .iter()
                .map(|&v| {
                    let z = (at - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum::<f64>()
                * norm
        })
        .collect();

    Some(DensityCurve {
        x,
        density,
        mean,
        std,
    })
}

/// Fits every bucket on its own blocking task, at most `workers` at a time,
/// and joins them all before returning.
///
/// Buckets that cannot be fitted are left out with a warning; every series
/// label stays in the result.
pub async fn fit_all(
    composites: FigureMap<Composite>,
    workers: usize,
) -> Result<FigureMap<DensityCurve>, AggregateError> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut figures: FigureMap<DensityCurve> = BTreeMap::new();

    for (series, curves) in composites {
        figures.entry(series.clone()).or_default();

        for (curve, composite) in curves {
            let permits = Arc::clone(&permits);
            let series = series.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire().await;
                let values = composite.values;
                let fit = tokio::task::spawn_blocking(move || fit_density(&values)).await;
                (series, curve, fit)
            });
        }
    }

    debug!(buckets = tasks.len(), workers, "Density fits submitted");

    while let Some(joined) = tasks.join_next().await {
        let (series, curve, fit) = joined.map_err(|e| AggregateError::Worker(e.to_string()))?;
        match fit.map_err(|e| AggregateError::Worker(e.to_string()))? {
            Some(density) => {
                figures.entry(series).or_default().insert(curve, density);
            }
            None => {
                warn!(series = %series, curve = %curve, "Not enough spread to fit a density, skipping");
            }
        }
    }

    Ok(figures)
}
