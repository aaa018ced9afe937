//! Derived views of a composite series: sorting, rate conversion, time axis
//! and moving-average smoothing.

use crate::aggregate::composite::Composite;
use crate::aggregate::types::SeriesCurve;
use crate::aggregate::utility::{cumulative_sum, linspace};
use crate::config::AggregateSettings;

/// Where the edge padding goes relative to the moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Pad the input with its edge values, then average
    Before,
    /// Average, then pad the result with its edge values
    After,
}

/// Moving average over `window` samples that keeps the input length.
///
/// The window is clamped to `1..=values.len()`. The padding splits as
/// `window / 2` leading and `window / 2 - 1 + window % 2` trailing samples.
pub fn smooth(values: &[f64], window: usize, padding: Padding) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let window = window.clamp(1, values.len());
    let leading = window / 2;
    let trailing = leading + window % 2 - 1;

    match padding {
        Padding::Before => moving_average(&pad_edges(values, leading, trailing), window),
        Padding::After => pad_edges(&moving_average(values, window), leading, trailing),
    }
}

// 'valid' mode: one output per full window
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let width = window as f64;
    let mut sum: f64 = values[..window].iter().sum();
    let mut averaged = Vec::with_capacity(values.len() - window + 1);
    averaged.push(sum / width);

    for i in window..values.len() {
        sum += values[i] - values[i - window];
        averaged.push(sum / width);
    }

    averaged
}

fn pad_edges(values: &[f64], leading: usize, trailing: usize) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return Vec::new();
    };

    let mut padded = Vec::with_capacity(values.len() + leading + trailing);
    padded.extend(std::iter::repeat_n(first, leading));
    padded.extend_from_slice(values);
    padded.extend(std::iter::repeat_n(last, trailing));
    padded
}

/// Applies the toggled views to a merged series.
///
/// The x-axis is the frame index by default, elapsed seconds with
/// `time_axis`, or a fraction in `[0, 1]` with `sort_timings` (which also
/// overrides `time_axis`). Separators are passed through unchanged, so they
/// lose their positional meaning once the values are sorted.
pub fn series_curve(composite: Composite, settings: &AggregateSettings) -> SeriesCurve {
    let Composite {
        values: mut y,
        separators,
        ..
    } = composite;
    let n = y.len();

    let x = if settings.sort_timings {
        linspace(0.0, 1.0, n)
    } else if settings.time_axis {
        cumulative_sum(&y).into_iter().map(|ms| ms / 1000.0).collect()
    } else {
        (0..n).map(|i| i as f64).collect()
    };

    if settings.sort_timings {
        y.sort_by(f64::total_cmp);
    }
    if settings.rate {
        y.iter_mut().for_each(|v| *v = 1000.0 / *v);
    }

    let smoothed = smooth(&y, settings.smoothing_window, Padding::After);

    SeriesCurve {
        x,
        y,
        smoothed,
        separators,
    }
}
