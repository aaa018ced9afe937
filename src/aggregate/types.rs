//! Output types handed to the renderer.

use serde::Serialize;
use std::collections::BTreeMap;

/// Series label -> curve-group label -> curve.
pub type FigureMap<T> = BTreeMap<String, BTreeMap<String, T>>;

/// One composite time series, ready to plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub smoothed: Vec<f64>,
    /// Cumulative end offsets of each merged record inside `y`
    pub separators: Vec<usize>,
}

/// Kernel density estimate of one composite series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCurve {
    pub x: Vec<f64>,
    pub density: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

/// Result of an aggregation: one figure per series label, one curve per
/// curve-group label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "figures", rename_all = "snake_case")]
pub enum AggregateOutput {
    TimeSeries(FigureMap<SeriesCurve>),
    Distribution(FigureMap<DensityCurve>),
}

impl AggregateOutput {
    pub fn figure_count(&self) -> usize {
        match self {
            AggregateOutput::TimeSeries(figures) => figures.len(),
            AggregateOutput::Distribution(figures) => figures.len(),
        }
    }

    pub fn curve_count(&self) -> usize {
        match self {
            AggregateOutput::TimeSeries(figures) => figures.values().map(BTreeMap::len).sum(),
            AggregateOutput::Distribution(figures) => figures.values().map(BTreeMap::len).sum(),
        }
    }

    pub fn series_labels(&self) -> Vec<&str> {
        match self {
            AggregateOutput::TimeSeries(figures) => figures.keys().map(String::as_str).collect(),
            AggregateOutput::Distribution(figures) => {
                figures.keys().map(String::as_str).collect()
            }
        }
    }
}
