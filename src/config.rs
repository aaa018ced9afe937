//! Analyzer configuration, loaded from an optional JSON file.
//!
//! Every field has a default, so a partial file works:
//! ```json
//! {
//!   "loader": { "workers": 8 },
//!   "aggregate": { "smoothing_window": 25, "exclude_outliers": true }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub loader: LoaderSettings,
    pub aggregate: AggregateSettings,
}

impl AnalyzerConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file '{path}'"))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Maximum number of report files parsed concurrently
    pub workers: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Switches and parameters of the aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateSettings {
    /// Moving-average window applied to every composite series
    pub smoothing_window: usize,
    /// Emit kernel density estimates instead of time series
    pub distribution: bool,
    /// Sort each composite series ascending; x becomes a fraction in [0, 1]
    pub sort_timings: bool,
    /// Convert durations (ms) to rates (frames per second)
    pub rate: bool,
    /// Use elapsed seconds instead of frame index as x (ignored when sorting)
    pub time_axis: bool,
    pub exclude_outliers: bool,
    /// Base multiple of the standard deviation a leaf mean may deviate by
    pub exclusion_threshold: f64,
    /// Maximum number of density fits running at once
    pub density_workers: usize,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            smoothing_window: 50,
            distribution: false,
            sort_timings: false,
            rate: false,
            time_axis: true,
            exclude_outliers: false,
            exclusion_threshold: 0.8,
            density_workers: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.loader.workers, 4);
        assert_eq!(config.aggregate.smoothing_window, 50);
        assert!(config.aggregate.time_axis);
        assert_eq!(config.aggregate.exclusion_threshold, 0.8);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"aggregate": {{"smoothing_window": 7, "rate": true}}}}"#
        )
        .unwrap();

        let config = AnalyzerConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.aggregate.smoothing_window, 7);
        assert!(config.aggregate.rate);
        assert!(config.aggregate.time_axis);
        assert_eq!(config.loader.workers, 4);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AnalyzerConfig::load("/nonexistent/analyzer.json").is_err());
    }
}
