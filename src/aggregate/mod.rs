//! Statistical composition of a selected store into plottable curves.
//!
//! The pipeline reorders the store so the series axis comes first and the
//! curve-group axis second, merges the leaves of every (series, curve) bucket
//! into one composite series, optionally drops outlier leaves, and finally
//! either derives the toggled time-series views or fits a density per bucket.

pub mod composite;
pub mod density;
pub mod gate;
pub mod roles;
pub mod runner;
pub mod transform;
pub mod types;
pub mod utility;

pub use composite::Composite;
pub use gate::{Generation, GenerationGate};
pub use roles::{AxisPlan, AxisRole, assign_roles};
pub use runner::AggregationRunner;
pub use types::{AggregateOutput, DensityCurve, FigureMap, SeriesCurve};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AggregateSettings;
use crate::error::AggregateError;
use crate::record::ReportRecord;
use crate::store::GroupedStore;

/// Label of the synthesized series axis when no axis is tagged as series and
/// none has a single label to borrow.
pub const SYNTHETIC_SERIES_LABEL: &str = "Composite data";

/// Fewest axes a selection needs to be aggregated.
pub const MIN_DEPTH: usize = 2;

pub struct Aggregator {
    settings: AggregateSettings,
}

impl Aggregator {
    pub fn new(settings: AggregateSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AggregateSettings {
        &self.settings
    }

    /// Runs the whole pipeline on `store` with the user's axis `roles`.
    ///
    /// Role conflicts and a too shallow store are reported before anything
    /// is computed.
    #[tracing::instrument(skip_all, fields(depth = store.depth(), distribution = self.settings.distribution))]
    pub async fn run(
        &self,
        store: &GroupedStore,
        roles: &[AxisRole],
    ) -> Result<AggregateOutput, AggregateError> {
        let composites = self.compose(store, roles)?;

        let output = if self.settings.distribution {
            AggregateOutput::Distribution(
                density::fit_all(composites, self.settings.density_workers).await?,
            )
        } else {
            AggregateOutput::TimeSeries(
                composites
                    .into_iter()
                    .map(|(series, curves)| {
                        let curves = curves
                            .into_iter()
                            .map(|(curve, composite)| {
                                (curve, transform::series_curve(composite, &self.settings))
                            })
                            .collect();
                        (series, curves)
                    })
                    .collect(),
            )
        };

        info!(
            figures = output.figure_count(),
            curves = output.curve_count(),
            "Aggregation complete"
        );
        Ok(output)
    }

    /// Merges the leaves of every (series, curve-group) bucket, applying
    /// outlier exclusion when enabled.
    pub fn compose(
        &self,
        store: &GroupedStore,
        roles: &[AxisRole],
    ) -> Result<FigureMap<Composite>, AggregateError> {
        if store.depth() < MIN_DEPTH {
            return Err(AggregateError::InsufficientDepth {
                depth: store.depth(),
                required: MIN_DEPTH,
            });
        }

        let label_counts: Vec<usize> = store.axes().iter().map(|axis| axis.len()).collect();
        let assigned = assign_roles(roles, &label_counts)?;
        let plan = AxisPlan::from_roles(&assigned);
        debug!(roles = ?assigned, permutation = ?plan.permutation, "Axis roles resolved");

        let mut arranged = store.transpose_groups(&plan.permutation)?;
        if !plan.has_series {
            let label = arranged
                .axes()
                .iter()
                .filter(|axis| axis.len() == 1)
                .filter_map(|axis| axis.first())
                .last()
                .map_or(SYNTHETIC_SERIES_LABEL, String::as_str)
                .to_string();
            arranged = arranged.prepend_group(&label)?;
        }

        let series_labels: Vec<String> = arranged
            .axis(0)
            .map(|axis| axis.iter().cloned().collect())
            .unwrap_or_default();

        let mut figures: FigureMap<Composite> = BTreeMap::new();
        for series in series_labels {
            let mut selector = vec![None; arranged.depth()];
            selector[0] = Some(series.clone());
            let figure = arranged.build_subtree(&selector, false)?;

            // leaves join their bucket in key-tuple order
            let mut buckets: BTreeMap<String, Vec<Arc<ReportRecord>>> = BTreeMap::new();
            for (key, record) in figure.iterate() {
                if record.is_empty() {
                    continue;
                }
                buckets
                    .entry(key[1].clone())
                    .or_default()
                    .push(Arc::clone(record));
            }

            let curves: BTreeMap<String, Composite> = buckets
                .into_iter()
                .map(|(curve, leaves)| {
                    let composite = self.merge_bucket(&leaves);
                    debug!(
                        series = %series,
                        curve = %curve,
                        leaves = leaves.len(),
                        excluded = composite.excluded,
                        values = composite.values.len(),
                        "Bucket merged"
                    );
                    (curve, composite)
                })
                .collect();
            figures.insert(series, curves);
        }

        Ok(figures)
    }

    fn merge_bucket(&self, leaves: &[Arc<ReportRecord>]) -> Composite {
        let series: Vec<&[f64]> = leaves.iter().map(|r| r.timings.as_slice()).collect();
        if self.settings.exclude_outliers {
            Composite::merge_excluding_outliers(&series, self.settings.exclusion_threshold)
        } else {
            Composite::merge(&series)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use AxisRole::*;

    #[test]
    fn test_compose_groups_by_curve_axis() {
        // device x version x run
        let store = store(&[
            (&["laptop", "v1", "1"], &[10.0, 10.0]),
            (&["laptop", "v1", "2"], &[12.0]),
            (&["laptop", "v2", "1"], &[20.0]),
            (&["laptop", "v2", "2"], &[22.0, 24.0]),
        ]);
        let aggregator = Aggregator::new(AggregateSettings::default());

        let figures = aggregator.compose(&store, &[]).unwrap();

        // single device label names the synthesized figure
        assert_eq!(figures.keys().collect::<Vec<_>>(), vec!["laptop"]);
        let curves = &figures["laptop"];
        assert_eq!(curves.keys().collect::<Vec<_>>(), vec!["v1", "v2"]);
        assert_eq!(curves["v1"].values, vec![10.0, 10.0, 12.0]);
        assert_eq!(curves["v1"].separators, vec![2, 3]);
        assert_eq!(curves["v2"].values, vec![20.0, 22.0, 24.0]);
        assert_eq!(curves["v2"].separators, vec![1, 3]);
    }

    #[test]
    fn test_compose_with_series_axis() {
        let store = store(&[
            (&["laptop", "v1", "1"], &[10.0]),
            (&["laptop", "v2", "1"], &[20.0]),
            (&["desktop", "v1", "1"], &[5.0]),
            (&["desktop", "v2", "1"], &[6.0]),
        ]);
        let aggregator = Aggregator::new(AggregateSettings::default());

        let figures = aggregator.compose(&store, &[Series]).unwrap();

        assert_eq!(figures.len(), 2);
        assert_eq!(figures["desktop"]["v1"].values, vec![5.0]);
        assert_eq!(figures["laptop"]["v2"].values, vec![20.0]);
    }

    #[test]
    fn test_compose_without_singleton_uses_default_label() {
        let store = store(&[
            (&["a", "1"], &[1.0]),
            (&["a", "2"], &[2.0]),
            (&["b", "1"], &[3.0]),
        ]);
        let aggregator = Aggregator::new(AggregateSettings::default());

        let figures = aggregator.compose(&store, &[]).unwrap();

        let curves = &figures[SYNTHETIC_SERIES_LABEL];
        assert_eq!(curves["a"].values, vec![1.0, 2.0]);
        assert_eq!(curves["b"].values, vec![3.0]);
    }

    #[test]
    fn test_compose_merges_in_key_order() {
        // "v1.1" sorts before "v1/..." once keys are joined into one string
        let store = store(&[(&["c", "v1", "1"], &[1.0]), (&["c", "v1.1", "1"], &[2.0])]);
        let aggregator = Aggregator::new(AggregateSettings::default());

        let figures = aggregator.compose(&store, &[Curve, Merge, Merge]).unwrap();

        let stored: Vec<f64> = store.iterate().map(|(_, r)| r.timings[0]).collect();
        assert_eq!(stored, vec![1.0, 2.0]);
        assert_eq!(figures["1"]["c"].values, stored);
        assert_eq!(figures["1"]["c"].separators, vec![1, 2]);
    }

    #[test]
    fn test_compose_skips_empty_leaves() {
        let store = store(&[(&["a", "1"], &[]), (&["a", "2"], &[2.0]), (&["b", "1"], &[])]);
        let aggregator = Aggregator::new(AggregateSettings::default());

        let figures = aggregator.compose(&store, &[]).unwrap();

        let curves = &figures[SYNTHETIC_SERIES_LABEL];
        assert_eq!(curves.len(), 1);
        assert_eq!(curves["a"].separators, vec![1]);
    }

    #[test]
    fn test_compose_excludes_outliers() {
        let store = store(&[
            (&["dev", "v1", "1"], &[10.0]),
            (&["dev", "v1", "2"], &[10.0]),
            (&["dev", "v1", "3"], &[30.0]),
        ]);
        let settings = AggregateSettings {
            exclude_outliers: true,
            ..Default::default()
        };
        let aggregator = Aggregator::new(settings);

        let figures = aggregator.compose(&store, &[Merge, Curve, Merge]).unwrap();

        // dev is the last single-label axis once version moves to the front
        let bucket = &figures["dev"]["v1"];
        assert_eq!(bucket.values, vec![10.0, 10.0]);
        assert_eq!(bucket.excluded, 1);
    }

    #[test]
    fn test_errors_leave_no_output() {
        let aggregator = Aggregator::new(AggregateSettings::default());
        let shallow = store(&[(&["a"], &[1.0])]);
        assert_eq!(
            aggregator.compose(&shallow, &[]).unwrap_err(),
            AggregateError::InsufficientDepth {
                depth: 1,
                required: 2
            }
        );

        let deep = store(&[(&["a", "1"], &[1.0]), (&["b", "2"], &[2.0])]);
        assert!(matches!(
            aggregator.compose(&deep, &[Curve, Curve]),
            Err(AggregateError::ConflictingRoles { .. })
        ));
        assert!(matches!(
            aggregator.compose(&deep, &[Auto, Auto, Auto]),
            Err(AggregateError::TooManyRoles { .. })
        ));
    }

    #[test]
    fn test_store_error_converts() {
        let err: AggregateError = StoreError::AxisOutOfRange { axis: 4, depth: 2 }.into();
        assert!(err.to_string().contains("axis 4"));
    }

    #[tokio::test]
    async fn test_run_time_series() {
        let store = store(&[
            (&["dev", "v1", "1"], &[100.0, 100.0]),
            (&["dev", "v1", "2"], &[50.0]),
            (&["dev", "v2", "1"], &[20.0]),
        ]);
        let settings = AggregateSettings {
            rate: true,
            smoothing_window: 3,
            ..Default::default()
        };

        let output = Aggregator::new(settings).run(&store, &[]).await.unwrap();

        let AggregateOutput::TimeSeries(figures) = output else {
            panic!("expected time series output");
        };
        let curve = &figures["dev"]["v1"];
        assert_eq!(curve.y, vec![10.0, 10.0, 20.0]);
        assert_eq!(curve.x, vec![0.1, 0.2, 0.25]);
        assert_eq!(curve.smoothed.len(), 3);
        assert_eq!(curve.separators, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_run_distribution() {
        let spread: Vec<f64> = (0..100).map(|i| 10.0 + (i % 7) as f64).collect();
        let store = store(&[
            (&["dev", "v1", "1"], &spread),
            (&["dev", "v2", "1"], &spread[..30]),
        ]);
        let settings = AggregateSettings {
            distribution: true,
            density_workers: 2,
            ..Default::default()
        };

        let output = Aggregator::new(settings).run(&store, &[]).await.unwrap();

        let AggregateOutput::Distribution(figures) = output else {
            panic!("expected distribution output");
        };
        assert_eq!(figures["dev"].len(), 2);
        assert_eq!(figures["dev"]["v1"].x.len(), density::GRID_POINTS);
    }

    // Helper functions for tests
    fn store(leaves: &[(&[&str], &[f64])]) -> GroupedStore {
        let mut store = GroupedStore::new();
        for (labels, timings) in leaves {
            let key = labels.iter().map(|s| s.to_string()).collect();
            store
                .add(key, ReportRecord::new(timings.to_vec(), "test.json"))
                .unwrap();
        }
        store
    }
}
