//! Merging leaves into one composite series, with optional outlier exclusion.

use tracing::debug;

use crate::aggregate::utility::{mean, stddev};

/// Growth factor applied to the exclusion threshold while too many leaves
/// would be excluded.
pub const THRESHOLD_GROWTH: f64 = 1.1;

/// Leaves of one bucket concatenated end to end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    pub values: Vec<f64>,
    /// Cumulative lengths: `separators[i]` is where leaf `i` ends in `values`
    pub separators: Vec<usize>,
    /// Number of leaves dropped as outliers
    pub excluded: usize,
}

impl Composite {
    /// Concatenates `leaves` in the given order.
    pub fn merge(leaves: &[&[f64]]) -> Self {
        let total = leaves.iter().map(|leaf| leaf.len()).sum();
        let mut values = Vec::with_capacity(total);
        let mut separators = Vec::with_capacity(leaves.len());

        for leaf in leaves {
            values.extend_from_slice(leaf);
            separators.push(values.len());
        }

        Composite {
            values,
            separators,
            excluded: 0,
        }
    }

    /// Drops outlier leaves (see [`outlier_mask`]) and merges the rest.
    pub fn merge_excluding_outliers(leaves: &[&[f64]], base_threshold: f64) -> Self {
        let mask = outlier_mask(leaves, base_threshold);
        let surviving: Vec<&[f64]> = leaves
            .iter()
            .zip(&mask)
            .filter(|(_, excluded)| !**excluded)
            .map(|(leaf, _)| *leaf)
            .collect();

        let mut composite = Self::merge(&surviving);
        composite.excluded = leaves.len() - surviving.len();
        composite
    }

    pub fn leaf_count(&self) -> usize {
        self.separators.len()
    }
}

/// Flags the leaves whose mean lies further than `threshold` standard
/// deviations from the mean of all values in the bucket.
///
/// While half or more of the leaves would be flagged, the threshold grows by
/// [`THRESHOLD_GROWTH`]. Once it overflows to infinity nothing is flagged, so
/// the loop always ends. A bucket without spread flags nothing.
pub fn outlier_mask(leaves: &[&[f64]], base_threshold: f64) -> Vec<bool> {
    let merged: Vec<f64> = leaves.iter().flat_map(|leaf| leaf.iter().copied()).collect();
    let baseline = mean(&merged);
    let std = stddev(&merged, baseline);

    if leaves.is_empty() || !std.is_finite() || std <= 0.0 {
        return vec![false; leaves.len()];
    }

    let means: Vec<f64> = leaves.iter().map(|leaf| mean(leaf)).collect();
    let mut threshold = if base_threshold > 0.0 {
        base_threshold
    } else {
        f64::EPSILON
    };

    loop {
        let mask: Vec<bool> = means
            .iter()
            .map(|m| (m - baseline).abs() > std * threshold)
            .collect();
        let excluded = mask.iter().filter(|&&e| e).count();

        if 2 * excluded < leaves.len() {
            debug!(excluded, leaves = leaves.len(), threshold, "Outlier threshold settled");
            return mask;
        }
        threshold *= THRESHOLD_GROWTH;
    }
}
