//! What each axis of the selected store turns into.
//!
//! | Role     | Tag         | Effect                                      |
//! |----------|-------------|---------------------------------------------|
//! | `Auto`   | `auto`      | resolved to `Curve` or `Merge`              |
//! | `Curve`  | `group`     | one curve per label within a figure         |
//! | `Merge`  | `merge`     | leaves concatenated into the same curve     |
//! | `Series` | `each`      | one figure per label                        |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AggregateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRole {
    #[default]
    Auto,
    Curve,
    Merge,
    Series,
}

impl AxisRole {
    pub fn tag(&self) -> &'static str {
        match self {
            AxisRole::Auto => "auto",
            AxisRole::Curve => "group",
            AxisRole::Merge => "merge",
            AxisRole::Series => "each",
        }
    }
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AxisRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "-" | "" => Ok(AxisRole::Auto),
            "group" | "curve" => Ok(AxisRole::Curve),
            "merge" => Ok(AxisRole::Merge),
            "each" | "series" => Ok(AxisRole::Series),
            other => Err(format!(
                "unknown axis role '{other}' (expected auto, group, merge or each)"
            )),
        }
    }
}

/// Resolves the user's role tags against the label count of each axis.
///
/// Missing trailing roles count as `Auto`. At most one axis may be `Series`
/// and at most one `Curve`; if no axis is tagged `Curve`, the first `Auto`
/// axis with two or more labels becomes it. Every other `Auto` axis is merged.
pub fn assign_roles(
    roles: &[AxisRole],
    label_counts: &[usize],
) -> Result<Vec<AxisRole>, AggregateError> {
    if roles.len() > label_counts.len() {
        return Err(AggregateError::TooManyRoles {
            roles: roles.len(),
            depth: label_counts.len(),
        });
    }

    let mut assigned = roles.to_vec();
    assigned.resize(label_counts.len(), AxisRole::Auto);

    for role in [AxisRole::Series, AxisRole::Curve] {
        let count = assigned.iter().filter(|&&r| r == role).count();
        if count > 1 {
            return Err(AggregateError::ConflictingRoles {
                role: role.tag(),
                count,
            });
        }
    }

    if !assigned.contains(&AxisRole::Curve) {
        if let Some(axis) = (0..assigned.len())
            .find(|&i| assigned[i] == AxisRole::Auto && label_counts[i] >= 2)
        {
            assigned[axis] = AxisRole::Curve;
        }
    }

    for role in assigned.iter_mut().filter(|r| **r == AxisRole::Auto) {
        *role = AxisRole::Merge;
    }

    Ok(assigned)
}

/// Axis order used by the pipeline: series axis first, curve-group axis next,
/// the merged axes after them in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisPlan {
    pub permutation: Vec<usize>,
    pub has_series: bool,
}

impl AxisPlan {
    /// `roles` must already be resolved by [`assign_roles`].
    pub fn from_roles(roles: &[AxisRole]) -> Self {
        let series = roles.iter().position(|&r| r == AxisRole::Series);
        let curve = roles.iter().position(|&r| r == AxisRole::Curve);

        let mut permutation: Vec<usize> = series.into_iter().chain(curve).collect();
        permutation.extend((0..roles.len()).filter(|&i| Some(i) != series && Some(i) != curve));

        Self {
            permutation,
            has_series: series.is_some(),
        }
    }
}
