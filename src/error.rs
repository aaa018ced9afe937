//! Error types for records, the grouped store and the aggregation pipeline.

use thiserror::Error;

/// A report document that could not be turned into a [`crate::record::ReportRecord`].
#[derive(Error, Debug)]
pub enum RecordError {
    /// The document is not valid JSON or misses the `Timings` field
    #[error("invalid report document: {0}")]
    Json(#[from] serde_json::Error),

    /// One of the comma-separated timings is not a number
    #[error("timing #{index} is not a number: {value:?}")]
    InvalidTiming {
        /// Position of the offending entry in the `Timings` list
        index: usize,
        /// The raw text of the entry
        value: String,
    },
}

/// Structural errors raised by [`crate::store::GroupedStore`] operations.
///
/// A failed operation never alters the store it was called on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Flat records and keyed records cannot live in the same store
    #[error("cannot add a {attempted} record to a {actual} store")]
    ModeMismatch {
        /// Mode implied by the key that was added
        attempted: &'static str,
        /// Mode the store is already in
        actual: &'static str,
    },

    /// A selector must carry one entry per axis
    #[error("selector has {actual} entries but the store has {expected} axes")]
    SelectorLength { expected: usize, actual: usize },

    /// Axis index beyond the store depth
    #[error("axis {axis} is out of range for a store of depth {depth}")]
    AxisOutOfRange { axis: usize, depth: usize },

    /// Transpose map is not a bijection over the axis indices
    #[error("invalid transpose map {map:?} for a store of depth {depth}")]
    InvalidPermutation { map: Vec<usize>, depth: usize },
}

/// Errors reported by the aggregation pipeline before or during computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    /// The selection left fewer axes than the pipeline needs
    #[error("selection has depth {depth}, at least {required} axes are required (select less)")]
    InsufficientDepth { depth: usize, required: usize },

    /// More role tags than axes in the store
    #[error("{roles} axis roles given for a store with {depth} axes")]
    TooManyRoles { roles: usize, depth: usize },

    /// A role that may be assigned at most once was tagged on several axes
    #[error("multiple `{role}` tags ({count})")]
    ConflictingRoles { role: &'static str, count: usize },

    /// Reshaping the selected store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A background worker panicked or was cancelled
    #[error("aggregation worker failed: {0}")]
    Worker(String),
}
