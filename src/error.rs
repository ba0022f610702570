//! Error types for index building and training.
//!
//! Only recoverable conditions are expressed as errors: the caller can retry
//! with a smaller codebook, more training rows, or a correctly sized vector.
//! Invariant violations (inconsistent configuration, out-of-range assignment
//! indexes) are programmer errors and panic instead of returning — continuing
//! would corrupt the codebook or the graph. Search never fails.

use thiserror::Error;

/// Errors surfaced by index construction and quantizer training.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// K-means training received fewer points than it needs for the requested
    /// number of centroids. Recoverable: lower `bits` / `subquantizers` or
    /// supply more training rows.
    #[error(
        "insufficient training data: {points} points for {centroids} centroids (need {required})"
    )]
    InsufficientTrainingData {
        points: usize,
        centroids: usize,
        required: usize,
    },

    /// A vector or query passed to the index does not match its dimension.
    #[error("dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The index is configured for PQ compression but [`train`] was not
    /// called before the first insert.
    ///
    /// [`train`]: crate::index::VectorIndex::train
    #[error("quantizer is not trained; call train() before inserting")]
    QuantizerNotTrained,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
