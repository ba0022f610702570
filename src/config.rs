//! Global configuration constants for smallworld.
//!
//! All tuning parameters and training bookkeeping constants are defined here.
//! Per-index configuration (graph shape, metric, PQ geometry) lives in
//! [`crate::hnsw::HnswConfig`] and is supplied by the host at construction.

/// Default number of bidirectional links per HNSW node.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_DEFAULT_MAX_LAYERS: usize = 16;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Maximum codebook size exponent: PQ codes are stored as one byte per
/// subspace, so a codebook holds at most `2^8` centroids.
pub const PQ_MAX_BITS: u32 = 8;

/// Minimum training points required per centroid.
///
/// K-means training with fewer than `39 * k` points fails with
/// [`crate::error::IndexError::InsufficientTrainingData`]; the caller must
/// lower `k` or supply more data. (39 = 10000 / 256, the bound that keeps a
/// 256-centroid codebook trainable on a 10k random sample.)
pub const MIN_POINTS_PER_CENTROID: usize = 39;

/// Maximum training points retained per centroid.
///
/// Training sets larger than `256 * k` are deterministically subsampled down
/// to exactly that size, keeping training cost bounded regardless of input.
pub const MAX_POINTS_PER_CENTROID: usize = 256;

/// Seed for the deterministic training-set permutations.
///
/// Subsampling uses this seed directly; random centroid initialization uses
/// `seed + 1`. Fixed so repeated builds over the same data are reproducible.
pub const KMEANS_SEED: u64 = 1234;

/// Iteration cap for Lloyd's algorithm.
pub const KMEANS_MAX_ITERATIONS: usize = 25;

/// Early-stop threshold on the relative objective improvement between
/// consecutive k-means iterations.
pub const KMEANS_MIN_IMPROVEMENT: f64 = 0.0001;

/// Perturbation applied when splitting a cluster to repopulate an empty one.
/// A bit above machine epsilon for f16, so split pairs stay distinguishable
/// even under aggressive downstream compression.
pub const CLUSTER_SPLIT_EPSILON: f32 = 1.0 / 1024.0;
