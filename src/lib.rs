//! # smallworld
//!
//! Embeddable approximate-nearest-neighbor index: a hierarchical navigable
//! small-world (HNSW) proximity graph searched over raw vectors, or over
//! product-quantized codes for a far smaller memory footprint.
//!
//! ## Features
//!
//! - **HNSW graph** with probabilistic layering, beam-search construction,
//!   and diversification-heuristic neighbor selection
//! - **Product quantization** trained by an internal k-means clusterer with
//!   deterministic subsampling, empty-cluster splitting, and three centroid
//!   initialization strategies (random, hypercube, hypercube+PCA)
//! - **Three metrics**: squared-L2, inner product, cosine — fixed per index
//! - **Thread-safe handle**: one writer, any number of concurrent readers
//!
//! ## Architecture
//!
//! ```text
//! VectorIndex (RwLock) → HnswIndex → { raw f32 arena | PQ code arena }
//! Build:  training rows → ProductQuantizer → kmeans (rayon fork-join)
//! Query:  greedy layer descent → layer-0 beam search (ef) → top-k
//! ```

/// Global configuration constants: defaults and training bookkeeping.
pub mod config;
/// Error types for index building and training.
pub mod error;
/// HNSW approximate nearest neighbor index: graph, search, insertion, and
/// distance metrics.
pub mod hnsw;
/// Thread-safe index handle with the public insert/train/search API.
pub mod index;
/// Vector compression: k-means, PCA, and product quantization.
pub mod quantization;

pub use error::{IndexError, Result};
pub use hnsw::{DistanceMetric, HnswConfig, HnswIndex};
pub use index::{Neighbor, VectorIndex};
pub use quantization::{CentroidInit, PqConfig, ProductQuantizer};
